use crate::cli::ui;
use crate::core::facade::DemandCore;
use crate::core::forecast::TrendDirection;
use anyhow::Result;
use comfy_table::Cell;

pub async fn run(core: &DemandCore, tag: &str, horizon: usize) -> Result<()> {
    let forecast = core.get_forecast(tag, horizon).await?;

    let trend = match forecast.trend {
        TrendDirection::Growing => ui::style_text("growing", ui::StyleType::Positive),
        TrendDirection::Declining => ui::style_text("declining", ui::StyleType::Negative),
        TrendDirection::Flat => ui::style_text("flat", ui::StyleType::Subtle),
    };
    println!(
        "Forecast: {} ({} model, {trend})\n",
        ui::style_text(tag, ui::StyleType::Title),
        forecast.model_used
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Period"),
        ui::header_cell("Forecast"),
        ui::header_cell("Low"),
        ui::header_cell("High"),
    ]);
    for point in &forecast.points {
        table.add_row(vec![
            Cell::new(point.period.to_string()),
            Cell::new(format!("{:.2}", point.value)),
            Cell::new(format!("{:.2}", point.lower)),
            Cell::new(format!("{:.2}", point.upper)),
        ]);
    }
    println!("{table}");

    let detail = format!(
        "Backtest MAE {:.2}, RMSE {:.2}, MAPE {:.1}% | generated {} | data version {}",
        forecast.backtest.mae,
        forecast.backtest.rmse,
        forecast.backtest.mape,
        forecast.generated_at.format("%Y-%m-%d %H:%M UTC"),
        forecast.data_version
    );
    println!("{}", ui::style_text(&detail, ui::StyleType::Subtle));

    Ok(())
}
