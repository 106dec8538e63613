use crate::cli::ui;
use crate::core::facade::DemandCore;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

pub async fn run(
    core: &DemandCore,
    tag: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let series = core.get_series(tag, start, end).await?;

    println!(
        "Canonical series: {}\n",
        ui::style_text(tag, ui::StyleType::Title)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Period"),
        ui::header_cell("Value"),
        ui::header_cell("Sentiment"),
        ui::header_cell("Topics"),
    ]);

    for point in &series {
        let sentiment = point.sentiment.as_ref();
        table.add_row(vec![
            Cell::new(point.period.to_string()),
            ui::format_optional_cell(point.value, |v| format!("{v:.2}")),
            ui::format_optional_cell(sentiment.map(|s| s.sentiment), |s| format!("{s:+.2}")),
            ui::format_optional_cell(
                sentiment.filter(|s| !s.topic_labels.is_empty()),
                |s| s.topic_labels.join(", "),
            ),
        ]);
    }

    println!("{table}");
    Ok(())
}
