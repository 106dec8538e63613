use crate::cli::ui;
use crate::core::facade::DemandCore;
use anyhow::Result;
use comfy_table::Cell;

pub async fn run(core: &DemandCore) -> Result<()> {
    let summaries = core.list_tags().await;
    if summaries.is_empty() {
        println!("No tags ingested yet.");
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Tag"),
        ui::header_cell("First seen"),
        ui::header_cell("Last seen"),
        ui::header_cell("Points"),
        ui::header_cell("Active"),
    ]);

    for summary in &summaries {
        let active = if summary.active {
            ui::style_text("yes", ui::StyleType::Positive)
        } else {
            ui::style_text("no", ui::StyleType::Subtle)
        };
        table.add_row(vec![
            Cell::new(&summary.tag),
            Cell::new(summary.first_seen.to_string()),
            Cell::new(summary.last_seen.to_string()),
            Cell::new(summary.point_count.to_string()),
            Cell::new(active),
        ]);
    }

    println!("{table}");
    Ok(())
}
