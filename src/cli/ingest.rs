use crate::cli::ui;
use crate::core::facade::DemandCore;
use crate::core::series::SourceId;
use anyhow::{Context, Result};
use comfy_table::Cell;
use std::collections::BTreeSet;

/// Ingests one or more pre-fetched payload files for a source and prints
/// the combined report.
pub async fn run(core: &DemandCore, source: SourceId, files: &[String]) -> Result<()> {
    let pb = ui::new_progress_bar(files.len() as u64, true);
    pb.set_message("Ingesting payloads...");

    let mut accepted = 0;
    let mut rejected = 0;
    let mut tags_touched: BTreeSet<String> = BTreeSet::new();

    for file in files {
        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read payload file: {file}"))?;
        let records: Vec<serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse payload file: {file}"))?;

        let report = core.ingest(source, &records).await;
        accepted += report.accepted;
        rejected += report.rejected;
        tags_touched.extend(report.tags_touched);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Source"),
        ui::header_cell("Accepted"),
        ui::header_cell("Rejected"),
        ui::header_cell("Tags touched"),
    ]);
    table.add_row(vec![
        Cell::new(source.to_string()),
        Cell::new(accepted.to_string()),
        Cell::new(rejected.to_string()),
        Cell::new(tags_touched.len().to_string()),
    ]);
    println!("{table}");

    if !tags_touched.is_empty() {
        let tag_list = tags_touched.into_iter().collect::<Vec<_>>().join(", ");
        println!("{}", ui::style_text(&tag_list, ui::StyleType::Subtle));
    }

    Ok(())
}
