use crate::core::facade::DemandCore;
use crate::core::topic::TopicSentimentScore;
use anyhow::{Context, Result};

/// Loads a topic/sentiment feed file and records it for reporting.
pub async fn run(core: &DemandCore, file: &str) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read topic scores file: {file}"))?;
    let scores: Vec<TopicSentimentScore> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse topic scores file: {file}"))?;

    let report = core.record_topic_scores(scores).await;
    println!(
        "Recorded {} topic scores ({} rejected).",
        report.accepted, report.rejected
    );
    Ok(())
}
