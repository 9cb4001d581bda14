//! Human-readable dispatch summary, rendered with minijinja.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::run_plan::DispatchSummary;

const DISPATCH_SUMMARY_TEMPLATE: &str = include_str!("templates/dispatch_summary.txt");

#[derive(Debug, Serialize)]
struct SkipCount {
    name: String,
    count: usize,
}

/// Render a compact multi-line summary of one cycle.
pub fn render_summary_text(summary: &DispatchSummary) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("dispatch_summary", DISPATCH_SUMMARY_TEMPLATE)?;
    let skipped: Vec<SkipCount> = summary
        .skipped
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(reason, count)| SkipCount {
            name: serde_json::to_value(reason)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default(),
            count: *count,
        })
        .collect();
    let template = env.get_template("dispatch_summary")?;
    let rendered = template.render(context! {
        sprint => &summary.sprint,
        poll_count => summary.poll_count,
        in_scope => summary.in_scope,
        executors => summary.intents.executor,
        reviewers => summary.intents.reviewer,
        completed => summary.completed,
        status_counts => &summary.status_counts,
        skipped => skipped,
        capped => &summary.capped,
        stalled => &summary.needs_attention.stalled,
        review_churn => &summary.needs_attention.review_churn,
    })?;
    Ok(rendered.trim_end().to_string())
}
