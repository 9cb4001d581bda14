//! JSON-lines product output.
//!
//! Run intents go to the dispatch channel (stdout); summaries go to the
//! diagnostic channel (stderr). Tracing output is separate and filtered by
//! `RUST_LOG`; these records are always written.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::run_plan::DispatchSummary;
use crate::core::types::RunIntent;

/// Sprint-level totals emitted once when a sprint completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndOfSprintSummary {
    pub sprint: String,
    pub poll_count: u64,
    pub items: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub total_review_cycles: u32,
}

/// One emitted line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Record {
    RunIntent(RunIntent),
    DispatchSummary(DispatchSummary),
    EndOfSprintSummary(EndOfSprintSummary),
}

impl Record {
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self).context("serialize record")?;
        line.push('\n');
        Ok(line)
    }
}

/// Sink for emitted records.
pub trait Emitter {
    fn emit(&mut self, record: &Record) -> Result<()>;
}

/// Writes intents to one writer and summaries to another.
pub struct JsonLinesEmitter<D: Write, S: Write> {
    dispatch: D,
    diagnostic: S,
}

impl<D: Write, S: Write> JsonLinesEmitter<D, S> {
    pub fn new(dispatch: D, diagnostic: S) -> Self {
        Self {
            dispatch,
            diagnostic,
        }
    }
}

impl JsonLinesEmitter<std::io::Stdout, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdout(), std::io::stderr())
    }
}

impl<D: Write, S: Write> Emitter for JsonLinesEmitter<D, S> {
    fn emit(&mut self, record: &Record) -> Result<()> {
        let line = record.to_json_line()?;
        let out: &mut dyn Write = match record {
            Record::RunIntent(_) => &mut self.dispatch,
            Record::DispatchSummary(_) | Record::EndOfSprintSummary(_) => &mut self.diagnostic,
        };
        out.write_all(line.as_bytes()).context("write record")?;
        out.flush().context("flush record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EXECUTOR_ENDPOINT, IntentBody, Role};

    #[test]
    fn intent_record_is_tagged_and_flat() {
        let record = Record::RunIntent(RunIntent {
            role: Role::Executor,
            run_id: "run-7".to_string(),
            endpoint: EXECUTOR_ENDPOINT.to_string(),
            body: IntentBody::ClaimReady {
                role: Role::Executor,
                run_id: "run-7".to_string(),
                sprint: "Sprint 1".to_string(),
            },
        });
        assert_eq!(
            record.to_json_line().expect("json"),
            "{\"type\":\"RUN_INTENT\",\"role\":\"EXECUTOR\",\"run_id\":\"run-7\",\"endpoint\":\"/internal/executor/claim-ready-item\",\"body\":{\"role\":\"EXECUTOR\",\"run_id\":\"run-7\",\"sprint\":\"Sprint 1\"}}\n"
        );
    }

    #[test]
    fn records_are_routed_by_channel() {
        let mut emitter = JsonLinesEmitter::new(Vec::new(), Vec::new());
        emitter
            .emit(&Record::EndOfSprintSummary(EndOfSprintSummary {
                sprint: "Sprint 1".to_string(),
                poll_count: 3,
                items: 0,
                status_counts: BTreeMap::new(),
                total_review_cycles: 0,
            }))
            .expect("emit");
        assert!(emitter.dispatch.is_empty());
        let diagnostic = String::from_utf8(emitter.diagnostic).expect("utf8");
        assert!(diagnostic.starts_with("{\"type\":\"END_OF_SPRINT_SUMMARY\""));
    }
}
