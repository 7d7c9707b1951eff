//! Append-only log of closed batches.
//!
//! Purely derived from the batcher's output: nothing here feeds back into
//! editing behavior. Aggregation (averages, rates) is left to consumers.

use chrono::{DateTime, Utc};
use reportdesk_types::BatchId;
use serde::{Deserialize, Serialize};

use crate::batcher::Batch;
use crate::error::Result;

/// Immutable snapshot of a closed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHistoryRecord {
    pub batch_id: BatchId,
    pub field: String,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub operation_count: usize,
    pub preview: String,
}

impl BatchHistoryRecord {
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id.clone(),
            field: batch.field.clone(),
            started_at: batch.started_at,
            closed_at: batch.closed_at,
            duration_ms: (batch.closed_at - batch.started_at).num_milliseconds(),
            operation_count: batch.operations.len(),
            preview: batch.preview.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchHistoryStore {
    records: Vec<BatchHistoryRecord>,
}

impl BatchHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, batch: &Batch) {
        self.records.push(BatchHistoryRecord::from_batch(batch));
    }

    /// All records, most recent last.
    pub fn query(&self) -> &[BatchHistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One JSON object per line, oldest first.
    pub fn to_json_lines(&self) -> Result<String> {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }
}
