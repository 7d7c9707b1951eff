//! Time-windowed grouping of local operations into undo units.
//!
//! Each field has at most one open batch. Every push refreshes the batch's
//! deadline to `now + batch_delay`; once the deadline passes (observed by
//! [`OperationBatcher::tick`] or by the next push) or the caller flushes, the
//! batch closes and is handed back to the caller for the undo stack and the
//! history log. Fields batch independently.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use reportdesk_types::{BatchId, Operation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::text;

/// A closed batch: an immutable, undoable unit of local edits.
///
/// Replaying `operations` in order against `base_value` yields
/// `final_value` as long as no remote edit touched the field meanwhile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: BatchId,
    pub field: String,
    pub operations: Vec<Operation>,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub base_value: String,
    pub final_value: String,
    pub base_version: u64,
    pub preview: String,
}

/// A batch still accepting operations.
#[derive(Debug, Clone)]
pub struct OpenBatch {
    pub id: BatchId,
    pub field: String,
    pub operations: Vec<Operation>,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub base_value: String,
    /// Field value after the most recent push.
    pub latest_value: String,
    pub base_version: u64,
}

impl OpenBatch {
    fn close(self, closed_at: DateTime<Utc>, preview_length: usize) -> Batch {
        Batch {
            id: self.id,
            field: self.field,
            operations: self.operations,
            started_at: self.started_at,
            closed_at,
            base_value: self.base_value,
            preview: text::preview(&self.latest_value, preview_length),
            final_value: self.latest_value,
            base_version: self.base_version,
        }
    }
}

/// Result of a push.
#[derive(Debug, Default)]
pub struct PushOutcome {
    /// A batch for the same field whose window had already elapsed.
    pub closed: Option<Batch>,
    /// True when this push opened a new batch.
    pub opened: bool,
}

#[derive(Debug)]
pub struct OperationBatcher {
    open: BTreeMap<String, OpenBatch>,
    batch_delay: TimeDelta,
    preview_length: usize,
}

impl OperationBatcher {
    pub fn new(batch_delay: TimeDelta, preview_length: usize) -> Self {
        Self {
            open: BTreeMap::new(),
            batch_delay,
            preview_length,
        }
    }

    pub fn batch_delay(&self) -> TimeDelta {
        self.batch_delay
    }

    /// Add a local operation for `operation.field`.
    ///
    /// `old_value` is the field text before the operation; it becomes the
    /// batch's base value when this push opens a batch.
    pub fn push(
        &mut self,
        operation: Operation,
        old_value: &str,
        base_version: u64,
        now: DateTime<Utc>,
    ) -> PushOutcome {
        let field = operation.field.clone();
        let mut outcome = PushOutcome::default();

        // the timer for this field would already have fired
        if self.open.get(&field).is_some_and(|b| b.deadline <= now) {
            outcome.closed = self.close(&field, now);
        }

        let (latest_value, _) = text::apply_operation_clamped(old_value, &operation);
        let deadline = now + self.batch_delay;

        match self.open.get_mut(&field) {
            Some(batch) => {
                batch.operations.push(operation);
                batch.latest_value = latest_value;
                batch.deadline = deadline;
            }
            None => {
                let id = BatchId::new(uuid::Uuid::new_v4().to_string());
                debug!(%field, batch_id = %id, "opening batch");
                self.open.insert(
                    field.clone(),
                    OpenBatch {
                        id,
                        field,
                        operations: vec![operation],
                        started_at: now,
                        deadline,
                        base_value: old_value.to_string(),
                        latest_value,
                        base_version,
                    },
                );
                outcome.opened = true;
            }
        }

        outcome
    }

    /// Close every batch whose deadline is at or before `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Batch> {
        let expired: Vec<String> = self
            .open
            .values()
            .filter(|b| b.deadline <= now)
            .map(|b| b.field.clone())
            .collect();

        expired
            .iter()
            .filter_map(|field| self.close(field, now))
            .collect()
    }

    /// Close every open batch immediately.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Vec<Batch> {
        let fields: Vec<String> = self.open.keys().cloned().collect();
        fields
            .iter()
            .filter_map(|field| self.close(field, now))
            .collect()
    }

    /// Close the open batch for `field`, if any.
    pub fn flush_field(&mut self, field: &str, now: DateTime<Utc>) -> Option<Batch> {
        self.close(field, now)
    }

    /// Closing an already closed batch is a no-op, which covers a timer
    /// firing after a manual flush.
    fn close(&mut self, field: &str, now: DateTime<Utc>) -> Option<Batch> {
        let batch = self.open.remove(field)?;
        let closed_at = batch.deadline.min(now);
        debug!(
            %field,
            batch_id = %batch.id,
            operations = batch.operations.len(),
            "closing batch"
        );
        Some(batch.close(closed_at, self.preview_length))
    }

    pub fn is_batching(&self) -> bool {
        !self.open.is_empty()
    }

    pub fn open_batch(&self, field: &str) -> Option<&OpenBatch> {
        self.open.get(field)
    }

    /// Pending operations in the open batch for `field`.
    pub fn pending_operation_count(&self, field: &str) -> usize {
        self.open.get(field).map_or(0, |b| b.operations.len())
    }

    /// Pending operations across all open batches.
    pub fn total_pending(&self) -> usize {
        self.open.values().map(|b| b.operations.len()).sum()
    }

    /// Time until the open batch for `field` closes on its own.
    pub fn time_remaining(&self, field: &str, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.open
            .get(field)
            .map(|b| (b.deadline - now).max(TimeDelta::zero()))
    }

    /// Earliest deadline among open batches.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.open.values().map(|b| b.deadline).min()
    }

    pub(crate) fn pending_operations_mut(
        &mut self,
        field: &str,
    ) -> Option<&mut Vec<Operation>> {
        self.open.get_mut(field).map(|b| &mut b.operations)
    }
}
