//! Session-wide linear undo/redo history.
//!
//! Two stacks of closed batches in global chronological order across all
//! fields. Undo replays a batch's operations backwards as inverses against
//! the live field text supplied by the caller; redo replays them forwards.
//! The stack never stores field values it could go stale on: both directions
//! read the current text through the `get_current_text` callback.

use reportdesk_types::{BatchId, Operation, Origin};
use serde::Serialize;
use tracing::debug;

use crate::batcher::Batch;
use crate::text;

/// A closed batch plus the field values on either side of it.
#[derive(Debug, Clone)]
pub struct UndoRedoEntry {
    pub batch: Batch,
    pub old_value: String,
    pub new_value: String,
}

impl UndoRedoEntry {
    pub fn new(batch: Batch) -> Self {
        Self {
            old_value: batch.base_value.clone(),
            new_value: batch.final_value.clone(),
            batch,
        }
    }

    pub fn field(&self) -> &str {
        &self.batch.field
    }
}

/// What an undo or redo did to a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoOutcome {
    pub batch_id: BatchId,
    pub field: String,
    /// Field text after the undo/redo.
    pub value: String,
    /// Net edit from the previous text to `value`, for rebroadcast. `None`
    /// when the replay left the text unchanged.
    pub operation: Option<Operation>,
}

#[derive(Debug)]
pub struct UndoRedoStack {
    applied: Vec<UndoRedoEntry>,
    undone: Vec<UndoRedoEntry>,
    version: u64,
    max_depth: usize,
}

impl UndoRedoStack {
    /// `max_depth` bounds the undo history; 0 keeps everything.
    pub fn new(max_depth: usize) -> Self {
        Self {
            applied: Vec::new(),
            undone: Vec::new(),
            version: 0,
            max_depth,
        }
    }

    /// Current local version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Advance and return the local version counter.
    pub fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Record a closed batch as the most recent undoable action.
    pub fn push(&mut self, batch: Batch) {
        self.undone.clear();
        self.applied.push(UndoRedoEntry::new(batch));
        if self.max_depth > 0 && self.applied.len() > self.max_depth {
            let dropped = self.applied.remove(0);
            debug!(batch_id = %dropped.batch.id, "undo history full, dropping oldest entry");
        }
    }

    /// Drop redo history after a new local edit.
    pub fn clear_redo(&mut self) {
        self.undone.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.applied.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.applied.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.undone.len()
    }

    pub fn applied(&self) -> &[UndoRedoEntry] {
        &self.applied
    }

    pub fn undone(&self) -> &[UndoRedoEntry] {
        &self.undone
    }

    pub fn undo<F>(&mut self, get_current_text: F) -> Option<UndoOutcome>
    where
        F: Fn(&str) -> String,
    {
        let entry = self.applied.pop()?;
        let current = get_current_text(entry.field());
        let value = entry
            .batch
            .operations
            .iter()
            .rev()
            .fold(current.clone(), |acc, op| {
                text::apply_operation_clamped(&acc, &op.inverse()).0
            });

        let outcome = self.outcome(&entry, &current, value);
        debug!(batch_id = %entry.batch.id, field = %entry.field(), "undo");
        self.undone.push(entry);
        Some(outcome)
    }

    pub fn redo<F>(&mut self, get_current_text: F) -> Option<UndoOutcome>
    where
        F: Fn(&str) -> String,
    {
        let entry = self.undone.pop()?;
        let current = get_current_text(entry.field());
        let value = entry
            .batch
            .operations
            .iter()
            .fold(current.clone(), |acc, op| {
                text::apply_operation_clamped(&acc, op).0
            });

        let outcome = self.outcome(&entry, &current, value);
        debug!(batch_id = %entry.batch.id, field = %entry.field(), "redo");
        self.applied.push(entry);
        Some(outcome)
    }

    fn outcome(&mut self, entry: &UndoRedoEntry, before: &str, value: String) -> UndoOutcome {
        let version = self.next_version();
        let operation = text::derive(entry.field(), before, &value, text::char_len(&value))
            .map(|op| op.with_origin(Origin::Local).with_version(version));
        UndoOutcome {
            batch_id: entry.batch.id.clone(),
            field: entry.field().to_string(),
            value,
            operation,
        }
    }

    /// Operation lists for `field`: undo history oldest first, then redo
    /// history in the order redo would replay it.
    #[allow(clippy::type_complexity)]
    pub(crate) fn chains_mut(
        &mut self,
        field: &str,
    ) -> (Vec<&mut Vec<Operation>>, Vec<&mut Vec<Operation>>) {
        let applied = self
            .applied
            .iter_mut()
            .filter(|entry| entry.batch.field == field)
            .map(|entry| &mut entry.batch.operations)
            .collect();
        let undone = self
            .undone
            .iter_mut()
            .rev()
            .filter(|entry| entry.batch.field == field)
            .map(|entry| &mut entry.batch.operations)
            .collect();
        (applied, undone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;

    fn batch(field: &str, base: &str, ops: Vec<Operation>) -> Batch {
        let final_value = ops.iter().fold(base.to_string(), |acc, op| {
            text::apply_operation(&acc, op).unwrap()
        });
        Batch {
            id: BatchId::new(format!("{field}-{}", ops.len())),
            field: field.to_string(),
            operations: ops,
            started_at: DateTime::<Utc>::UNIX_EPOCH,
            closed_at: DateTime::<Utc>::UNIX_EPOCH,
            base_value: base.to_string(),
            preview: final_value.clone(),
            final_value,
            base_version: 0,
        }
    }

    #[test]
    fn test_empty_stack_is_noop() {
        let mut stack = UndoRedoStack::new(0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
        assert!(stack.undo(|_| String::new()).is_none());
        assert!(stack.redo(|_| String::new()).is_none());
        assert_eq!(stack.version(), 0);
    }

    #[test]
    fn test_undo_then_redo_round_trips() {
        let mut stack = UndoRedoStack::new(0);
        stack.push(batch(
            "title",
            "Hello",
            vec![
                Operation::insert("title", 5, " Wor"),
                Operation::insert("title", 9, "ld"),
                Operation::delete("title", 0, "H"),
            ],
        ));

        let undone = stack.undo(|_| "ello World".to_string()).unwrap();
        assert_eq!(undone.value, "Hello");
        assert!(stack.can_redo());

        let redone = stack.redo(|_| undone.value.clone()).unwrap();
        assert_eq!(redone.value, "ello World");
        assert!(stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_order_is_global_across_fields() {
        let mut stack = UndoRedoStack::new(0);
        stack.push(batch("title", "", vec![Operation::insert("title", 0, "T")]));
        stack.push(batch(
            "description",
            "",
            vec![Operation::insert("description", 0, "D")],
        ));

        let mut fields = HashMap::from([
            ("title".to_string(), "T".to_string()),
            ("description".to_string(), "D".to_string()),
        ]);

        let first = stack.undo(|f| fields[f].clone()).unwrap();
        assert_eq!(first.field, "description");
        fields.insert(first.field.clone(), first.value.clone());

        let second = stack.undo(|f| fields[f].clone()).unwrap();
        assert_eq!(second.field, "title");
        assert_eq!(second.value, "");
    }

    #[test]
    fn test_push_clears_redo() {
        let mut stack = UndoRedoStack::new(0);
        stack.push(batch("title", "", vec![Operation::insert("title", 0, "a")]));
        stack.undo(|_| "a".to_string());
        assert!(stack.can_redo());

        stack.push(batch("title", "", vec![Operation::insert("title", 0, "b")]));
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_max_depth_drops_oldest() {
        let mut stack = UndoRedoStack::new(2);
        for name in ["a", "b", "c"] {
            stack.push(batch(name, "", vec![Operation::insert(name, 0, name)]));
        }

        assert_eq!(stack.undo_depth(), 2);
        assert_eq!(stack.applied()[0].field(), "b");
    }

    #[test]
    fn test_outcome_operation_and_version() {
        let mut stack = UndoRedoStack::new(0);
        stack.push(batch("title", "Hello", vec![Operation::insert("title", 5, " World")]));

        let outcome = stack.undo(|_| "Hello World".to_string()).unwrap();
        let op = outcome.operation.unwrap();
        assert_eq!(op.position, 5);
        assert_eq!(op.deleted_length, 6);
        assert!(op.inserted_text.is_empty());
        assert_eq!(op.origin_version, 1);
        assert_eq!(stack.version(), 1);
    }
}
