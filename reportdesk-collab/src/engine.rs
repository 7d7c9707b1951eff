//! One editing session's undo engine.
//!
//! [`CollabEngine`] wires the batcher, undo stack, remote transformer,
//! presence roster and history log together. It holds operations, never
//! field values: every call that needs live text takes a `get_current_text`
//! callback, and every call that changes text returns the new value for the
//! caller to display. Outbound channel traffic and UI events queue up until
//! drained.

use chrono::{DateTime, TimeDelta, Utc};
use reportdesk_types::{BatchId, CursorPosition, Operation, Origin, PeerId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::batcher::{Batch, OperationBatcher};
use crate::channel::{CollabMessage, Payload};
use crate::config::EngineConfig;
use crate::history::BatchHistoryStore;
use crate::presence::{CollaboratorPresence, PresenceTracker, PresenceUpdate};
use crate::text;
use crate::transform::{self, TransformReport};
use crate::undo::{UndoOutcome, UndoRedoStack};

/// UI-facing notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    BatchingStarted {
        field: String,
    },
    BatchClosed {
        batch_id: BatchId,
        field: String,
        operation_count: usize,
    },
    /// No batch is open any more (`isBatching = false`)
    BatchingStopped,
    CollaboratorLeft {
        peer: PeerId,
    },
}

/// A remote edit after clamping, ready to display.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEdit {
    pub sender: PeerId,
    pub field: String,
    pub value: String,
    pub operation: Operation,
    pub transform: TransformReport,
}

#[derive(Debug)]
pub struct CollabEngine {
    peer: PeerId,
    user_name: String,
    config: EngineConfig,
    batcher: OperationBatcher,
    stack: UndoRedoStack,
    history: BatchHistoryStore,
    presence: PresenceTracker,
    outbound: Vec<CollabMessage>,
    events: Vec<EngineEvent>,
}

impl CollabEngine {
    pub fn new(peer: PeerId, user_name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            batcher: OperationBatcher::new(config.batch_delay(), config.preview_length),
            stack: UndoRedoStack::new(config.max_undo_depth),
            history: BatchHistoryStore::new(),
            presence: PresenceTracker::new(config.presence_timeout()),
            peer,
            user_name: user_name.into(),
            config,
            outbound: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Local editing
    // -------------------------------------------------------------------------

    /// Record a local change of `field` from `old` to `new`.
    ///
    /// Returns the derived operation, or `None` for a no-op such as a caret
    /// move. The operation is applied already (the caller displays `new`),
    /// batched, and queued for broadcast.
    pub fn local_edit(
        &mut self,
        field: &str,
        old: &str,
        new: &str,
        caret: usize,
        now: DateTime<Utc>,
    ) -> Option<Operation> {
        let operation = text::derive(field, old, new, caret)?;
        let version = self.stack.next_version();
        let operation = operation.with_version(version);

        let outcome = self.batcher.push(operation.clone(), old, version, now);
        if let Some(closed) = outcome.closed {
            self.commit(vec![closed]);
        }
        self.stack.clear_redo();
        if outcome.opened {
            self.events.push(EngineEvent::BatchingStarted {
                field: field.to_string(),
            });
        }

        self.broadcast_edit(field, new, operation.clone(), now);
        Some(operation)
    }

    /// Close every open batch now.
    pub fn flush(&mut self, now: DateTime<Utc>) {
        let closed = self.batcher.flush(now);
        self.commit(closed);
    }

    /// Close the open batch for `field` now.
    pub fn flush_field(&mut self, field: &str, now: DateTime<Utc>) {
        if let Some(closed) = self.batcher.flush_field(field, now) {
            self.commit(vec![closed]);
        }
    }

    /// Timer callback: close expired batches and expire silent collaborators.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let closed = self.batcher.tick(now);
        self.commit(closed);
        self.sweep_presence(now);
    }

    pub fn sweep_presence(&mut self, now: DateTime<Utc>) {
        for peer in self.presence.sweep(now) {
            self.events.push(EngineEvent::CollaboratorLeft { peer });
        }
    }

    fn commit(&mut self, closed: Vec<Batch>) {
        if closed.is_empty() {
            return;
        }
        for batch in closed {
            self.history.append(&batch);
            self.events.push(EngineEvent::BatchClosed {
                batch_id: batch.id.clone(),
                field: batch.field.clone(),
                operation_count: batch.operations.len(),
            });
            self.stack.push(batch);
        }
        if !self.batcher.is_batching() {
            self.events.push(EngineEvent::BatchingStopped);
        }
    }

    /// Undo the most recent batch across all fields.
    ///
    /// Open batches are flushed first so the user's latest typing is what
    /// gets undone. `None` means there was nothing to undo.
    pub fn undo<F>(&mut self, get_current_text: F, now: DateTime<Utc>) -> Option<UndoOutcome>
    where
        F: Fn(&str) -> String,
    {
        self.flush(now);
        let outcome = self.stack.undo(get_current_text)?;
        self.rebroadcast(&outcome, now);
        Some(outcome)
    }

    pub fn redo<F>(&mut self, get_current_text: F, now: DateTime<Utc>) -> Option<UndoOutcome>
    where
        F: Fn(&str) -> String,
    {
        self.flush(now);
        let outcome = self.stack.redo(get_current_text)?;
        self.rebroadcast(&outcome, now);
        Some(outcome)
    }

    fn rebroadcast(&mut self, outcome: &UndoOutcome, now: DateTime<Utc>) {
        if let Some(op) = &outcome.operation {
            self.broadcast_edit(&outcome.field, &outcome.value, op.clone(), now);
        }
    }

    // -------------------------------------------------------------------------
    // Remote traffic
    // -------------------------------------------------------------------------

    /// Handle one inbound channel message.
    ///
    /// Returns the edit to display when the message carried one. Messages
    /// this session sent itself are ignored.
    pub fn receive<F>(
        &mut self,
        message: CollabMessage,
        get_current_text: F,
        now: DateTime<Utc>,
    ) -> Option<RemoteEdit>
    where
        F: Fn(&str) -> String,
    {
        if message.sender == self.peer {
            return None;
        }

        let CollabMessage {
            sender,
            sender_name,
            sent_at,
            payload,
        } = message;

        let mut update = PresenceUpdate {
            user_name: sender_name,
            sent_at,
            ..Default::default()
        };

        match payload {
            Payload::Edit { operation, .. } => {
                update.selected_field = Some(operation.field.clone());
                self.presence.update_presence(&sender, update, now);
                Some(self.apply_remote(sender, operation, get_current_text))
            }
            Payload::Cursor { position, field } => {
                update.cursor_position = Some(position);
                update.selected_field = field;
                self.presence.update_presence(&sender, update, now);
                None
            }
            Payload::Presence { selected_field } => {
                update.selected_field = selected_field;
                self.presence.update_presence(&sender, update, now);
                None
            }
            Payload::Leave => {
                if self.presence.remove(&sender).is_some() {
                    self.events.push(EngineEvent::CollaboratorLeft { peer: sender });
                }
                None
            }
        }
    }

    fn apply_remote<F>(&mut self, sender: PeerId, operation: Operation, get_current_text: F) -> RemoteEdit
    where
        F: Fn(&str) -> String,
    {
        let field = operation.field.clone();
        let current = get_current_text(&field);
        let len = text::char_len(&current);
        if operation.position > len || operation.deleted_end() > len {
            warn!(
                %field,
                peer = %sender,
                position = operation.position,
                deleted = operation.deleted_length,
                len,
                "clamping out-of-range remote operation"
            );
        }

        let (value, applied) = text::apply_operation_clamped(&current, &operation);
        let applied = applied.with_origin(Origin::Remote);
        let transform =
            transform::track_remote_operation(&applied, &mut self.batcher, &mut self.stack);
        debug!(%field, peer = %sender, position = applied.position, "applied remote edit");

        RemoteEdit {
            sender,
            field,
            value,
            operation: applied,
            transform,
        }
    }

    /// Queue an edit for collaborators.
    pub fn broadcast_edit(&mut self, field: &str, value: &str, operation: Operation, now: DateTime<Utc>) {
        debug_assert_eq!(operation.field, field);
        self.send(
            Payload::Edit {
                operation,
                value: value.to_string(),
            },
            now,
        );
    }

    pub fn broadcast_cursor(&mut self, x: f64, y: f64, field: Option<String>, now: DateTime<Utc>) {
        self.send(
            Payload::Cursor {
                position: CursorPosition::new(x, y),
                field,
            },
            now,
        );
    }

    /// Heartbeat, optionally announcing the focused field.
    pub fn broadcast_presence(&mut self, selected_field: Option<String>, now: DateTime<Utc>) {
        self.send(Payload::Presence { selected_field }, now);
    }

    pub fn broadcast_leave(&mut self, now: DateTime<Utc>) {
        self.send(Payload::Leave, now);
    }

    fn send(&mut self, payload: Payload, now: DateTime<Utc>) {
        self.outbound.push(CollabMessage {
            sender: self.peer.clone(),
            sender_name: Some(self.user_name.clone()),
            sent_at: Some(now),
            payload,
        });
    }

    pub fn drain_outbound(&mut self) -> Vec<CollabMessage> {
        std::mem::take(&mut self.outbound)
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // -------------------------------------------------------------------------
    // Read-side state
    // -------------------------------------------------------------------------

    pub fn is_batching(&self) -> bool {
        self.batcher.is_batching()
    }

    pub fn pending_operation_count(&self, field: &str) -> usize {
        self.batcher.pending_operation_count(field)
    }

    pub fn total_pending(&self) -> usize {
        self.batcher.total_pending()
    }

    pub fn time_remaining(&self, field: &str, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.batcher.time_remaining(field, now)
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.batcher.next_deadline()
    }

    pub fn batcher(&self) -> &OperationBatcher {
        &self.batcher
    }

    pub fn can_undo(&self) -> bool {
        self.stack.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.stack.can_redo()
    }

    pub fn version(&self) -> u64 {
        self.stack.version()
    }

    pub fn stack(&self) -> &UndoRedoStack {
        &self.stack
    }

    pub fn history(&self) -> &BatchHistoryStore {
        &self.history
    }

    pub fn collaborators(&self) -> Vec<CollaboratorPresence> {
        self.presence.collaborators()
    }
}
