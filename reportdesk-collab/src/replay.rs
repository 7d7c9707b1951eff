//! Scripted sessions.
//!
//! A replay script lists timestamped steps (local typing, remote edits,
//! cursor and presence traffic, undo/redo, flushes) that are fed through a
//! [`CollabEngine`] on a manual clock. Timers fire between steps exactly as
//! they would have in a live session, which makes batch boundaries and
//! presence expiry reproducible.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use reportdesk_types::{CursorPosition, Operation, PeerId};
use serde::{Deserialize, Serialize};

use crate::channel::{CollabMessage, Payload};
use crate::clock::{Clock, ManualClock};
use crate::config::EngineConfig;
use crate::engine::{CollabEngine, EngineEvent};
use crate::error::{CollabError, Result};
use crate::fields::FieldStore;
use crate::history::BatchHistoryRecord;
use crate::presence::CollaboratorPresence;
use crate::text;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    #[serde(default = "default_peer")]
    pub peer: String,
    #[serde(default)]
    pub user_name: Option<String>,
    /// Initial field values
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub steps: Vec<Step>,
}

fn default_peer() -> String {
    "local".to_string()
}

/// One scripted step at `at` milliseconds from the session start.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Step {
    /// The local user changed `field` to `value`
    Type {
        at: i64,
        field: String,
        value: String,
        #[serde(default)]
        caret: Option<usize>,
    },
    Remote {
        at: i64,
        sender: String,
        #[serde(default)]
        sender_name: Option<String>,
        operation: Operation,
    },
    Cursor {
        at: i64,
        sender: String,
        x: f64,
        y: f64,
        #[serde(default)]
        field: Option<String>,
    },
    Presence {
        at: i64,
        sender: String,
        #[serde(default)]
        sender_name: Option<String>,
        #[serde(default)]
        selected_field: Option<String>,
        /// Set false to send a heartbeat-less (malformed) message
        #[serde(default = "default_true")]
        heartbeat: bool,
    },
    Leave {
        at: i64,
        sender: String,
    },
    Undo {
        at: i64,
    },
    Redo {
        at: i64,
    },
    Flush {
        at: i64,
    },
    /// Let timers run up to `at`
    Wait {
        at: i64,
    },
}

fn default_true() -> bool {
    true
}

impl Step {
    pub fn at(&self) -> i64 {
        match self {
            Step::Type { at, .. }
            | Step::Remote { at, .. }
            | Step::Cursor { at, .. }
            | Step::Presence { at, .. }
            | Step::Leave { at, .. }
            | Step::Undo { at }
            | Step::Redo { at }
            | Step::Flush { at }
            | Step::Wait { at } => *at,
        }
    }
}

impl Script {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let script: Script = serde_json::from_str(raw)?;
        script.validate()?;
        Ok(script)
    }

    fn validate(&self) -> Result<()> {
        let mut last = 0;
        for (i, step) in self.steps.iter().enumerate() {
            let at = step.at();
            if at < last {
                return Err(CollabError::Script(format!(
                    "step {i} at {at}ms goes back in time (previous step at {last}ms)"
                )));
            }
            last = at;
        }
        Ok(())
    }
}

/// Read-side aggregation over batch history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub batches: usize,
    pub total_operations: usize,
    pub average_batch_size: f64,
    /// Operations per minute between the first batch opening and the last
    /// closing; absent when that span is empty
    pub edits_per_minute: Option<f64>,
}

impl HistorySummary {
    pub fn from_records(records: &[BatchHistoryRecord]) -> Self {
        let total_operations: usize = records.iter().map(|r| r.operation_count).sum();
        let average_batch_size = if records.is_empty() {
            0.0
        } else {
            total_operations as f64 / records.len() as f64
        };

        let span_ms = match (records.first(), records.last()) {
            (Some(first), Some(last)) => (last.closed_at - first.started_at).num_milliseconds(),
            _ => 0,
        };
        let edits_per_minute =
            (span_ms > 0).then(|| total_operations as f64 * 60_000.0 / span_ms as f64);

        Self {
            batches: records.len(),
            total_operations,
            average_batch_size,
            edits_per_minute,
        }
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub fields: BTreeMap<String, String>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub version: u64,
    pub history: Vec<BatchHistoryRecord>,
    pub summary: HistorySummary,
    pub collaborators: Vec<CollaboratorPresence>,
    pub events: Vec<EngineEvent>,
    pub broadcast: Vec<CollabMessage>,
}

/// Run `script` to completion. Open batches are flushed at the end.
pub fn run_script(script: &Script, config: &EngineConfig) -> Result<ReplayReport> {
    script.validate()?;

    let clock = ManualClock::at_epoch();
    let user_name = script.user_name.clone().unwrap_or_else(|| script.peer.clone());
    let mut engine = CollabEngine::new(PeerId::new(script.peer.clone()), user_name, config.clone());
    let mut fields: FieldStore = script.fields.clone().into_iter().collect();
    let mut events = Vec::new();
    let mut broadcast = Vec::new();

    for step in &script.steps {
        clock.set_millis(step.at());
        let now = clock.now();
        engine.tick(now);
        apply_step(&mut engine, &mut fields, step, now);
        events.extend(engine.drain_events());
        broadcast.extend(engine.drain_outbound());
    }

    engine.flush(clock.now());
    events.extend(engine.drain_events());

    let history = engine.history().query().to_vec();
    Ok(ReplayReport {
        fields: fields.as_map().clone(),
        can_undo: engine.can_undo(),
        can_redo: engine.can_redo(),
        version: engine.version(),
        summary: HistorySummary::from_records(&history),
        history,
        collaborators: engine.collaborators(),
        events,
        broadcast,
    })
}

fn apply_step(engine: &mut CollabEngine, fields: &mut FieldStore, step: &Step, now: DateTime<Utc>) {
    match step {
        Step::Type {
            field,
            value,
            caret,
            ..
        } => {
            let old = fields.get(field);
            let caret = caret.unwrap_or_else(|| text::char_len(value));
            engine.local_edit(field, &old, value, caret, now);
            fields.set(field.clone(), value.clone());
        }
        Step::Remote {
            sender,
            sender_name,
            operation,
            ..
        } => {
            let message = inbound(sender, sender_name.clone(), Some(now), Payload::Edit {
                operation: operation.clone(),
                value: String::new(),
            });
            let current = &*fields;
            if let Some(edit) = engine.receive(message, |f| current.get(f), now) {
                fields.set(edit.field, edit.value);
            }
        }
        Step::Cursor {
            sender, x, y, field, ..
        } => {
            let message = inbound(sender, None, Some(now), Payload::Cursor {
                position: CursorPosition::new(*x, *y),
                field: field.clone(),
            });
            engine.receive(message, |_| String::new(), now);
        }
        Step::Presence {
            sender,
            sender_name,
            selected_field,
            heartbeat,
            ..
        } => {
            let sent_at = heartbeat.then_some(now);
            let message = inbound(sender, sender_name.clone(), sent_at, Payload::Presence {
                selected_field: selected_field.clone(),
            });
            engine.receive(message, |_| String::new(), now);
        }
        Step::Leave { sender, .. } => {
            engine.receive(inbound(sender, None, Some(now), Payload::Leave), |_| String::new(), now);
        }
        Step::Undo { .. } => {
            let current = &*fields;
            if let Some(outcome) = engine.undo(|f| current.get(f), now) {
                fields.set(outcome.field, outcome.value);
            }
        }
        Step::Redo { .. } => {
            let current = &*fields;
            if let Some(outcome) = engine.redo(|f| current.get(f), now) {
                fields.set(outcome.field, outcome.value);
            }
        }
        Step::Flush { .. } => engine.flush(now),
        Step::Wait { .. } => {}
    }
}

fn inbound(
    sender: &str,
    sender_name: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    payload: Payload,
) -> CollabMessage {
    CollabMessage {
        sender: PeerId::new(sender),
        sender_name,
        sent_at,
        payload,
    }
}
