//! Event loop hosting one editing session.
//!
//! A single tokio task owns the [`CollabEngine`] and the session's
//! [`FieldStore`] and reacts to three sources: local commands from the UI,
//! inbound channel messages, and the next batch deadline. Nothing runs in
//! parallel with anything else, so the engine needs no locking; the deadline
//! sleep is the only suspension point inside the engine's logic.

use std::sync::Arc;

use reportdesk_types::PeerId;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{BroadcastChannel, CollabMessage};
use crate::clock::{Clock, TokioClock};
use crate::engine::{CollabEngine, EngineEvent};
use crate::error::{CollabError, Result};
use crate::fields::FieldStore;
use crate::history::BatchHistoryRecord;
use crate::presence::CollaboratorPresence;

/// Requests from the UI layer.
#[derive(Debug)]
pub enum Command {
    /// The user changed `field` to `value` with the caret at `caret`
    Edit {
        field: String,
        value: String,
        caret: usize,
    },
    Undo,
    Redo,
    Flush,
    Cursor {
        x: f64,
        y: f64,
        field: Option<String>,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Point-in-time view of a session for the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub fields: FieldStoreView,
    pub is_batching: bool,
    pub pending_operations: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub version: u64,
    pub collaborators: Vec<CollaboratorPresence>,
    pub history: Vec<BatchHistoryRecord>,
}

pub type FieldStoreView = std::collections::BTreeMap<String, String>;

/// Handle for talking to a running session task.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<EngineEvent>,
    task: JoinHandle<Result<FieldStore>>,
}

impl SessionHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CollabError::ChannelClosed)
    }

    pub async fn edit(&self, field: &str, value: &str, caret: usize) -> Result<()> {
        self.send(Command::Edit {
            field: field.to_string(),
            value: value.to_string(),
            caret,
        })
        .await
    }

    pub async fn undo(&self) -> Result<()> {
        self.send(Command::Undo).await
    }

    pub async fn redo(&self) -> Result<()> {
        self.send(Command::Redo).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.send(Command::Flush).await
    }

    pub async fn cursor(&self, x: f64, y: f64, field: Option<String>) -> Result<()> {
        self.send(Command::Cursor { x, y, field }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| CollabError::ChannelClosed)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stop the session, flushing open batches, and return the final fields.
    pub async fn shutdown(self) -> Result<FieldStore> {
        self.send(Command::Shutdown).await?;
        self.task.await.map_err(|_| CollabError::ChannelClosed)?
    }
}

pub struct SessionDriver<C: BroadcastChannel> {
    engine: CollabEngine,
    fields: FieldStore,
    channel: Arc<C>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<EngineEvent>,
}

impl<C: BroadcastChannel + 'static> SessionDriver<C> {
    pub fn new(engine: CollabEngine, fields: FieldStore, channel: Arc<C>) -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            engine,
            fields,
            channel,
            clock: Arc::new(TokioClock::new()),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribe to the channel and start the session task.
    pub fn spawn(self) -> SessionHandle {
        let (tx, rx) = mpsc::channel(64);
        let inbound = self.channel.subscribe();
        let events = self.events.clone();
        let task = tokio::spawn(self.run(rx, inbound));
        SessionHandle {
            commands: tx,
            events,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: broadcast::Receiver<CollabMessage>,
    ) -> Result<FieldStore> {
        let peer = self.engine.peer().clone();
        info!(%peer, "session started");
        // the first tick fires immediately and announces this session
        let mut sweep = tokio::time::interval(self.engine.config().sweep_interval());

        loop {
            let until_deadline = self
                .engine
                .next_deadline()
                .map(|deadline| (deadline - self.clock.now()).to_std().unwrap_or_default());

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                message = inbound.recv() => match message {
                    Ok(message) => self.handle_message(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%peer, skipped, "channel lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = sleep_for(until_deadline), if until_deadline.is_some() => {
                    self.engine.tick(self.clock.now());
                }
                _ = sweep.tick() => {
                    let now = self.clock.now();
                    self.engine.sweep_presence(now);
                    self.engine.broadcast_presence(None, now);
                }
            }

            self.publish()?;
        }

        let now = self.clock.now();
        self.engine.flush(now);
        self.engine.broadcast_leave(now);
        self.publish()?;
        info!(%peer, "session stopped");
        Ok(self.fields)
    }

    fn handle_command(&mut self, command: Command) {
        let now = self.clock.now();
        match command {
            Command::Edit {
                field,
                value,
                caret,
            } => {
                let old = self.fields.get(&field);
                self.engine.local_edit(&field, &old, &value, caret, now);
                self.fields.set(field, value);
            }
            Command::Undo => {
                let fields = &self.fields;
                if let Some(outcome) = self.engine.undo(|f| fields.get(f), now) {
                    self.fields.set(outcome.field, outcome.value);
                }
            }
            Command::Redo => {
                let fields = &self.fields;
                if let Some(outcome) = self.engine.redo(|f| fields.get(f), now) {
                    self.fields.set(outcome.field, outcome.value);
                }
            }
            Command::Flush => self.engine.flush(now),
            Command::Cursor { x, y, field } => self.engine.broadcast_cursor(x, y, field, now),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_message(&mut self, message: CollabMessage) {
        let now = self.clock.now();
        let fields = &self.fields;
        if let Some(edit) = self.engine.receive(message, |f| fields.get(f), now) {
            debug!(field = %edit.field, peer = %edit.sender, "displaying remote edit");
            self.fields.set(edit.field, edit.value);
        }
    }

    /// Send queued messages and forward UI events.
    fn publish(&mut self) -> Result<()> {
        for message in self.engine.drain_outbound() {
            self.channel.send(message)?;
        }
        for event in self.engine.drain_events() {
            let _ = self.events.send(event);
        }
        Ok(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            fields: self.fields.as_map().clone(),
            is_batching: self.engine.is_batching(),
            pending_operations: self.engine.total_pending(),
            can_undo: self.engine.can_undo(),
            can_redo: self.engine.can_redo(),
            version: self.engine.version(),
            collaborators: self.engine.collaborators(),
            history: self.engine.history().query().to_vec(),
        }
    }

    pub fn peer(&self) -> &PeerId {
        self.engine.peer()
    }
}

async fn sleep_for(duration: Option<std::time::Duration>) {
    if let Some(duration) = duration {
        tokio::time::sleep(duration).await;
    }
}
