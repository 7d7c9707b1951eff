//! Roster of collaborators viewing or editing the report.
//!
//! Entries are local mirrors of remote state: created on a peer's first
//! message, refreshed by every presence, cursor or edit message, and expired
//! by [`PresenceTracker::sweep`] once the peer goes quiet. Colors come from a
//! fixed palette indexed by first-seen order and stay assigned for the whole
//! session, even across a peer's expiry and return.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use reportdesk_types::{CursorPosition, PeerId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const PALETTE: [&str; 8] = [
    "#3B82F6", "#EF4444", "#10B981", "#F59E0B", "#8B5CF6", "#EC4899", "#14B8A6", "#F97316",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorPresence {
    pub user_id: PeerId,
    pub user_name: String,
    pub color: String,
    pub cursor_position: Option<CursorPosition>,
    pub selected_field: Option<String>,
    pub last_seen: DateTime<Utc>,
}

/// Fields carried by one inbound message; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceUpdate {
    pub user_name: Option<String>,
    pub cursor_position: Option<CursorPosition>,
    pub selected_field: Option<String>,
    /// Sender heartbeat timestamp. Messages without one are malformed.
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct PresenceTracker {
    peers: BTreeMap<PeerId, CollaboratorPresence>,
    ordinals: HashMap<PeerId, usize>,
    timeout: TimeDelta,
}

impl PresenceTracker {
    pub fn new(timeout: TimeDelta) -> Self {
        Self {
            peers: BTreeMap::new(),
            ordinals: HashMap::new(),
            timeout,
        }
    }

    /// Upsert `peer` from an inbound message received at `now`.
    ///
    /// Returns false when the message carried no heartbeat timestamp; such
    /// messages are dropped without creating an entry.
    pub fn update_presence(&mut self, peer: &PeerId, update: PresenceUpdate, now: DateTime<Utc>) -> bool {
        if update.sent_at.is_none() {
            warn!(%peer, "dropping presence without last_seen");
            return false;
        }

        let color = self.color_for(peer);
        let entry = self
            .peers
            .entry(peer.clone())
            .or_insert_with(|| {
                debug!(%peer, %color, "collaborator joined");
                CollaboratorPresence {
                    user_id: peer.clone(),
                    user_name: peer.to_string(),
                    color,
                    cursor_position: None,
                    selected_field: None,
                    last_seen: now,
                }
            });

        if let Some(name) = update.user_name {
            entry.user_name = name;
        }
        if let Some(cursor) = update.cursor_position {
            entry.cursor_position = Some(cursor);
        }
        if let Some(field) = update.selected_field {
            entry.selected_field = Some(field);
        }
        entry.last_seen = now;
        true
    }

    /// Forget `peer` immediately, e.g. on an explicit leave.
    pub fn remove(&mut self, peer: &PeerId) -> Option<CollaboratorPresence> {
        self.peers.remove(peer)
    }

    /// Expire peers not heard from within the timeout. Returns who left.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<PeerId> {
        let cutoff = now - self.timeout;
        let expired: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| p.last_seen < cutoff)
            .map(|p| p.user_id.clone())
            .collect();

        for peer in &expired {
            self.peers.remove(peer);
            debug!(%peer, "collaborator expired");
        }
        expired
    }

    /// Current roster in first-seen order.
    pub fn collaborators(&self) -> Vec<CollaboratorPresence> {
        let mut roster: Vec<_> = self.peers.values().cloned().collect();
        roster.sort_by_key(|p| self.ordinals.get(&p.user_id).copied().unwrap_or(usize::MAX));
        roster
    }

    pub fn get(&self, peer: &PeerId) -> Option<&CollaboratorPresence> {
        self.peers.get(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Stable color for `peer`, assigning the next palette slot on first sight.
    pub fn color_for(&mut self, peer: &PeerId) -> String {
        let next = self.ordinals.len();
        let ordinal = *self.ordinals.entry(peer.clone()).or_insert(next);
        PALETTE[ordinal % PALETTE.len()].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(secs)
    }

    fn heartbeat(secs: i64) -> PresenceUpdate {
        PresenceUpdate {
            sent_at: Some(at(secs)),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_merges_partial_state() {
        let mut tracker = PresenceTracker::new(TimeDelta::seconds(30));
        let alice = PeerId::new("alice");

        tracker.update_presence(
            &alice,
            PresenceUpdate {
                user_name: Some("Alice".into()),
                selected_field: Some("title".into()),
                ..heartbeat(0)
            },
            at(0),
        );
        tracker.update_presence(
            &alice,
            PresenceUpdate {
                cursor_position: Some(CursorPosition::new(10.0, 20.0)),
                ..heartbeat(5)
            },
            at(5),
        );

        let entry = tracker.get(&alice).unwrap();
        assert_eq!(entry.user_name, "Alice");
        assert_eq!(entry.selected_field.as_deref(), Some("title"));
        assert_eq!(entry.cursor_position, Some(CursorPosition::new(10.0, 20.0)));
        assert_eq!(entry.last_seen, at(5));
    }

    #[test]
    fn test_missing_heartbeat_is_dropped() {
        let mut tracker = PresenceTracker::new(TimeDelta::seconds(30));
        let accepted = tracker.update_presence(&PeerId::new("bob"), PresenceUpdate::default(), at(0));

        assert!(!accepted);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_sweep_expires_stale_peers() {
        let mut tracker = PresenceTracker::new(TimeDelta::seconds(30));
        tracker.update_presence(&PeerId::new("alice"), heartbeat(0), at(0));
        tracker.update_presence(&PeerId::new("bob"), heartbeat(20), at(20));

        let expired = tracker.sweep(at(31));
        assert_eq!(expired, vec![PeerId::new("alice")]);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(&PeerId::new("bob")).is_some());
    }

    #[test]
    fn test_colors_are_stable_across_expiry() {
        let mut tracker = PresenceTracker::new(TimeDelta::seconds(30));
        let alice = PeerId::new("alice");
        let bob = PeerId::new("bob");

        tracker.update_presence(&alice, heartbeat(0), at(0));
        tracker.update_presence(&bob, heartbeat(0), at(0));
        let alice_color = tracker.get(&alice).unwrap().color.clone();
        assert_eq!(alice_color, PALETTE[0]);
        assert_eq!(tracker.get(&bob).unwrap().color, PALETTE[1]);

        tracker.sweep(at(100));
        assert!(tracker.is_empty());

        tracker.update_presence(&bob, heartbeat(101), at(101));
        tracker.update_presence(&alice, heartbeat(101), at(101));
        assert_eq!(tracker.get(&alice).unwrap().color, alice_color);

        let roster = tracker.collaborators();
        assert_eq!(roster[0].user_id, alice);
    }
}
