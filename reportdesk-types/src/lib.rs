//! Shared types for reportdesk
//!
//! This crate provides the records exchanged between collaborating report
//! builder sessions: text operations, peer and batch identifiers, and cursor
//! positions. Field names serialize in camelCase so browser clients can
//! consume them without a mapping layer.

use serde::{Deserialize, Serialize};

/// Collaborator identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Batch identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an operation was produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Local,
    Remote,
}

/// A single insert/delete edit to one field.
///
/// Positions and lengths count `char`s. `deleted_text` holds the removed text
/// when it is known (always for locally derived operations) so the edit can
/// be inverted without re-reading the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub field: String,
    pub position: usize,
    pub deleted_length: usize,
    #[serde(default)]
    pub deleted_text: String,
    #[serde(default)]
    pub inserted_text: String,
    #[serde(default)]
    pub origin_version: u64,
    #[serde(default)]
    pub origin: Origin,
}

impl Operation {
    /// Insert `text` at `position`.
    pub fn insert(field: impl Into<String>, position: usize, text: impl Into<String>) -> Self {
        Self::replace(field, position, "", text)
    }

    /// Delete `deleted` starting at `position`.
    pub fn delete(field: impl Into<String>, position: usize, deleted: impl Into<String>) -> Self {
        Self::replace(field, position, deleted, "")
    }

    /// Replace `deleted` at `position` with `inserted`.
    pub fn replace(
        field: impl Into<String>,
        position: usize,
        deleted: impl Into<String>,
        inserted: impl Into<String>,
    ) -> Self {
        let deleted_text = deleted.into();
        Self {
            field: field.into(),
            position,
            deleted_length: deleted_text.chars().count(),
            deleted_text,
            inserted_text: inserted.into(),
            origin_version: 0,
            origin: Origin::Local,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.origin_version = version;
        self
    }

    /// Number of chars this operation inserts.
    pub fn inserted_length(&self) -> usize {
        self.inserted_text.chars().count()
    }

    /// Exclusive end of the deleted range in the pre-edit text.
    pub fn deleted_end(&self) -> usize {
        self.position + self.deleted_length
    }

    /// Net change in text length once applied.
    pub fn length_delta(&self) -> isize {
        self.inserted_length() as isize - self.deleted_length as isize
    }

    /// True when applying the operation cannot change any text.
    pub fn is_noop(&self) -> bool {
        self.deleted_length == 0 && self.inserted_text.is_empty()
    }

    /// The operation that undoes this one: the inserted span is deleted and the
    /// deleted text is put back at the same position.
    pub fn inverse(&self) -> Self {
        Self {
            field: self.field.clone(),
            position: self.position,
            deleted_length: self.inserted_length(),
            deleted_text: self.inserted_text.clone(),
            inserted_text: self.deleted_text.clone(),
            origin_version: self.origin_version,
            origin: self.origin,
        }
    }
}

/// Pointer position reported by a collaborator's client, in editor pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
