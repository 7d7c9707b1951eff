//! Keyed store of latest field text.

use std::collections::BTreeMap;

/// Field name to latest known text, for callers without their own UI state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldStore {
    values: BTreeMap<String, String>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of `field`; fields never written read as empty.
    pub fn get(&self, field: &str) -> String {
        self.values.get(field).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
