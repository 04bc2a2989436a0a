//! Persistent search filter toggles.

use serde::{Deserialize, Serialize};

/// The three toggles that widen a search beyond plain live notes.
/// Every combination is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConditions {
    /// Match the query against tag names as well as note text.
    pub include_tags: bool,
    pub include_archived: bool,
    pub include_trashed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionField {
    Tags,
    Archived,
    Trashed,
}

impl ConditionField {
    pub const ALL: [ConditionField; 3] =
        [ConditionField::Tags, ConditionField::Archived, ConditionField::Trashed];
}

impl FilterConditions {
    /// Canonical default: every toggle off.
    pub fn get_default() -> Self {
        Self::default()
    }

    /// Inverts one field in place and returns the updated value.
    pub fn toggle(&mut self, field: ConditionField) -> Self {
        match field {
            ConditionField::Tags => self.include_tags = !self.include_tags,
            ConditionField::Archived => self.include_archived = !self.include_archived,
            ConditionField::Trashed => self.include_trashed = !self.include_trashed,
        }
        *self
    }

    pub fn get(&self, field: ConditionField) -> bool {
        match field {
            ConditionField::Tags => self.include_tags,
            ConditionField::Archived => self.include_archived,
            ConditionField::Trashed => self.include_trashed,
        }
    }

    pub fn serialize(&self) -> String {
        // Three bools cannot fail to encode.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses the persisted form. Blank or malformed input yields the default.
    pub fn deserialize(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::get_default();
        }
        serde_json::from_str(text).unwrap_or_else(|e| {
            tracing::debug!("Discarding malformed search conditions: {e}");
            Self::get_default()
        })
    }
}
