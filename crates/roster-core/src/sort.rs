//! Spreadsheet-style multi-column sort state.
//!
//! A plain click makes a column the sole sort key; a modifier click builds a
//! priority-ordered list (first entry is the primary key). Each field appears
//! at most once.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "up" => Ok(Self::Asc),
            "desc" | "descending" | "down" => Ok(Self::Desc),
            other => bail!("unknown sort direction '{other}': expected asc or desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: SortDirection,
}

impl SortEntry {
    #[must_use]
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Wire token: the field name, prefixed with `-` when descending.
    #[must_use]
    pub fn token(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.field.clone(),
            SortDirection::Desc => format!("-{}", self.field),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortState {
    entries: Vec<SortEntry>,
}

impl SortState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build from a stored list. Later duplicates of a field are dropped so
    /// the first occurrence keeps its priority.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = SortEntry>) -> Self {
        let mut state = Self::new();
        for entry in entries {
            if state.position(&entry.field).is_none() {
                state.entries.push(entry);
            }
        }
        state
    }

    #[must_use]
    pub fn entries(&self) -> &[SortEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn direction_of(&self, field: &str) -> Option<SortDirection> {
        self.position(field).map(|idx| self.entries[idx].direction)
    }

    /// 1-based priority for header badges, `None` when unsorted.
    #[must_use]
    pub fn priority_of(&self, field: &str) -> Option<usize> {
        self.position(field).map(|idx| idx + 1)
    }

    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.entries.iter().map(SortEntry::token).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Apply a header click and return the resulting sort list.
    ///
    /// Without the modifier the clicked field becomes the only key: `asc` if
    /// it was unsorted, otherwise its current direction flipped. With the
    /// modifier the field cycles unsorted -> `asc` (appended) -> `desc` (in
    /// place) -> removed.
    pub fn toggle(&mut self, field: &str, with_modifier: bool) -> &[SortEntry] {
        let current = self.position(field);

        if with_modifier {
            match current {
                None => self.entries.push(SortEntry::new(field, SortDirection::Asc)),
                Some(idx) => match self.entries[idx].direction {
                    SortDirection::Asc => self.entries[idx].direction = SortDirection::Desc,
                    SortDirection::Desc => {
                        self.entries.remove(idx);
                    }
                },
            }
        } else {
            let direction = current.map_or(SortDirection::Asc, |idx| {
                self.entries[idx].direction.flipped()
            });
            self.entries.clear();
            self.entries.push(SortEntry::new(field, direction));
        }

        tracing::debug!(field, with_modifier, ordering = ?self.tokens(), "sort toggled");
        &self.entries
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(state: &SortState) -> Vec<String> {
        state.tokens()
    }

    #[test]
    fn plain_click_sets_sole_key_ascending() {
        let mut state = SortState::new();
        state.toggle("last_name", false);
        assert_eq!(fields(&state), vec!["last_name"]);
    }

    #[test]
    fn plain_click_on_sole_key_flips_direction() {
        let mut state = SortState::new();
        state.toggle("last_name", false);
        state.toggle("last_name", false);
        assert_eq!(fields(&state), vec!["-last_name"]);
        state.toggle("last_name", false);
        assert_eq!(fields(&state), vec!["last_name"]);
    }

    #[test]
    fn plain_click_discards_other_keys() {
        let mut state = SortState::new();
        state.toggle("last_name", true);
        state.toggle("email", true);
        state.toggle("id", false);
        assert_eq!(fields(&state), vec!["id"]);
    }

    #[test]
    fn plain_click_on_secondary_key_keeps_its_direction_flipped() {
        let mut state = SortState::new();
        state.toggle("last_name", true);
        state.toggle("email", true);
        state.toggle("email", true);
        assert_eq!(fields(&state), vec!["last_name", "-email"]);

        state.toggle("email", false);
        assert_eq!(fields(&state), vec!["email"]);
    }

    #[test]
    fn modifier_click_appends_at_lowest_priority() {
        let mut state = SortState::new();
        state.toggle("last_name", false);
        state.toggle("email", true);
        state.toggle("id", true);
        assert_eq!(fields(&state), vec!["last_name", "email", "id"]);
        assert_eq!(state.priority_of("id"), Some(3));
    }

    #[test]
    fn modifier_click_flips_in_place_then_removes() {
        let mut state = SortState::new();
        state.toggle("a", true);
        state.toggle("b", true);
        state.toggle("c", true);

        state.toggle("b", true);
        assert_eq!(fields(&state), vec!["a", "-b", "c"]);

        state.toggle("b", true);
        assert_eq!(fields(&state), vec!["a", "c"]);
        assert_eq!(state.direction_of("b"), None);
    }

    #[test]
    fn three_modifier_clicks_restore_previous_state() {
        let mut state = SortState::from_entries([
            SortEntry::new("a", SortDirection::Desc),
            SortEntry::new("b", SortDirection::Asc),
        ]);
        let before = state.clone();
        for _ in 0..3 {
            state.toggle("c", true);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn from_entries_keeps_first_occurrence() {
        let state = SortState::from_entries([
            SortEntry::new("a", SortDirection::Asc),
            SortEntry::new("b", SortDirection::Desc),
            SortEntry::new("a", SortDirection::Desc),
        ]);
        assert_eq!(fields(&state), vec!["a", "-b"]);
    }

    #[test]
    fn direction_parses_aliases() {
        assert_eq!("DESC".parse::<SortDirection>().expect("parse"), SortDirection::Desc);
        assert_eq!(" ascending ".parse::<SortDirection>().expect("parse"), SortDirection::Asc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}
