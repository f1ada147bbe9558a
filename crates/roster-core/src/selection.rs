//! Cross-page row selection.

use std::collections::BTreeSet;

/// What a select-all click did to the visible rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAllEffect {
    /// Visible rows were added; carries how many were newly selected.
    Selected(usize),
    /// Every visible row was already selected, so those rows were removed.
    Deselected(usize),
}

/// Tri-state of a header checkbox relative to the visible rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleSelection {
    None,
    Some,
    All,
}

/// Selected identifiers, independent of which page is displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet<K: Ord> {
    ids: BTreeSet<K>,
}

impl<K: Ord> Default for SelectionSet<K> {
    fn default() -> Self {
        Self {
            ids: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Clone> SelectionSet<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of one id. Returns whether it is now selected.
    pub fn toggle(&mut self, id: K) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    /// Select-all-or-none over the visible rows only.
    ///
    /// If every visible id is already selected those ids are removed and
    /// selections from other pages are kept; otherwise every visible id is
    /// added.
    pub fn select_all<'a, I>(&mut self, visible: I) -> SelectAllEffect
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let visible: Vec<&K> = visible.into_iter().collect();
        if visible.iter().all(|id| self.ids.contains(*id)) {
            let removed = visible.iter().filter(|id| self.ids.remove(**id)).count();
            SelectAllEffect::Deselected(removed)
        } else {
            let added = visible
                .into_iter()
                .filter(|id| self.ids.insert((*id).clone()))
                .count();
            SelectAllEffect::Selected(added)
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    #[must_use]
    pub fn is_selected(&self, id: &K) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &K> {
        self.ids.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<K> {
        self.ids.iter().cloned().collect()
    }

    #[must_use]
    pub fn visible_state<'a, I>(&self, visible: I) -> VisibleSelection
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut total = 0_usize;
        let mut selected = 0_usize;
        for id in visible {
            total += 1;
            if self.ids.contains(id) {
                selected += 1;
            }
        }
        match selected {
            0 => VisibleSelection::None,
            n if n == total => VisibleSelection::All,
            _ => VisibleSelection::Some,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_membership() {
        let mut set = SelectionSet::new();
        assert!(set.toggle(3_u64));
        assert!(set.is_selected(&3));
        assert!(!set.toggle(3));
        assert!(set.is_empty());
    }

    #[test]
    fn select_all_adds_missing_visible_rows() {
        let mut set = SelectionSet::new();
        set.toggle(2_u64);
        let effect = set.select_all(&[1, 2, 3]);
        assert_eq!(effect, SelectAllEffect::Selected(2));
        assert_eq!(set.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn select_all_twice_keeps_other_pages() {
        let mut set = SelectionSet::new();
        set.toggle(40_u64);
        set.toggle(41);

        assert_eq!(set.select_all(&[1, 2]), SelectAllEffect::Selected(2));
        assert_eq!(set.select_all(&[1, 2]), SelectAllEffect::Deselected(2));
        assert_eq!(set.to_vec(), vec![40, 41]);
    }

    #[test]
    fn visible_state_reports_tristate() {
        let mut set = SelectionSet::new();
        let page = [10_u64, 11, 12];
        assert_eq!(set.visible_state(&page), VisibleSelection::None);
        set.toggle(11);
        assert_eq!(set.visible_state(&page), VisibleSelection::Some);
        set.select_all(&page);
        assert_eq!(set.visible_state(&page), VisibleSelection::All);
    }

    #[test]
    fn empty_page_select_all_is_a_noop() {
        let mut set = SelectionSet::new();
        set.toggle(5_u64);
        assert_eq!(set.select_all(&[]), SelectAllEffect::Deselected(0));
        assert_eq!(set.len(), 1);
    }
}
