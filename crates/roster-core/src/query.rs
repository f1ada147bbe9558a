//! Canonical query construction.
//!
//! [`QueryBuilder::build`] folds the user-facing collection state into a
//! [`CanonicalQuery`] whose serialized form is stable: equal inputs always
//! serialize to identical bytes, which is what the fetch gate compares.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::QueryError;
use crate::sort::SortState;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A filter as the UI holds it: a single value or a multi-select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

impl FilterValue {
    /// Array form used in the canonical query, `None` when the filter is
    /// empty and must be omitted.
    #[must_use]
    pub fn normalized(&self) -> Option<Vec<String>> {
        match self {
            Self::One(value) if value.trim().is_empty() => None,
            Self::One(value) => Some(vec![value.clone()]),
            Self::Many(values) if values.is_empty() => None,
            Self::Many(values) => Some(values.clone()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.normalized().is_none()
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl<T: Into<String>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    page: u32,
    page_size: u32,
}

impl Pagination {
    pub const DEFAULT_PAGE_SIZE: u32 = 25;

    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPagination`] if either value is zero.
    pub const fn new(page: u32, page_size: u32) -> Result<Self, QueryError> {
        if page == 0 || page_size == 0 {
            return Err(QueryError::InvalidPagination { page, page_size });
        }
        Ok(Self { page, page_size })
    }

    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPagination`] if `page_size` is zero.
    pub const fn first_page(page_size: u32) -> Result<Self, QueryError> {
        Self::new(1, page_size)
    }

    #[must_use]
    pub const fn page(self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn page_size(self) -> u32 {
        self.page_size
    }

    /// Same page size, back on page 1.
    #[must_use]
    pub const fn reset(self) -> Self {
        Self {
            page: 1,
            page_size: self.page_size,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// CanonicalQuery
// ---------------------------------------------------------------------------

/// Immutable, normalized collection query.
///
/// Fields are already canonical (trimmed search, sorted filter keys, array
/// filter values), so structural equality coincides with equality of
/// [`CanonicalQuery::serialized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CanonicalQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<String>,
    filters: BTreeMap<String, Vec<String>>,
    ordering: Vec<String>,
    page: u32,
    page_size: u32,
}

impl CanonicalQuery {
    #[must_use]
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    #[must_use]
    pub const fn filters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.filters
    }

    #[must_use]
    pub fn filter(&self, key: &str) -> Option<&[String]> {
        self.filters.get(key).map(Vec::as_slice)
    }

    /// Sort tokens, primary key first, `-` prefix for descending.
    #[must_use]
    pub fn ordering(&self) -> &[String] {
        &self.ordering
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Byte-stable JSON form used for duplicate detection.
    #[must_use]
    pub fn serialized(&self) -> String {
        // Maps with string keys and plain strings always serialize.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    /// Query-string pairs for the collection endpoint: multi-value filters
    /// and the ordering list are comma-joined, empty ordering is omitted.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 4);
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        for (key, values) in &self.filters {
            pairs.push((key.clone(), values.join(",")));
        }
        if !self.ordering.is_empty() {
            pairs.push(("ordering".to_string(), self.ordering.join(",")));
        }
        pairs.push(("page".to_string(), self.page.to_string()));
        pairs.push(("page_size".to_string(), self.page_size.to_string()));
        pairs
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct QueryBuilder;

impl QueryBuilder {
    /// Build the canonical query for the given collection state. Pure.
    #[must_use]
    pub fn build(
        search: &str,
        filters: &BTreeMap<String, FilterValue>,
        sort: &SortState,
        pagination: Pagination,
    ) -> CanonicalQuery {
        let search = search.trim();
        let filters = filters
            .iter()
            .filter_map(|(key, value)| value.normalized().map(|values| (key.clone(), values)))
            .collect();

        CanonicalQuery {
            search: (!search.is_empty()).then(|| search.to_string()),
            filters,
            ordering: sort.tokens(),
            page: pagination.page(),
            page_size: pagination.page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::{SortDirection, SortEntry};

    fn filters(pairs: &[(&str, FilterValue)]) -> BTreeMap<String, FilterValue> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    fn search_only(search: &str) -> CanonicalQuery {
        QueryBuilder::build(search, &BTreeMap::new(), &SortState::new(), Pagination::default())
    }

    #[test]
    fn end_to_end_scenario_renders_expected_pairs() {
        let sort = SortState::from_entries([SortEntry::new("name", SortDirection::Asc)]);
        let filters = filters(&[
            ("department", vec!["eng"].into()),
            ("status", FilterValue::Many(vec![])),
            ("unit", "".into()),
        ]);
        let query = QueryBuilder::build(
            "john",
            &filters,
            &sort,
            Pagination::new(2, 25).expect("valid pagination"),
        );

        assert_eq!(query.filter("status"), None);
        assert_eq!(query.filter("unit"), None);
        assert_eq!(
            query.to_query_pairs(),
            vec![
                ("search".to_string(), "john".to_string()),
                ("department".to_string(), "eng".to_string()),
                ("ordering".to_string(), "name".to_string()),
                ("page".to_string(), "2".to_string()),
                ("page_size".to_string(), "25".to_string()),
            ]
        );
    }

    #[test]
    fn whitespace_search_is_omitted() {
        let query = search_only("   ");
        assert_eq!(query.search(), None);
        assert!(!query.serialized().contains("search"));
        assert!(query.to_query_pairs().iter().all(|(key, _)| key != "search"));
    }

    #[test]
    fn search_is_trimmed_so_padding_does_not_change_identity() {
        let a = search_only("ann");
        let b = search_only("  ann ");
        assert_eq!(a.serialized(), b.serialized());
        assert_eq!(a, b);
    }

    #[test]
    fn single_value_and_one_element_array_are_identical() {
        let one = filters(&[("department", "eng".into())]);
        let many = filters(&[("department", vec!["eng"].into())]);
        let a = QueryBuilder::build("", &one, &SortState::new(), Pagination::default());
        let b = QueryBuilder::build("", &many, &SortState::new(), Pagination::default());
        assert_eq!(a.serialized(), b.serialized());
    }

    #[test]
    fn array_order_is_preserved_and_joined() {
        let f = filters(&[("status", vec!["3", "1", "2"].into())]);
        let query = QueryBuilder::build("", &f, &SortState::new(), Pagination::default());
        assert_eq!(query.filter("status"), Some(&["3".to_string(), "1".into(), "2".into()][..]));
        assert!(query
            .to_query_pairs()
            .contains(&("status".to_string(), "3,1,2".to_string())));
    }

    #[test]
    fn ordering_preserves_priority_and_marks_descending() {
        let sort = SortState::from_entries([
            SortEntry::new("last_name", SortDirection::Desc),
            SortEntry::new("email", SortDirection::Asc),
        ]);
        let query = QueryBuilder::build("", &BTreeMap::new(), &sort, Pagination::default());
        assert_eq!(query.ordering(), &["-last_name".to_string(), "email".to_string()][..]);
        assert!(query
            .to_query_pairs()
            .contains(&("ordering".to_string(), "-last_name,email".to_string())));
    }

    #[test]
    fn empty_sort_omits_ordering_but_keeps_pagination() {
        let query = search_only("");
        let pairs = query.to_query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("page".to_string(), "1".to_string()),
                ("page_size".to_string(), "25".to_string()),
            ]
        );
    }

    #[test]
    fn pagination_rejects_zero() {
        assert_eq!(
            Pagination::new(0, 25),
            Err(QueryError::InvalidPagination { page: 0, page_size: 25 })
        );
        assert!(Pagination::first_page(0).is_err());
        let p = Pagination::new(4, 50).expect("valid");
        assert_eq!(p.reset(), Pagination::new(1, 50).expect("valid"));
    }
}
