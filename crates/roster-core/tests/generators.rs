//! Proptest strategies for roster-core state machines.

#![allow(dead_code)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use roster_core::query::FilterValue;
use roster_core::sort::{SortDirection, SortEntry, SortState};

pub const FIELDS: [&str; 6] = ["id", "first_name", "last_name", "email", "status", "unit"];

pub fn arb_field() -> impl Strategy<Value = String> {
    prop::sample::select(&FIELDS[..]).prop_map(str::to_string)
}

pub fn arb_direction() -> impl Strategy<Value = SortDirection> {
    prop_oneof![Just(SortDirection::Asc), Just(SortDirection::Desc)]
}

pub fn arb_sort_state() -> impl Strategy<Value = SortState> {
    prop::collection::vec((arb_field(), arb_direction()), 0..5).prop_map(|entries| {
        SortState::from_entries(
            entries
                .into_iter()
                .map(|(field, direction)| SortEntry::new(field, direction)),
        )
    })
}

pub fn arb_clicks() -> impl Strategy<Value = Vec<(String, bool)>> {
    prop::collection::vec((arb_field(), any::<bool>()), 0..40)
}

pub fn arb_filter_value() -> impl Strategy<Value = FilterValue> {
    prop_oneof![
        "[a-z0-9 ]{0,6}".prop_map(FilterValue::One),
        prop::collection::vec("[a-z0-9]{1,4}", 0..4).prop_map(FilterValue::Many),
    ]
}

pub fn arb_filters() -> impl Strategy<Value = BTreeMap<String, FilterValue>> {
    prop::collection::btree_map(
        prop::sample::select(&["department", "status", "tag", "unit"][..]).prop_map(str::to_string),
        arb_filter_value(),
        0..4,
    )
}
