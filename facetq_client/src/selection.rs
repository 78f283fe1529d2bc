//! Per-value "is selected" predicates for views.
//!
//! A [SelectionState] is derived data: it remembers which columns the user has
//! touched, the latest toggle, and what the edited column looked like when
//! that toggle was made. Predicates combine it with the latest settled result.

use std::collections::{HashMap, HashSet};

use facetq_common::{
    query::QueryRequest,
    result::QueryResult,
    selection::{FacetSelectionEvent, FacetSelector, FacetValueKey},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    /// Columns the user has acted on, with their "everything selected" flag
    all_selected: HashMap<String, bool>,
    last_event: Option<FacetSelectionEvent>,
    /// Values shown as selected in the edited column when `last_event` was
    /// made. `None` means every value was.
    pre_request: Option<HashSet<String>>,
}

impl SelectionState {
    /// The most recent toggle, if any
    pub fn last_event(&self) -> Option<&FacetSelectionEvent> {
        self.last_event.as_ref()
    }

    /// True once any toggle has been made on the column
    pub fn is_touched(&self, column_name: &str) -> bool {
        self.all_selected.contains_key(column_name)
    }

    /// Derive the state after `event`.
    ///
    /// `result` is the result on display when the event happened and `next`
    /// the request the event resolved to.
    pub fn record(
        &self,
        event: &FacetSelectionEvent,
        result: Option<&QueryResult>,
        next: &QueryRequest,
    ) -> Self {
        let column = event.column_name.as_str();

        let pre_request = if self.is_touched(column) {
            let shown = result
                .and_then(|r| r.enumeration_facet(column))
                .map(|facet| {
                    facet
                        .values()
                        .filter(|v| {
                            is_value_selected(
                                FacetValueKey::new(column, v),
                                self,
                                result,
                                false,
                            )
                        })
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            Some(shown)
        } else {
            None
        };

        let was_all = is_all_filter_selected(column, self);

        let now_all = match event.selector {
            FacetSelector::SelectAll => true,
            FacetSelector::DeselectAll => false,
            FacetSelector::SelectSingleFacet => {
                let narrowed = next
                    .filter_for(column)
                    .map(|f| !f.facet_values.contains(&event.facet_value))
                    .unwrap_or(true);

                was_all && !narrowed
            }
        };

        let mut all_selected = self.all_selected.clone();
        all_selected.insert(column.to_string(), now_all);

        Self {
            all_selected,
            last_event: Some(event.clone()),
            pre_request,
        }
    }
}

/// Decide whether a facet value should be shown as selected.
///
/// - a column nobody has touched shows every value as selected;
/// - while loading, the column being edited keeps showing what it showed
///   before the request went out;
/// - otherwise the settled result decides. Values the result does not list are
///   not selected.
pub fn is_value_selected(
    key: FacetValueKey,
    selection: &SelectionState,
    result: Option<&QueryResult>,
    is_loading: bool,
) -> bool {
    if !selection.is_touched(key.column_name) {
        return true;
    }

    if is_loading {
        if let Some(event) = &selection.last_event {
            if event.column_name == key.column_name {
                return selection
                    .pre_request
                    .as_ref()
                    .map(|s| s.contains(key.value))
                    .unwrap_or(true);
            }
        }
    }

    result
        .and_then(|r| r.enumeration_facet(key.column_name))
        .and_then(|f| f.find(key.value))
        .map(|v| v.is_selected)
        .unwrap_or(false)
}

/// True if the latest bulk action on the column was "select all" and no single
/// toggle has narrowed it since.
pub fn is_all_filter_selected(
    column_name: &str,
    selection: &SelectionState,
) -> bool {
    selection
        .all_selected
        .get(column_name)
        .copied()
        .unwrap_or(false)
}
