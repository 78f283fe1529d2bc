//! Facet toggle actions raised by views

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FacetSelector {
    /// Flip a single value in or out of the column's filter
    SelectSingleFacet,
    SelectAll,
    DeselectAll,
}

impl FacetSelector {
    pub fn is_bulk(&self) -> bool {
        !matches!(self, FacetSelector::SelectSingleFacet)
    }
}

/// A user action on one facet column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetSelectionEvent {
    pub column_name: String,
    /// Empty for bulk selectors
    pub facet_value: String,
    pub selector: FacetSelector,
}

impl FacetSelectionEvent {
    pub fn toggle(
        column_name: impl Into<String>,
        facet_value: impl Into<String>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            facet_value: facet_value.into(),
            selector: FacetSelector::SelectSingleFacet,
        }
    }

    pub fn select_all(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            facet_value: String::new(),
            selector: FacetSelector::SelectAll,
        }
    }

    pub fn deselect_all(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            facet_value: String::new(),
            selector: FacetSelector::DeselectAll,
        }
    }
}

/// Addresses one value of one facet column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FacetValueKey<'a> {
    pub column_name: &'a str,
    pub value: &'a str,
}

impl<'a> FacetValueKey<'a> {
    pub fn new(column_name: &'a str, value: &'a str) -> Self {
        Self { column_name, value }
    }
}
