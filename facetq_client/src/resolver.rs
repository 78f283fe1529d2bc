//! Derives the next query request from a facet toggle.
//!
//! Everything here is a pure transformation: the current request is borrowed,
//! never changed, and a new request is handed back.

use facetq_common::{
    query::{FacetFilter, QueryRequest},
    result::{find_enumeration, FacetColumnValues, FacetResult},
    selection::{FacetSelectionEvent, FacetSelector},
};

use crate::error::QueryError;

/// Look up the known values of a categorical column.
///
/// Fails with [QueryError::InvalidFacetColumn] if the column has no
/// enumeration facet in the list (absent, or range typed).
pub fn known_facet_values<'a>(
    known_facets: &'a [FacetResult],
    column_name: &str,
) -> Result<&'a FacetColumnValues, QueryError> {
    find_enumeration(known_facets, column_name)
        .ok_or_else(|| QueryError::InvalidFacetColumn(column_name.to_string()))
}

/// Compute the request that follows `event`.
///
/// `known_facets` is the facet list of the current result; `SelectAll` uses it
/// to materialize every value of the column.
///
/// The returned request always starts from the first page, and any page token
/// is dropped.
pub fn resolve(
    current: &QueryRequest,
    event: &FacetSelectionEvent,
    known_facets: &[FacetResult],
) -> Result<QueryRequest, QueryError> {
    let column = event.column_name.as_str();
    let known = known_facet_values(known_facets, column)?;

    let filter = match event.selector {
        FacetSelector::SelectSingleFacet => {
            if event.facet_value.is_empty() {
                return Err(QueryError::EmptyFacetValue(column.to_string()));
            }

            let mut filter = current
                .filter_for(column)
                .cloned()
                .unwrap_or_else(|| FacetFilter::new(column));

            // symmetric difference with the single value
            if !filter.facet_values.remove(&event.facet_value) {
                filter.facet_values.insert(event.facet_value.clone());
            }

            filter
        }
        FacetSelector::SelectAll => FacetFilter::with_values(column, known.values()),
        // empty, but present: match nothing
        FacetSelector::DeselectAll => FacetFilter::new(column),
    };

    log::debug!(
        "Resolved {:?} on '{}': {} value(s) now selected",
        event.selector,
        column,
        filter.facet_values.len()
    );

    Ok(current.with_filter(filter))
}
