//! What a rendering component sees of one query.
//!
//! A [QueryView] wraps an orchestrator and adds the view-local flags that are
//! not part of the query state, along with facet display helpers.

use std::sync::Arc;

use facetq_common::{
    common::COLLAPSED_FACET_COUNT,
    query::{PartMask, QueryRequest},
    result::{FacetColumnValues, QueryResult},
    selection::{FacetSelectionEvent, FacetValueKey},
};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    error::QueryError,
    orchestrator::{QueryOrchestrator, QuerySnapshot, Settlement},
    selection::{is_all_filter_selected, is_value_selected},
    transport::QueryTransport,
};

/// Flags owned by the component embedding the view
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ViewFlags {
    /// Show every facet value instead of the collapsed list
    pub show_all_facets: bool,
}

/// A partial update of [ViewFlags]; `None` fields are left alone
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ViewFlagsUpdate {
    pub show_all_facets: Option<bool>,
}

/// A facet value as it should be displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleFacetValue {
    pub value: String,
    pub label: String,
    pub count: u64,
    pub is_selected: bool,
}

#[derive(Debug, Clone)]
pub struct QueryView {
    orchestrator: QueryOrchestrator,
    flags: ViewFlags,
}

impl QueryView {
    pub fn new<T>(initial: QueryRequest, transport: T) -> Self
    where
        T: QueryTransport + 'static,
    {
        Self::from_orchestrator(QueryOrchestrator::new(initial, transport))
    }

    pub fn from_orchestrator(orchestrator: QueryOrchestrator) -> Self {
        Self {
            orchestrator,
            flags: ViewFlags::default(),
        }
    }

    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot> {
        self.orchestrator.subscribe()
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.orchestrator.snapshot()
    }

    /// The latest settled result, if any
    pub fn data(&self) -> Option<Arc<QueryResult>> {
        self.orchestrator.last_result()
    }

    pub fn is_loading(&self) -> bool {
        self.orchestrator.is_loading()
    }

    pub fn get_last_query_request(&self) -> QueryRequest {
        self.orchestrator.get_last_query_request()
    }

    pub fn execute_query_request(
        &self,
        request: QueryRequest,
    ) -> JoinHandle<Settlement> {
        self.orchestrator.execute_query_request(request)
    }

    pub fn execute_initial_query_request(&self) -> JoinHandle<Settlement> {
        self.orchestrator.execute_initial_query_request()
    }

    pub fn flags(&self) -> ViewFlags {
        self.flags
    }

    pub fn update_parent_state(&mut self, update: ViewFlagsUpdate) {
        if let Some(show_all) = update.show_all_facets {
            self.flags.show_all_facets = show_all;
        }
    }

    pub fn last_facet_selection(&self) -> Option<FacetSelectionEvent> {
        self.snapshot().last_facet_selection().cloned()
    }

    pub fn is_all_filter_selected_for_facet(&self, column_name: &str) -> bool {
        is_all_filter_selected(column_name, &self.snapshot().selection)
    }

    pub fn is_value_selected(&self, column_name: &str, value: &str) -> bool {
        let snapshot = self.snapshot();
        is_value_selected(
            FacetValueKey::new(column_name, value),
            &snapshot.selection,
            snapshot.result.as_deref(),
            snapshot.is_loading(),
        )
    }

    /// Toggle facet values and issue the resulting request.
    ///
    /// Once the user has interacted with a facet, the full value list stays
    /// expanded.
    pub fn apply_facet_selection(
        &mut self,
        event: &FacetSelectionEvent,
    ) -> Result<JoinHandle<Settlement>, QueryError> {
        let handle = self.orchestrator.apply_facet_selection(event)?;
        self.flags.show_all_facets = true;
        Ok(handle)
    }

    pub fn next_page(&self) -> JoinHandle<Settlement> {
        self.orchestrator.next_page()
    }

    pub fn previous_page(&self) -> JoinHandle<Settlement> {
        self.orchestrator.previous_page()
    }

    /// The enumeration facet of a column in the latest result
    pub fn facet_for_display(
        &self,
        column_name: &str,
    ) -> Result<FacetColumnValues, QueryError> {
        let snapshot = self.snapshot();

        if !snapshot.request.part_mask.contains(PartMask::FACETS) {
            return Err(QueryError::MissingFacetsInResult);
        }

        let result = snapshot
            .result
            .as_deref()
            .ok_or(QueryError::MissingFacetsInResult)?;

        let facets = result
            .facets
            .as_deref()
            .ok_or(QueryError::MissingFacetsInResult)?;

        crate::resolver::known_facet_values(facets, column_name).cloned()
    }

    /// Facet values in display order: most frequent first, collapsed to a
    /// short list unless [ViewFlags::show_all_facets] is set.
    pub fn visible_facet_values(
        &self,
        column_name: &str,
    ) -> Result<Vec<VisibleFacetValue>, QueryError> {
        let facet = self.facet_for_display(column_name)?;
        let snapshot = self.snapshot();

        let mut values = facet.facet_values;
        values.sort_by(|a, b| b.count.cmp(&a.count));

        if !self.flags.show_all_facets {
            values.truncate(COLLAPSED_FACET_COUNT);
        }

        Ok(values
            .iter()
            .map(|v| VisibleFacetValue {
                value: v.value.clone(),
                label: v.display_value().to_string(),
                count: v.count,
                is_selected: is_value_selected(
                    FacetValueKey::new(column_name, &v.value),
                    &snapshot.selection,
                    snapshot.result.as_deref(),
                    snapshot.is_loading(),
                ),
            })
            .collect())
    }
}
