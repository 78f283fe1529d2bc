//! A menu of query views over the same backend, one active at a time.

use std::sync::Arc;

use facetq_common::{
    common::{strings, DEFAULT_PAGE_LIMIT},
    query::{PartMask, QueryRequest},
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{
    error::QueryError,
    orchestrator::{QueryOrchestrator, QueryPhase, Settlement},
    transport::QueryTransport,
    view::QueryView,
};

fn default_unit_description() -> String {
    strings::DEFAULT_UNIT_DESCRIPTION.to_string()
}

/// One menu entry
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuConfig {
    pub sql: String,
    /// The facet column this entry's controls address
    pub filter: String,
    pub title: Option<String>,
    #[serde(default = "default_unit_description")]
    pub unit_description: String,
    #[serde(alias = "synapseId")]
    pub dataset_id: Option<String>,
}

impl MenuConfig {
    pub fn new(sql: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            filter: filter.into(),
            title: None,
            unit_description: default_unit_description(),
            dataset_id: None,
        }
    }

    /// First page, rows with column models and facets, eventual consistency
    pub fn initial_request(&self) -> QueryRequest {
        QueryRequest::new(self.sql.clone())
            .with_limit(DEFAULT_PAGE_LIMIT)
            .with_part_mask(PartMask::view_default())
            .with_consistency(false)
    }
}

#[derive(Debug)]
pub struct QueryMenu {
    entries: Vec<(MenuConfig, QueryView)>,
    active: usize,
}

impl QueryMenu {
    /// Build one idle view per entry. The first entry is active.
    pub fn new(
        configs: Vec<MenuConfig>,
        transport: Arc<dyn QueryTransport>,
    ) -> Result<Self, QueryError> {
        if configs.is_empty() {
            return Err(QueryError::MenuIndexOutOfRange(0));
        }

        let entries = configs
            .into_iter()
            .map(|config| {
                let orchestrator = QueryOrchestrator::from_shared(
                    config.initial_request(),
                    transport.clone(),
                );
                (config, QueryView::from_orchestrator(orchestrator))
            })
            .collect();

        Ok(Self { entries, active: 0 })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn configs(&self) -> impl Iterator<Item = &MenuConfig> {
        self.entries.iter().map(|(c, _)| c)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_config(&self) -> &MenuConfig {
        &self.entries[self.active].0
    }

    pub fn active(&self) -> &QueryView {
        &self.entries[self.active].1
    }

    pub fn active_mut(&mut self) -> &mut QueryView {
        &mut self.entries[self.active].1
    }

    /// Issue the initial request of every entry that was never loaded, so
    /// that all entries have data before they are shown.
    pub fn load_all(&self) -> Vec<JoinHandle<Settlement>> {
        self.entries
            .iter()
            .filter(|(_, view)| view.orchestrator().phase() == QueryPhase::Idle)
            .map(|(config, view)| {
                log::debug!("Loading menu entry '{}'", config.filter);
                view.execute_initial_query_request()
            })
            .collect()
    }

    /// Switch to another entry.
    ///
    /// A view that was never loaded issues its initial request; the handle for
    /// it is returned.
    pub fn select(
        &mut self,
        index: usize,
    ) -> Result<Option<JoinHandle<Settlement>>, QueryError> {
        if index >= self.entries.len() {
            return Err(QueryError::MenuIndexOutOfRange(index));
        }

        self.active = index;

        let (config, view) = &self.entries[index];
        log::debug!("Menu switched to '{}'", config.filter);

        if view.orchestrator().phase() == QueryPhase::Idle {
            return Ok(Some(view.execute_initial_query_request()));
        }

        Ok(None)
    }
}
