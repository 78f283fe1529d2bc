//!
//! Query Orchestrator
//!
//! Owns the authoritative request/result pair of one view and issues requests
//! through a [QueryTransport].
//!
//! Every issued request gets the next number of a monotonic counter. When a
//! reply comes back, it is applied only if its number is still the latest one
//! issued; anything else belongs to a superseded request and is dropped. In
//! flight calls are never aborted, they simply become inert.
//!
//! State lives behind a mutex that is never held across an await. Consumers
//! only ever see cloned [QuerySnapshot]s, either through accessors or through
//! the watch channel handed out by [QueryOrchestrator::subscribe].

use std::sync::{Arc, Mutex, MutexGuard};

use facetq_common::{
    query::QueryRequest, result::QueryResult, selection::FacetSelectionEvent,
};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    error::{QueryError, TransportError},
    resolver::resolve,
    selection::SelectionState,
    transport::{QueryReply, QueryTransport},
};

/// Where a view is in its request cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    /// Nothing issued yet
    #[default]
    Idle,
    Loading,
    Settled,
    Failed,
}

/// An immutable copy of the authoritative state
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    /// The latest issued request
    pub request: QueryRequest,
    /// The latest applied result. Kept through failures.
    pub result: Option<Arc<QueryResult>>,
    pub phase: QueryPhase,
    /// Sequence number of `request`
    pub sequence: u64,
    /// Sequence number of the request that produced `result`
    pub result_sequence: u64,
    /// Error of the latest applied failure, cleared by the next success
    pub error: Option<TransportError>,
    pub selection: SelectionState,
}

impl QuerySnapshot {
    pub fn is_loading(&self) -> bool {
        self.phase == QueryPhase::Loading
    }

    pub fn last_facet_selection(&self) -> Option<&FacetSelectionEvent> {
        self.selection.last_event()
    }
}

/// What happened to a reply once it came back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The reply was the latest and moved the view to this phase
    Applied(QueryPhase),
    /// The reply belonged to a superseded request and was dropped
    Stale { sequence: u64, latest: u64 },
}

struct OrchestratorState {
    initial: QueryRequest,
    latest_issued: u64,
    snapshot: QuerySnapshot,
    publish: watch::Sender<QuerySnapshot>,
}

impl OrchestratorState {
    fn publish(&self) {
        self.publish.send_replace(self.snapshot.clone());
    }
}

/// Issues requests for one logical view and keeps the latest result.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct QueryOrchestrator {
    id: uuid::Uuid,
    state: Arc<Mutex<OrchestratorState>>,
    transport: Arc<dyn QueryTransport>,
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl QueryOrchestrator {
    /// Create an idle orchestrator. Nothing is sent until a request is issued.
    pub fn new<T>(initial: QueryRequest, transport: T) -> Self
    where
        T: QueryTransport + 'static,
    {
        Self::from_shared(initial, Arc::new(transport))
    }

    /// Create an idle orchestrator over a transport shared with other views
    pub fn from_shared(
        initial: QueryRequest,
        transport: Arc<dyn QueryTransport>,
    ) -> Self {
        let initial = initial.reset();

        let snapshot = QuerySnapshot {
            request: initial.clone(),
            result: None,
            phase: QueryPhase::Idle,
            sequence: 0,
            result_sequence: 0,
            error: None,
            selection: SelectionState::default(),
        };

        let (publish, _) = watch::channel(snapshot.clone());

        Self {
            id: uuid::Uuid::new_v4(),
            state: Arc::new(Mutex::new(OrchestratorState {
                initial,
                latest_issued: 0,
                snapshot,
                publish,
            })),
            transport,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Watch snapshots; a new one is published after every transition
    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot> {
        self.state.lock().unwrap().publish.subscribe()
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.state.lock().unwrap().snapshot.clone()
    }

    /// A copy of the latest issued request, free to be changed by the caller
    pub fn get_last_query_request(&self) -> QueryRequest {
        self.state.lock().unwrap().snapshot.request.clone()
    }

    pub fn last_result(&self) -> Option<Arc<QueryResult>> {
        self.state.lock().unwrap().snapshot.result.clone()
    }

    pub fn phase(&self) -> QueryPhase {
        self.state.lock().unwrap().snapshot.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == QueryPhase::Loading
    }

    /// Issue a request. Any request still in flight is superseded.
    ///
    /// The handle resolves once the reply has been applied or discarded;
    /// awaiting it is optional.
    pub fn execute_query_request(
        &self,
        request: QueryRequest,
    ) -> JoinHandle<Settlement> {
        let lock = self.state.lock().unwrap();
        self.issue(lock, request)
    }

    /// Go back to the initial request: no filters, first page.
    ///
    /// Selection state is reset with it.
    pub fn execute_initial_query_request(&self) -> JoinHandle<Settlement> {
        let mut lock = self.state.lock().unwrap();

        lock.snapshot.selection = SelectionState::default();
        let initial = lock.initial.clone();

        self.issue(lock, initial)
    }

    /// Resolve a facet toggle against the current request and result, record
    /// it, and issue the resulting request.
    ///
    /// Fails without touching state if the column is not a categorical facet
    /// of the current result.
    pub fn apply_facet_selection(
        &self,
        event: &FacetSelectionEvent,
    ) -> Result<JoinHandle<Settlement>, QueryError> {
        let mut lock = self.state.lock().unwrap();

        let result = lock.snapshot.result.clone();
        let facets = result
            .as_deref()
            .map(QueryResult::facet_list)
            .unwrap_or_default();

        let next = resolve(&lock.snapshot.request, event, facets)?;

        lock.snapshot.selection =
            lock.snapshot.selection.record(event, result.as_deref(), &next);

        Ok(self.issue(lock, next))
    }

    /// Move one page forward, keeping filters.
    ///
    /// The page token of the latest result is carried along only if that
    /// result answers the current request; a token from another filter set
    /// is never sent.
    pub fn next_page(&self) -> JoinHandle<Settlement> {
        let lock = self.state.lock().unwrap();
        let snapshot = &lock.snapshot;

        let mut next = snapshot.request.clone();
        next.offset += next.limit;
        next.next_page_token = snapshot
            .result
            .as_ref()
            .filter(|_| snapshot.result_sequence == snapshot.sequence)
            .and_then(|r| r.next_page_token.clone());

        self.issue(lock, next)
    }

    /// Move one page back, keeping filters. Stays on the first page.
    pub fn previous_page(&self) -> JoinHandle<Settlement> {
        let lock = self.state.lock().unwrap();

        let mut next = lock.snapshot.request.clone();
        next.offset = next.offset.saturating_sub(next.limit);
        next.next_page_token = None;

        self.issue(lock, next)
    }

    fn issue(
        &self,
        mut lock: MutexGuard<'_, OrchestratorState>,
        request: QueryRequest,
    ) -> JoinHandle<Settlement> {
        lock.latest_issued += 1;
        let sequence = lock.latest_issued;

        lock.snapshot.request = request.clone();
        lock.snapshot.sequence = sequence;
        lock.snapshot.phase = QueryPhase::Loading;
        lock.publish();

        drop(lock);

        log::debug!(
            "[{}] issuing #{sequence}: offset {}, {} filter(s)",
            self.id,
            request.offset,
            request.selected_facets.len()
        );

        let pending = self.transport.send_query(request);
        let state = self.state.clone();
        let id = self.id;

        tokio::spawn(async move {
            let reply = pending.await;
            settle(id, &state, sequence, reply)
        })
    }
}

/// Apply a reply if it still belongs to the latest request
fn settle(
    id: uuid::Uuid,
    state: &Mutex<OrchestratorState>,
    sequence: u64,
    reply: QueryReply,
) -> Settlement {
    let mut lock = state.lock().unwrap();

    let latest = lock.latest_issued;

    if sequence != latest {
        log::debug!("[{id}] discarding stale reply #{sequence}, latest is #{latest}");
        return Settlement::Stale { sequence, latest };
    }

    match reply {
        Ok(result) => {
            log::debug!(
                "[{id}] applying #{sequence}: {} row(s)",
                result.rows.len()
            );
            lock.snapshot.result = Some(Arc::new(result));
            lock.snapshot.result_sequence = sequence;
            lock.snapshot.error = None;
            lock.snapshot.phase = QueryPhase::Settled;
        }
        Err(e) => {
            log::warn!("[{id}] query #{sequence} failed: {e}");
            lock.snapshot.error = Some(e);
            lock.snapshot.phase = QueryPhase::Failed;
        }
    }

    lock.publish();

    Settlement::Applied(lock.snapshot.phase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::transport_fn;
    use facetq_common::query::FacetFilter;
    use facetq_common::result::{
        FacetColumnValues, FacetResult, FacetValue, PageToken,
    };
    use tokio::sync::oneshot;

    /// Transport whose replies are released by hand, in any order
    #[derive(Default, Clone)]
    struct Gates(Arc<Mutex<Vec<Option<oneshot::Sender<QueryReply>>>>>);

    impl Gates {
        fn transport(&self) -> impl QueryTransport {
            let gates = self.clone();
            transport_fn(move |_: QueryRequest| {
                let (tx, rx) = oneshot::channel();
                gates.0.lock().unwrap().push(Some(tx));
                async move { rx.await.unwrap_or(Err(TransportError::Closed)) }
            })
        }

        fn release(&self, index: usize, reply: QueryReply) {
            let tx = self.0.lock().unwrap()[index].take().unwrap();
            tx.send(reply).unwrap();
        }

        fn issued(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    fn initial() -> QueryRequest {
        QueryRequest::new("SELECT * FROM syn1").with_limit(25)
    }

    fn result(tag: u64) -> QueryResult {
        QueryResult {
            total_row_count: Some(tag),
            facets: Some(vec![FacetResult::Values(FacetColumnValues {
                column_name: "name".to_string(),
                facet_values: vec![
                    FacetValue::new("a", 1, false),
                    FacetValue::new("b", 1, false),
                ],
            })]),
            next_page_token: Some(PageToken::new(format!("page-{tag}"))),
            ..Default::default()
        }
    }

    fn applied_total(orch: &QueryOrchestrator) -> Option<u64> {
        orch.last_result().and_then(|r| r.total_row_count)
    }

    #[tokio::test]
    async fn starts_idle() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        assert_eq!(orch.phase(), QueryPhase::Idle);
        assert_eq!(orch.get_last_query_request(), initial());
        assert!(orch.last_result().is_none());
        assert_eq!(gates.issued(), 0);
    }

    #[tokio::test]
    async fn last_issued_wins_when_replies_reorder() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let h1 = orch.execute_query_request(initial());
        let h2 = orch.execute_query_request(initial().with_limit(50));

        assert!(orch.is_loading());
        assert_eq!(gates.issued(), 2);

        gates.release(1, Ok(result(2)));
        assert_eq!(h2.await.unwrap(), Settlement::Applied(QueryPhase::Settled));

        gates.release(0, Ok(result(1)));
        assert_eq!(
            h1.await.unwrap(),
            Settlement::Stale {
                sequence: 1,
                latest: 2
            }
        );

        assert_eq!(applied_total(&orch), Some(2));
        assert_eq!(orch.phase(), QueryPhase::Settled);
        assert_eq!(orch.get_last_query_request().limit, 50);
    }

    #[tokio::test]
    async fn stale_reply_leaves_state_untouched() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let h1 = orch.execute_query_request(initial());
        gates.release(0, Ok(result(1)));
        h1.await.unwrap();

        let h2 = orch.execute_query_request(initial());
        gates.release(1, Ok(result(2)));
        h2.await.unwrap();

        // #3 goes out, then #4 supersedes it before #3 returns
        let h3 = orch.execute_query_request(initial());
        let h4 = orch.execute_query_request(initial());

        let before = orch.snapshot();

        gates.release(2, Ok(result(3)));
        assert!(matches!(
            h3.await.unwrap(),
            Settlement::Stale {
                sequence: 3,
                latest: 4
            }
        ));

        let after = orch.snapshot();
        assert_eq!(after.sequence, before.sequence);
        assert_eq!(after.phase, QueryPhase::Loading);
        assert_eq!(applied_total(&orch), Some(2));

        gates.release(3, Ok(result(4)));
        h4.await.unwrap();
        assert_eq!(applied_total(&orch), Some(4));
    }

    #[tokio::test]
    async fn failure_keeps_last_result() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let h = orch.execute_query_request(initial());
        gates.release(0, Ok(result(1)));
        h.await.unwrap();

        let h = orch.execute_query_request(initial());
        gates.release(1, Err(TransportError::Remote("boom".to_string())));
        assert_eq!(h.await.unwrap(), Settlement::Applied(QueryPhase::Failed));

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.phase, QueryPhase::Failed);
        assert_eq!(
            snapshot.error,
            Some(TransportError::Remote("boom".to_string()))
        );
        assert_eq!(applied_total(&orch), Some(1));

        // a later success clears the error
        let h = orch.execute_query_request(initial());
        gates.release(2, Ok(result(3)));
        h.await.unwrap();
        assert!(orch.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn stale_failure_is_discarded() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let h1 = orch.execute_query_request(initial());
        let h2 = orch.execute_query_request(initial());

        gates.release(1, Ok(result(2)));
        h2.await.unwrap();

        gates.release(0, Err(TransportError::Closed));
        assert!(matches!(h1.await.unwrap(), Settlement::Stale { .. }));

        assert_eq!(orch.phase(), QueryPhase::Settled);
        assert!(orch.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn last_request_is_an_independent_copy() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let mut copy = orch.get_last_query_request();
        copy.selected_facets.push(FacetFilter::with_values("name", ["a"]));
        copy.offset = 100;

        assert_eq!(orch.get_last_query_request(), initial());
    }

    #[tokio::test]
    async fn facet_selection_resolves_and_issues() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        // no result yet: nothing is known about the column
        assert_eq!(
            orch.apply_facet_selection(&FacetSelectionEvent::toggle("name", "a"))
                .unwrap_err(),
            QueryError::InvalidFacetColumn("name".to_string())
        );
        assert_eq!(gates.issued(), 0);

        let h = orch.execute_query_request(initial());
        gates.release(0, Ok(result(1)));
        h.await.unwrap();

        let event = FacetSelectionEvent::toggle("name", "a");
        let h = orch.apply_facet_selection(&event).unwrap();

        let issued = orch.get_last_query_request();
        assert_eq!(
            issued.selected_facets,
            vec![FacetFilter::with_values("name", ["a"])]
        );
        assert_eq!(issued.offset, 0);
        assert_eq!(orch.snapshot().last_facet_selection(), Some(&event));
        assert!(orch.snapshot().selection.is_touched("name"));

        gates.release(1, Ok(result(2)));
        h.await.unwrap();

        assert_eq!(
            orch.apply_facet_selection(&FacetSelectionEvent::toggle("age", "3"))
                .unwrap_err(),
            QueryError::InvalidFacetColumn("age".to_string())
        );
        assert_eq!(gates.issued(), 2);
    }

    #[tokio::test]
    async fn initial_request_drops_filters_and_wins() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let h = orch.execute_query_request(initial());
        gates.release(0, Ok(result(1)));
        h.await.unwrap();

        let filtered = orch
            .apply_facet_selection(&FacetSelectionEvent::toggle("name", "b"))
            .unwrap();
        let reset = orch.execute_initial_query_request();

        assert_eq!(orch.get_last_query_request(), initial());
        assert!(orch.snapshot().last_facet_selection().is_none());

        gates.release(2, Ok(result(3)));
        reset.await.unwrap();
        gates.release(1, Ok(result(2)));
        assert!(matches!(filtered.await.unwrap(), Settlement::Stale { .. }));

        assert_eq!(applied_total(&orch), Some(3));
    }

    #[tokio::test]
    async fn paging_keeps_filters() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let h = orch.execute_query_request(initial());
        gates.release(0, Ok(result(1)));
        h.await.unwrap();

        let h = orch
            .apply_facet_selection(&FacetSelectionEvent::toggle("name", "a"))
            .unwrap();
        gates.release(1, Ok(result(2)));
        h.await.unwrap();

        let h = orch.next_page();
        let paged = orch.get_last_query_request();
        assert_eq!(paged.offset, 25);
        assert_eq!(paged.next_page_token, Some(PageToken::new("page-2")));
        assert_eq!(paged.selected_facets.len(), 1);
        gates.release(2, Ok(result(3)));
        h.await.unwrap();

        let h = orch.previous_page();
        let back = orch.get_last_query_request();
        assert_eq!(back.offset, 0);
        assert!(back.next_page_token.is_none());
        assert_eq!(back.selected_facets, paged.selected_facets);
        gates.release(3, Ok(result(4)));
        h.await.unwrap();

        let h = orch.previous_page();
        assert_eq!(orch.get_last_query_request().offset, 0);
        gates.release(4, Ok(result(5)));
        h.await.unwrap();
    }

    #[tokio::test]
    async fn paging_during_facet_change_drops_token() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let h = orch.execute_query_request(initial());
        gates.release(0, Ok(result(1)));
        h.await.unwrap();

        // the filter change is still in flight when paging
        let filtered = orch
            .apply_facet_selection(&FacetSelectionEvent::toggle("name", "a"))
            .unwrap();
        let paged = orch.next_page();

        let request = orch.get_last_query_request();
        assert_eq!(
            request.selected_facets,
            vec![FacetFilter::with_values("name", ["a"])]
        );
        assert_eq!(request.offset, 25);
        assert!(request.next_page_token.is_none());

        gates.release(1, Ok(result(2)));
        gates.release(2, Ok(result(3)));
        assert!(matches!(filtered.await.unwrap(), Settlement::Stale { .. }));
        paged.await.unwrap();

        // a failed page leaves an older result behind; no token from it
        let failed = orch.next_page();
        gates.release(3, Err(TransportError::Closed));
        failed.await.unwrap();

        let h = orch.next_page();
        assert!(orch.get_last_query_request().next_page_token.is_none());
        gates.release(4, Ok(result(5)));
        h.await.unwrap();
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let gates = Gates::default();
        let orch = QueryOrchestrator::new(initial(), gates.transport());

        let mut rx = orch.subscribe();
        assert_eq!(rx.borrow_and_update().phase, QueryPhase::Idle);

        let h = orch.execute_query_request(initial());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().phase, QueryPhase::Loading);

        gates.release(0, Ok(result(7)));
        h.await.unwrap();

        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.phase, QueryPhase::Settled);
        assert_eq!(seen.result.unwrap().total_row_count, Some(7));
    }
}
