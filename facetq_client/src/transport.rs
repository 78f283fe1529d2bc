//! The boundary to the query backend.
//!
//! The orchestrator only knows [QueryTransport]. A transport that talks to a
//! live backend is supplied by the embedding application; this module provides
//! closure adapters plus a recorder and a replayer for session files.

use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use facetq_common::{
    query::QueryRequest,
    recording::{
        self, decode, end_pack, pack_record, start_pack, Packet, PacketStamp,
        RecordingError,
    },
    result::QueryResult,
};
use futures_util::future::{BoxFuture, FutureExt};

use crate::error::TransportError;

pub type QueryReply = Result<QueryResult, TransportError>;

/// Something that can send a query and eventually produce its result.
///
/// Futures must be `'static`; the orchestrator spawns them and never awaits
/// them while holding state.
pub trait QueryTransport: Send + Sync {
    fn send_query(&self, request: QueryRequest) -> BoxFuture<'static, QueryReply>;
}

impl<T: QueryTransport + ?Sized> QueryTransport for Arc<T> {
    fn send_query(&self, request: QueryRequest) -> BoxFuture<'static, QueryReply> {
        (**self).send_query(request)
    }
}

// =============================================================================

/// Adapts an async function to a [QueryTransport]
pub struct FnTransport<F> {
    func: F,
}

/// Use an async function as a transport
pub fn transport_fn<F, Fut>(func: F) -> FnTransport<F>
where
    F: Fn(QueryRequest) -> Fut + Send + Sync,
    Fut: Future<Output = QueryReply> + Send + 'static,
{
    FnTransport { func }
}

impl<F, Fut> QueryTransport for FnTransport<F>
where
    F: Fn(QueryRequest) -> Fut + Send + Sync,
    Fut: Future<Output = QueryReply> + Send + 'static,
{
    fn send_query(&self, request: QueryRequest) -> BoxFuture<'static, QueryReply> {
        (self.func)(request).boxed()
    }
}

// =============================================================================

/// Answers requests from a recorded session.
///
/// A request is matched by equality against recorded requests; if it was
/// recorded more than once, the latest recording wins.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    exchanges: Vec<(QueryRequest, Result<QueryResult, String>)>,
    delay: Option<Duration>,
}

impl ReplayTransport {
    pub fn from_packets(packets: Vec<Packet>) -> Result<Self, RecordingError> {
        let mut exchanges: Vec<(QueryRequest, Result<QueryResult, String>)> =
            Vec::new();

        for packet in packets {
            match packet {
                Packet::Marker(stamp, name) => {
                    log::debug!("Replay marker '{name}' @ {}ms", stamp.0);
                }
                Packet::Exchange(_, request, result) => {
                    exchanges.push((decode(&request)?, Ok(decode(&result)?)));
                }
                Packet::Failure(_, request, message) => {
                    exchanges.push((decode(&request)?, Err(message)));
                }
            }
        }

        log::debug!("Loaded {} recorded exchanges", exchanges.len());

        Ok(Self {
            exchanges,
            delay: None,
        })
    }

    pub fn from_reader(
        source: impl std::io::Read,
    ) -> Result<Self, RecordingError> {
        Self::from_packets(recording::read_pack(source)?)
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, RecordingError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Add one exchange by hand
    pub fn insert(&mut self, request: QueryRequest, result: QueryResult) {
        self.exchanges.push((request, Ok(result)));
    }

    /// Delay every reply, to mimic a slow backend
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    fn lookup(&self, request: &QueryRequest) -> QueryReply {
        let (_, reply) = self
            .exchanges
            .iter()
            .rev()
            .find(|(r, _)| r == request)
            .ok_or(TransportError::NotRecorded)?;

        reply.clone().map_err(TransportError::Remote)
    }
}

impl QueryTransport for ReplayTransport {
    fn send_query(&self, request: QueryRequest) -> BoxFuture<'static, QueryReply> {
        let reply = self.lookup(&request);
        let delay = self.delay;

        async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            reply
        }
        .boxed()
    }
}

// =============================================================================

/// Wraps a transport and records every exchange that passes through it.
///
/// Call [RecordingTransport::finish] to close the recording.
pub struct RecordingTransport<T, W> {
    inner: T,
    sink: Arc<Mutex<W>>,
    started: Instant,
}

impl<T, W> RecordingTransport<T, W>
where
    T: QueryTransport,
    W: Write + Send + 'static,
{
    pub fn new(inner: T, mut sink: W) -> Result<Self, RecordingError> {
        start_pack(&mut sink)?;

        Ok(Self {
            inner,
            sink: Arc::new(Mutex::new(sink)),
            started: Instant::now(),
        })
    }

    /// Drop a named marker into the recording
    pub fn mark(&self, name: impl Into<String>) -> Result<(), RecordingError> {
        let packet = Packet::Marker(stamp_since(self.started), name.into());
        pack_record(packet, &mut *self.sink.lock().unwrap())
    }

    /// Close the recording and hand back the sink.
    ///
    /// Fails if a query is still in flight.
    pub fn finish(self) -> Result<W, RecordingError> {
        let sink = Arc::try_unwrap(self.sink).map_err(|_| {
            RecordingError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "recording still has queries in flight",
            ))
        })?;

        let mut sink = sink.into_inner().map_err(|_| {
            RecordingError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "recording sink was poisoned by a panicking writer",
            ))
        })?;
        end_pack(&mut sink)?;
        Ok(sink)
    }
}

fn stamp_since(started: Instant) -> PacketStamp {
    PacketStamp(started.elapsed().as_millis().try_into().unwrap_or(u32::MAX))
}

fn record_reply(
    sink: &Mutex<impl Write>,
    stamp: PacketStamp,
    request: &QueryRequest,
    reply: &QueryReply,
) -> Result<(), RecordingError> {
    let packet = match reply {
        Ok(result) => Packet::exchange(stamp, request, result)?,
        Err(e) => Packet::failure(stamp, request, e.to_string())?,
    };

    pack_record(packet, &mut *sink.lock().unwrap())
}

impl<T, W> QueryTransport for RecordingTransport<T, W>
where
    T: QueryTransport,
    W: Write + Send + 'static,
{
    fn send_query(&self, request: QueryRequest) -> BoxFuture<'static, QueryReply> {
        let pending = self.inner.send_query(request.clone());
        let sink = self.sink.clone();
        let started = self.started;

        async move {
            let reply = pending.await;

            if let Err(e) =
                record_reply(&*sink, stamp_since(started), &request, &reply)
            {
                log::warn!("Unable to record exchange: {e}");
            }

            reply
        }
        .boxed()
    }
}
