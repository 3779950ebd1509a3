//! UDP transport endpoint and the operation dispatcher.
//!
//! One receive task consumes datagrams sequentially from the socket; each
//! datagram is dispatched on its own task, so handlers run in parallel and
//! rely on the engine, registry and cache locks for safety.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{debug, warn};

use crate::dedup::{ReplyCache, RequestKey, Semantics};
use crate::engine::{Engine, EngineError, MutationOk, Notification};
use crate::monitor::MonitorRegistry;
use crate::observability;
use crate::wire::{self, MAX_STRING_LEN, Reply, Request, WireError};

/// Receive buffer size; a frame never spans datagrams and fits within this.
pub const RECV_BUF_LEN: usize = 2048;

pub struct ServerState {
    pub engine: Engine,
    pub monitors: Arc<MonitorRegistry>,
    semantics: Semantics,
    cache: ReplyCache,
    socket: Arc<UdpSocket>,
}

impl ServerState {
    /// Bind the datagram socket and assemble the server around the seeded
    /// store.
    pub async fn bind(addr: impl ToSocketAddrs, semantics: Semantics) -> io::Result<Arc<Self>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        Ok(Arc::new(Self {
            engine: Engine::seeded(),
            monitors: Arc::new(MonitorRegistry::new(socket.clone())),
            semantics,
            cache: ReplyCache::new(),
            socket,
        }))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    /// Receive loop. Runs until the socket errors; callers race it against a
    /// shutdown signal.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        loop {
            let (n, peer) = self.socket.recv_from(&mut buf).await?;
            let datagram = buf[..n].to_vec();
            let state = self.clone();
            tokio::spawn(async move {
                state.handle_datagram(&datagram, peer).await;
            });
        }
    }

    /// Dispatch one inbound datagram. Malformed frames are logged and
    /// dropped; everything that decodes gets exactly one reply frame.
    pub async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        let (request_id, request) = match wire::decode_request(datagram) {
            Ok(decoded) => decoded,
            Err(WireError::UnknownOpcode { opcode, request_id }) => {
                // The header parsed, so the sender can still be answered.
                let reply = Reply {
                    opcode,
                    request_id,
                    status: -1,
                    data: format!("Unknown OpCode {opcode}"),
                };
                self.send_reply(reply, peer).await;
                return;
            }
            Err(e) => {
                metrics::counter!(observability::MALFORMED_FRAMES_TOTAL).increment(1);
                warn!("dropping malformed datagram from {peer}: {e}");
                return;
            }
        };

        metrics::counter!(
            observability::REQUESTS_TOTAL,
            "op" => observability::op_label(&request)
        )
        .increment(1);

        match self.semantics {
            Semantics::AtLeastOnce => {
                let reply = self.execute(request_id, &request, peer).await;
                self.send_reply(reply, peer).await;
            }
            Semantics::AtMostOnce => {
                let key = RequestKey {
                    peer: peer.to_string(),
                    request_id,
                };
                // The slot stays locked across check, execute and insert:
                // at most one execution per key, concurrent duplicates wait
                // and then read the cached reply.
                let slot = self.cache.slot(key);
                let mut cached = slot.lock().await;
                let reply = match cached.as_ref() {
                    Some(reply) => {
                        metrics::counter!(observability::DUPLICATE_HITS_TOTAL).increment(1);
                        debug!("duplicate request {request_id} from {peer}: cached reply resent");
                        reply.clone()
                    }
                    None => {
                        let reply = self.execute(request_id, &request, peer).await;
                        *cached = Some(reply.clone());
                        reply
                    }
                };
                self.send_reply(reply, peer).await;
            }
        }
    }

    /// Run the handler for a decoded request and assemble the reply.
    /// Monitors of the affected facility hear about the change before the
    /// reply goes out.
    async fn execute(&self, request_id: u64, request: &Request, peer: SocketAddr) -> Reply {
        let started = Instant::now();

        let (status, data, notification) = match request {
            Request::Query { facility, days } => (0, self.engine.query(facility, days).await, None),
            Request::Book {
                facility,
                start,
                end,
            } => split(
                self.engine
                    .book(facility, start.to_minutes(), end.to_minutes())
                    .await,
            ),
            Request::Change {
                confirmation_id,
                offset_min,
            } => split(self.engine.change(confirmation_id, *offset_min).await),
            Request::Cancel { confirmation_id } => {
                let ok = self.engine.cancel(confirmation_id).await;
                (0, ok.message, ok.notification)
            }
            Request::AddParticipant {
                confirmation_id,
                participant,
            } => split(
                self.engine
                    .add_participant(confirmation_id, participant)
                    .await,
            ),
            Request::Monitor {
                facility,
                period_secs,
            } => {
                if self.engine.facility_exists(facility).await {
                    self.monitors.register(peer, facility, *period_secs).await;
                    (
                        0,
                        format!("Monitoring {facility} for {period_secs} seconds."),
                        None,
                    )
                } else {
                    let e = EngineError::UnknownFacility(facility.clone());
                    (e.status(), e.to_string(), None)
                }
            }
        };

        if let Some(n) = notification {
            self.monitors.notify(&n.facility, &n.message).await;
        }

        metrics::histogram!(
            observability::REQUEST_DURATION_SECONDS,
            "op" => observability::op_label(request)
        )
        .record(started.elapsed().as_secs_f64());

        Reply {
            opcode: request.opcode(),
            request_id,
            status,
            data,
        }
    }

    async fn send_reply(&self, mut reply: Reply, peer: SocketAddr) {
        // Reply data is clamped to the wire's u16 string limit.
        truncate_utf8(&mut reply.data, MAX_STRING_LEN);
        let bytes = match wire::encode_reply(&reply) {
            Ok(b) => b,
            Err(e) => {
                warn!("reply for {peer} not encodable: {e}");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&bytes, peer).await {
            warn!("reply to {peer} failed: {e}");
        }
    }
}

fn split(result: Result<MutationOk, EngineError>) -> (i32, String, Option<Notification>) {
    match result {
        Ok(ok) => (0, ok.message, ok.notification),
        Err(e) => (e.status(), e.to_string(), None),
    }
}

fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
