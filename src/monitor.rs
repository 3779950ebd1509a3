//! Monitor subscriptions: time-limited registrations that receive callback
//! frames whenever a facility's schedule changes.
//!
//! Fan-out is synchronous and best-effort under the registry's own lock,
//! never while the schedule lock is held. Expired subscriptions are dropped
//! in the same pass; an optional background sweeper additionally prunes the
//! list so idle facilities do not pin dead entries.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::observability;
use crate::wire::{self, OP_CALLBACK, Reply};

#[derive(Debug, Clone)]
pub struct Subscription {
    pub peer: SocketAddr,
    pub facility: String,
    pub expires_at: Instant,
}

impl Subscription {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct MonitorRegistry {
    socket: Arc<UdpSocket>,
    subs: Mutex<Vec<Subscription>>,
}

impl MonitorRegistry {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket,
            subs: Mutex::new(Vec::new()),
        }
    }

    /// Register `peer` for callbacks on `facility` for the next
    /// `period_secs` seconds. Multiple registrations from the same peer are
    /// independent entries and fire independently.
    pub async fn register(&self, peer: SocketAddr, facility: &str, period_secs: u32) {
        let sub = Subscription {
            peer,
            facility: facility.to_string(),
            expires_at: Instant::now() + Duration::from_secs(u64::from(period_secs)),
        };
        let mut subs = self.subs.lock().await;
        subs.push(sub);
        metrics::gauge!(observability::MONITOR_SUBSCRIPTIONS_ACTIVE).set(subs.len() as f64);
    }

    /// Fan a schedule change out to every live subscriber of `facility`.
    /// Callbacks are best-effort: a failed send is logged and forgotten.
    /// Expired subscriptions — matching or not — are dropped in this pass.
    pub async fn notify(&self, facility: &str, message: &str) {
        let now = Instant::now();
        let frame = Reply {
            opcode: OP_CALLBACK,
            request_id: 0,
            status: 0,
            data: format!("Facility={facility} updated: {message}"),
        };
        let bytes = match wire::encode_reply(&frame) {
            Ok(b) => b,
            Err(e) => {
                warn!("callback frame for '{facility}' not encodable: {e}");
                return;
            }
        };

        let mut subs = self.subs.lock().await;
        subs.retain(|s| s.is_live(now));
        for sub in subs.iter().filter(|s| s.facility == facility) {
            match self.socket.send_to(&bytes, sub.peer).await {
                Ok(_) => {
                    metrics::counter!(observability::CALLBACKS_SENT_TOTAL).increment(1);
                    debug!("callback to {} for facility '{facility}'", sub.peer);
                }
                Err(e) => warn!("callback to {} failed: {e}", sub.peer),
            }
        }
        metrics::gauge!(observability::MONITOR_SUBSCRIPTIONS_ACTIVE).set(subs.len() as f64);
    }

    /// Drop expired subscriptions without notifying anyone.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut subs = self.subs.lock().await;
        subs.retain(|s| s.is_live(now));
        metrics::gauge!(observability::MONITOR_SUBSCRIPTIONS_ACTIVE).set(subs.len() as f64);
    }

    pub async fn live_count(&self) -> usize {
        let now = Instant::now();
        self.subs
            .lock()
            .await
            .iter()
            .filter(|s| s.is_live(now))
            .count()
    }
}

/// Background task that periodically prunes expired subscriptions. Cleanup
/// is already piggybacked on notification; this only bounds the list when
/// nothing changes for a long time.
pub async fn run_sweeper(registry: Arc<MonitorRegistry>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        registry.sweep().await;
    }
}
