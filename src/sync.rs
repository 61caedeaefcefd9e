//! Pending-order sync.
//!
//! Best-effort delivery of orders to the remote endpoint. An order that
//! cannot be sent is appended to a persisted queue instead of being
//! dropped; the host app calls [`PendingQueue::flush`] on screen-focus
//! events, and [`watch_connectivity`] flushes on offline-to-online
//! transitions for a bounded listening window before unsubscribing.
//! Connectivity arrives over an injected watch channel and the window is a
//! plain duration, so retry cadence is testable without real timers or
//! real network state.
//!
//! All queue access goes through one async mutex: a flush holds it from
//! read to rewrite, so an order pushed mid-flight waits and is never
//! overwritten, and two flushes never send the same order twice.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::api;
use crate::error::Result;
use crate::models::OrderPayload;
use crate::storage::{LocalStorage, KEY_PENDING_ORDERS};

/// How long [`watch_connectivity`] stays subscribed before giving up.
pub const DEFAULT_LISTEN_WINDOW: Duration = Duration::from_secs(60);

/// Delivery channel for order payloads. Implemented over HTTP in
/// production and by in-memory fakes in tests.
#[allow(async_fn_in_trait)]
pub trait OrderTransport {
    async fn send(&self, order: &OrderPayload) -> Result<()>;

    /// Cheap reachability pre-check, consulted before attempting delivery.
    /// Transports without a meaningful probe report reachable.
    async fn is_reachable(&self) -> bool {
        true
    }
}

/// reqwest-backed transport posting to the configured order endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        HttpTransport {
            client,
            endpoint: api::normalize_endpoint_url(endpoint),
        }
    }
}

impl OrderTransport for HttpTransport {
    async fn send(&self, order: &OrderPayload) -> Result<()> {
        api::submit_order(&self.client, &self.endpoint, order).await
    }

    async fn is_reachable(&self) -> bool {
        api::check_connectivity(&self.client, &self.endpoint).await
    }
}

// ---------------------------------------------------------------------------
// Pending queue
// ---------------------------------------------------------------------------

/// The persisted pending-order queue. Clones share one lock, so every
/// reader and writer of the stored document is serialized.
#[derive(Clone)]
pub struct PendingQueue {
    storage: LocalStorage,
    lock: Arc<Mutex<()>>,
}

impl PendingQueue {
    pub fn new(storage: LocalStorage) -> Self {
        PendingQueue {
            storage,
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn read(&self) -> Vec<OrderPayload> {
        self.storage.get_json(KEY_PENDING_ORDERS).unwrap_or_default()
    }

    fn write(&self, queue: &[OrderPayload]) -> Result<()> {
        self.storage.set_json(KEY_PENDING_ORDERS, &queue)
    }

    /// The currently queued orders, oldest first. Absent or malformed
    /// stored state reads as an empty queue.
    pub async fn pending(&self) -> Vec<OrderPayload> {
        let _guard = self.lock.lock().await;
        self.read()
    }

    /// Append an order to the persisted queue.
    pub async fn push(&self, order: OrderPayload) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut queue = self.read();
        info!(order_id = %order.id, queued = queue.len() + 1, "order queued for later submission");
        queue.push(order);
        self.write(&queue)
    }

    /// Try to deliver every queued order. Successful sends leave the
    /// queue; failures stay for the next attempt. Returns the number
    /// delivered.
    ///
    /// The queue lock is held from read to rewrite, so pushes racing a
    /// flush wait their turn instead of being lost, and overlapping
    /// flushes never double-send.
    pub async fn flush<T: OrderTransport>(&self, transport: &T) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let queue = self.read();
        if queue.is_empty() {
            return Ok(0);
        }

        if !transport.is_reachable().await {
            debug!("endpoint unreachable; skipping pending-order flush");
            return Ok(0);
        }

        let mut remaining = Vec::new();
        let mut sent = 0usize;
        for order in queue {
            match transport.send(&order).await {
                Ok(()) => {
                    sent += 1;
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "pending order still undeliverable");
                    remaining.push(order);
                }
            }
        }

        self.write(&remaining)?;
        if sent > 0 {
            info!(sent, remaining = remaining.len(), "pending-order flush complete");
        }
        Ok(sent)
    }

    /// Send an order now, falling back to the queue when the endpoint is
    /// unreachable or the send fails. Returns `true` when the order
    /// reached the remote endpoint.
    pub async fn send_or_queue<T: OrderTransport>(
        &self,
        transport: &T,
        order: OrderPayload,
    ) -> Result<bool> {
        if !transport.is_reachable().await {
            warn!(order_id = %order.id, "endpoint unreachable; queueing order locally");
            self.push(order).await?;
            return Ok(false);
        }

        match transport.send(&order).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "order submission failed; queueing locally");
                self.push(order).await?;
                Ok(false)
            }
        }
    }
}

/// Listen for connectivity restoration and flush the queue on each
/// offline-to-online transition, for at most `window` before returning.
///
/// Connectivity transitions arrive over the injected watch channel; the
/// host wires its platform reachability events into the sender side.
pub async fn watch_connectivity<T: OrderTransport>(
    queue: PendingQueue,
    transport: T,
    mut connectivity: watch::Receiver<bool>,
    window: Duration,
) {
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                debug!("connectivity listen window elapsed; unsubscribing");
                break;
            }
            changed = connectivity.changed() => {
                match changed {
                    Ok(()) => {
                        let online = *connectivity.borrow_and_update();
                        if !online {
                            continue;
                        }
                        info!("connectivity restored; flushing pending orders");
                        if let Err(e) = queue.flush(&transport).await {
                            warn!(error = %e, "pending-order flush failed");
                        }
                    }
                    // Sender gone: no more transitions will ever arrive.
                    Err(_) => break,
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
