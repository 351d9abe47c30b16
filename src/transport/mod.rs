// Subscription Transport
// "Each listener gets its own wire; a slow reader only slows itself"

use crate::error::{BeaconError, BeaconResult};
use crate::stream_id::{StreamId, StreamRequest};
use crate::streams::StreamRegistry;
use crate::types::DataPoint;
use dashmap::DashMap;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Owns one TCP listener per subscribed stream and one drain task per
/// accepted subscriber.
///
/// Endpoints are created lazily on the first subscription request for a
/// stream identifier and persist for the life of the process, so repeat
/// requests and re-connecting subscribers reuse them. Clones share state.
#[derive(Clone)]
pub struct SubscriptionTransport {
    host: String,
    port_base: u16,
    port_limit: u16,
    registry: StreamRegistry,
    endpoints: Arc<DashMap<StreamId, SocketAddr>>,
    bind_lock: Arc<Mutex<()>>,
}

impl SubscriptionTransport {
    /// `port_base..=port_limit` is the allocation range; a `port_base` of
    /// zero delegates port choice to the operating system (useful in tests).
    pub fn new(registry: StreamRegistry, host: &str, port_base: u16, port_limit: u16) -> Self {
        Self {
            host: host.to_string(),
            port_base,
            port_limit,
            registry,
            endpoints: Arc::new(DashMap::new()),
            bind_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The listening endpoint for a stream, binding it on first request.
    ///
    /// The same identifier always resolves to the same endpoint.
    pub async fn ensure_endpoint(&self, request: &StreamRequest) -> BeaconResult<SocketAddr> {
        let stream_id = request.stream_id();
        if let Some(addr) = self.endpoints.get(&stream_id) {
            return Ok(*addr);
        }

        // One binder at a time; re-check after the lock in case another
        // caller bound this stream while we waited.
        let _guard = self.bind_lock.lock().await;
        if let Some(addr) = self.endpoints.get(&stream_id) {
            return Ok(*addr);
        }

        let listener = self.bind_next_free().await?;
        let addr = listener.local_addr()?;
        self.endpoints.insert(stream_id.clone(), addr);
        info!(stream = %stream_id, endpoint = %addr, "subscription endpoint ready");

        tokio::spawn(accept_loop(listener, request.clone(), self.registry.clone()));
        Ok(addr)
    }

    /// The endpoint already bound for `stream_id`, if any
    pub fn endpoint(&self, stream_id: &StreamId) -> Option<SocketAddr> {
        self.endpoints.get(stream_id).map(|addr| *addr)
    }

    async fn bind_next_free(&self) -> BeaconResult<TcpListener> {
        if self.port_base == 0 {
            return TcpListener::bind((self.host.as_str(), 0))
                .await
                .map_err(|e| BeaconError::transport(format!("bind failed: {e}")));
        }

        let used: HashSet<u16> = self
            .endpoints
            .iter()
            .map(|entry| entry.value().port())
            .collect();

        for port in self.port_base..=self.port_limit {
            if used.contains(&port) {
                continue;
            }
            // A port may be taken by something outside this process; skip
            // those too.
            if let Ok(listener) = TcpListener::bind((self.host.as_str(), port)).await {
                return Ok(listener);
            }
        }

        Err(BeaconError::transport(format!(
            "no free port in subscription range {}..={}",
            self.port_base, self.port_limit
        )))
    }
}

/// Accept subscribers for one stream until process exit
async fn accept_loop(listener: TcpListener, request: StreamRequest, registry: StreamRegistry) {
    let stream_id = request.stream_id();
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let subscriber_id = Uuid::new_v4();
                info!(
                    stream = %stream_id,
                    %peer,
                    %subscriber_id,
                    "subscriber connected"
                );
                match registry.subscribe(&request).await {
                    Ok(receiver) => {
                        tokio::spawn(serve_subscriber(
                            socket,
                            receiver,
                            stream_id.clone(),
                            subscriber_id,
                        ));
                    }
                    Err(e) => {
                        // The connection is dropped; the error belongs to
                        // this subscriber alone.
                        warn!(
                            stream = %stream_id,
                            %subscriber_id,
                            error = %e,
                            "subscription rejected"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(stream = %stream_id, error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Drain one subscriber's channel to its socket.
///
/// Suspends on an empty channel, never busy-polls. Records are written
/// back-to-back as compact JSON; the serialization's own structure is the
/// only framing. A write failure ends this task and drops the receiver,
/// which removes the channel from fan-out on the next publish.
async fn serve_subscriber(
    mut socket: TcpStream,
    mut receiver: mpsc::UnboundedReceiver<DataPoint>,
    stream_id: StreamId,
    subscriber_id: Uuid,
) {
    while let Some(point) = receiver.recv().await {
        let payload = match serde_json::to_vec(&point) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(stream = %stream_id, error = %e, "skipping unserializable data point");
                continue;
            }
        };
        if let Err(e) = socket.write_all(&payload).await {
            debug!(
                stream = %stream_id,
                %subscriber_id,
                error = %e,
                "subscriber disconnected"
            );
            return;
        }
    }
}
