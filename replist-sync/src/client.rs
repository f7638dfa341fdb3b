//! Synthetic-workload client.
//!
//! Keeps a local replica of the server's ordered list and drives it with
//! two periodic loops: a send loop that submits random edit batches, and a
//! poll loop that pulls the server's diff stream and replays it locally.
//! A diff whose indices do not fit the local replica means the replica has
//! diverged from the server — that is fatal, the client stops.
//!
//! The client also tracks which of its own edits have not yet come back in
//! the diff stream; the round-trip latency of that set is the
//! write-visibility metric reported by the [`ClientMonitor`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rand::Rng;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use replist_core::{ClientId, ListApplyError, ListEntry, ListOp, apply_list_ops};

use crate::monitor::ClientMonitor;
use crate::protocol::{EditKind, EditRequest, ProtocolError, Request, Response};

const DIAL_RETRIES: usize = 120;
const DIAL_BACKOFF: Duration = Duration::from_millis(500);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Workload-client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL, e.g. `ws://127.0.0.1:2412`.
    pub server_url: String,
    /// Unique non-zero client id.
    pub client_id: ClientId,
    /// Edit-batch send period.
    pub send_period: Duration,
    /// Maximum edits per batch.
    pub max_ops: usize,
    /// Diff poll period.
    pub poll_period: Duration,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}: out of range")]
    InvalidConfig(&'static str),
    #[error("connection failed after {attempts} attempts with {backoff:?} backoff")]
    ConnectExhausted { attempts: usize, backoff: Duration },
    #[error("transport: {0}")]
    Transport(String),
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("server rejected request: {0}")]
    Rejected(String),
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
    #[error("replica diverged from server: {0}")]
    Diverged(#[from] ListApplyError),
}

/// A polling client with a local replica and a random edit generator.
#[derive(Debug)]
pub struct WorkloadClient {
    config: ClientConfig,
    monitor: Arc<ClientMonitor>,
    ws: WsStream,
    version: i64,
    replica: Vec<ListEntry>,
    /// Fingerprints of sent edits not yet seen in the diff stream.
    pending: HashSet<String>,
}

impl WorkloadClient {
    /// Validate the configuration and dial the server.
    ///
    /// Connection-refused dials are retried with a fixed backoff — the
    /// server may still be loading its initial snapshot. Any other
    /// transport failure aborts immediately.
    pub async fn connect(
        config: ClientConfig,
        monitor: Arc<ClientMonitor>,
    ) -> Result<Self, ClientError> {
        if config.client_id == 0 {
            return Err(ClientError::InvalidConfig("client id"));
        }
        if config.send_period.is_zero() {
            return Err(ClientError::InvalidConfig("send period"));
        }
        if config.poll_period.is_zero() {
            return Err(ClientError::InvalidConfig("poll period"));
        }
        if config.max_ops == 0 {
            return Err(ClientError::InvalidConfig("max ops"));
        }

        let ws = dial(&config.server_url).await?;
        info!("client {}: connected to {}", config.client_id, config.server_url);

        Ok(Self {
            config,
            monitor,
            ws,
            version: 0,
            replica: Vec::new(),
            pending: HashSet::new(),
        })
    }

    /// Fetch the initial snapshot, then run the send/poll loops until the
    /// shutdown signal flips or a fatal error occurs.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ClientError> {
        self.init_snapshot().await?;

        let mut send_tick = tokio::time::interval(self.config.send_period);
        let mut poll_tick = tokio::time::interval(self.config.poll_period);
        send_tick.tick().await; // skip the immediate first tick of both
        poll_tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("client {}: stop", self.config.client_id);
                    let _ = self.ws.close(None).await;
                    return Ok(());
                }
                _ = send_tick.tick() => self.send_updates().await?,
                _ = poll_tick.tick() => self.poll_updates().await?,
            }
        }
    }

    async fn init_snapshot(&mut self) -> Result<(), ClientError> {
        let start = Instant::now();
        let response = self
            .call(Request::GetList { client_id: self.config.client_id })
            .await?;

        match response {
            Response::List { version, items } => {
                info!(
                    "client {}: initial snapshot v{version}: {} items within {:?}",
                    self.config.client_id,
                    items.len(),
                    start.elapsed()
                );
                self.version = version;
                self.replica = items;
                Ok(())
            }
            Response::Error { message } => Err(ClientError::Rejected(message)),
            _ => Err(ClientError::UnexpectedResponse("GetList")),
        }
    }

    /// Build and submit one random edit batch.
    async fn send_updates(&mut self) -> Result<(), ClientError> {
        let ops = self.random_edits();
        if ops.is_empty() {
            return Ok(());
        }

        let had_pending = !self.pending.is_empty();
        for op in &ops {
            self.pending.insert(edit_fingerprint(op));
        }

        let start = Instant::now();
        let response = self
            .call(Request::UpdateList {
                client_id: self.config.client_id,
                version: self.version,
                ops: ops.clone(),
            })
            .await?;
        let elapsed = start.elapsed();

        match response {
            Response::Ack => {
                debug!("client {}: sent {} edits in {elapsed:?}", self.config.client_id, ops.len());
                self.monitor.updates_sent(ops.len(), elapsed);
                if !had_pending {
                    self.monitor.visibility_pending(start);
                }
                Ok(())
            }
            Response::Error { message } => Err(ClientError::Rejected(message)),
            _ => Err(ClientError::UnexpectedResponse("UpdateList")),
        }
    }

    /// Poll the diff stream and replay it onto the local replica.
    async fn poll_updates(&mut self) -> Result<(), ClientError> {
        let start = Instant::now();
        let response = self
            .call(Request::GetListUpdates { version: self.version })
            .await?;

        let (version, ops) = match response {
            Response::ListUpdates { version, ops } => (version, ops),
            Response::Error { message } => return Err(ClientError::Rejected(message)),
            _ => return Err(ClientError::UnexpectedResponse("GetListUpdates")),
        };

        if version == self.version {
            return Ok(());
        }

        // A failure here is divergence, not bad luck; it propagates up and
        // stops the client.
        self.replica = apply_list_ops(std::mem::take(&mut self.replica), &ops)?;
        self.version = version;

        for op in &ops {
            self.pending.remove(&list_op_fingerprint(op));
        }

        let elapsed = start.elapsed();
        debug!(
            "client {}: snapshot upgraded to v{version}: {} ops ({} pending)",
            self.config.client_id,
            ops.len(),
            self.pending.len()
        );
        self.monitor.updates_received(ops.len(), elapsed);
        if self.pending.is_empty() {
            self.monitor.visibility_achieved(Instant::now());
        }

        Ok(())
    }

    /// 1..=max_ops random edits against the current replica.
    fn random_edits(&self) -> Vec<EditRequest> {
        let mut rng = rand::thread_rng();
        let count = rng.gen_range(1..=self.config.max_ops);
        let mut ops: Vec<EditRequest> = Vec::with_capacity(count);

        for _ in 0..count {
            let roll = if self.replica.is_empty() { 0 } else { rng.gen_range(0..3) };
            let op = match roll {
                0 => EditRequest {
                    kind: EditKind::Insert,
                    id: uuid::Uuid::new_v4().to_string(),
                    value: rng.gen(),
                },
                1 => EditRequest {
                    kind: EditKind::Update,
                    id: self.random_known_id(&mut rng),
                    value: rng.gen(),
                },
                _ => {
                    // Avoid duplicate deletes within one batch; the second
                    // one would be a guaranteed no-op.
                    let id = (0..self.replica.len())
                        .map(|_| self.random_known_id(&mut rng))
                        .find(|candidate| {
                            !ops.iter().any(|op| {
                                op.kind == EditKind::Delete && op.id == *candidate
                            })
                        });
                    match id {
                        Some(id) => EditRequest { kind: EditKind::Delete, id, value: 0 },
                        None => continue,
                    }
                }
            };
            ops.push(op);
        }

        ops
    }

    fn random_known_id(&self, rng: &mut impl Rng) -> String {
        self.replica[rng.gen_range(0..self.replica.len())].id.to_string()
    }

    /// One request frame out, one response frame in.
    async fn call(&mut self, request: Request) -> Result<Response, ClientError> {
        let encoded = request.encode()?;
        self.ws
            .send(Message::Binary(encoded.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        loop {
            let msg = self
                .ws
                .next()
                .await
                .ok_or(ClientError::Protocol(ProtocolError::ConnectionClosed))?
                .map_err(|e| ClientError::Transport(e.to_string()))?;

            match msg {
                Message::Binary(data) => {
                    let bytes: Vec<u8> = data.into();
                    return Ok(Response::decode(&bytes)?);
                }
                Message::Close(_) => {
                    return Err(ClientError::Protocol(ProtocolError::ConnectionClosed));
                }
                // Control frames between request and response are fine.
                _ => continue,
            }
        }
    }
}

async fn dial(url: &str) -> Result<WsStream, ClientError> {
    for attempt in 1..=DIAL_RETRIES {
        match tokio_tungstenite::connect_async(url).await {
            Ok((ws, _)) => return Ok(ws),
            Err(tokio_tungstenite::tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::ConnectionRefused =>
            {
                debug!("dial {url}: refused (attempt {attempt}/{DIAL_RETRIES})");
                tokio::time::sleep(DIAL_BACKOFF).await;
            }
            Err(e) => {
                warn!("dial {url}: {e}");
                return Err(ClientError::Transport(e.to_string()));
            }
        }
    }

    Err(ClientError::ConnectExhausted { attempts: DIAL_RETRIES, backoff: DIAL_BACKOFF })
}

/// Fingerprint of a submitted edit, for matching against the diff stream.
fn edit_fingerprint(op: &EditRequest) -> String {
    match op.kind {
        EditKind::Insert | EditKind::Update => format!("{}: {} -> {}", op.kind, op.id, op.value),
        EditKind::Delete => format!("{}: {}", op.kind, op.id),
    }
}

/// Fingerprint of a server edit, matching [`edit_fingerprint`] for edits
/// that originated here.
fn list_op_fingerprint(op: &ListOp) -> String {
    match op {
        ListOp::Insert { id, value, .. } | ListOp::Update { id, value, .. } => {
            format!("{}: {} -> {}", op.tag(), id, value)
        }
        ListOp::Delete { id, .. } => format!("{}: {}", op.tag(), id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_fingerprints_match_across_representations() {
        let id = Uuid::new_v4();

        let sent = EditRequest { kind: EditKind::Insert, id: id.to_string(), value: 42 };
        let echoed = ListOp::Insert { id, index: 3, value: 42 };
        assert_eq!(edit_fingerprint(&sent), list_op_fingerprint(&echoed));

        let sent = EditRequest { kind: EditKind::Delete, id: id.to_string(), value: 0 };
        let echoed = ListOp::Delete { id, index: 0 };
        assert_eq!(edit_fingerprint(&sent), list_op_fingerprint(&echoed));
    }

    #[test]
    fn test_insert_and_update_fingerprints_differ() {
        let id = Uuid::new_v4();
        let insert = EditRequest { kind: EditKind::Insert, id: id.to_string(), value: 1 };
        let update = EditRequest { kind: EditKind::Update, id: id.to_string(), value: 1 };
        assert_ne!(edit_fingerprint(&insert), edit_fingerprint(&update));
    }
}
