//! Nonce coordination across test processes.
//!
//! When tests run in several worker processes, an in-process sequencer per
//! worker is not enough: every worker would read the same sudo nonce from
//! chain. One process runs a [`SequenceServer`] and the workers draw nonces
//! from it through a [`SequenceClient`].
//!
//! The wire format is one JSON object per line:
//!
//! ```text
//! → {"op":"next_nonce","account":"5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"}
//! ← {"ok":true,"value":42}
//! → {"op":"next_counter","name":"candidate"}
//! ← {"ok":true,"value":3}
//! ```
//!
//! Named counters hand out other suite-wide sequence numbers, such as the
//! candidate count hint staking calls need.

use std::{net::SocketAddr, str::FromStr, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use subxt::utils::AccountId32;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    nonce::{AtomicNonceState, NonceReservation, NonceSequencer, NonceSource},
};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SequenceRequest {
    NextNonce { account: String },
    NextCounter { name: String },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SequenceResponse {
    fn value(value: u64) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    fn error(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// SequenceServer
// ============================================================================

struct ServerState {
    sequencer: NonceSequencer,
    source: Arc<dyn NonceSource>,
    counters: DashMap<String, u64>,
}

impl ServerState {
    async fn handle(&self, request: SequenceRequest) -> SequenceResponse {
        match request {
            SequenceRequest::Ping => SequenceResponse::value(0),
            SequenceRequest::NextNonce { account } => {
                let account = match AccountId32::from_str(&account) {
                    Ok(account) => account,
                    Err(e) => return SequenceResponse::error(format!("bad account {account}: {e}")),
                };
                match self.sequencer.next_nonce(self.source.as_ref(), &account).await {
                    Ok(nonce) => {
                        debug!(%account, nonce, "served nonce");
                        SequenceResponse::value(nonce)
                    }
                    Err(e) => SequenceResponse::error(e.to_string()),
                }
            }
            SequenceRequest::NextCounter { name } => match self.counters.get_mut(&name) {
                Some(mut counter) => {
                    let value = *counter;
                    *counter += 1;
                    debug!(counter = %name, value, "served counter");
                    SequenceResponse::value(value)
                }
                None => SequenceResponse::error(format!("unknown counter {name}")),
            },
        }
    }
}

/// Serves nonces and named counters to other processes.
pub struct SequenceServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl SequenceServer {
    /// Bind to `addr`. Use port 0 to let the OS pick one.
    pub async fn bind(addr: &str, source: Arc<dyn NonceSource>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(ServerState {
                sequencer: NonceSequencer::new(),
                source,
                counters: DashMap::new(),
            }),
        })
    }

    /// Register a counter whose first value is `start`.
    pub fn with_counter(self, name: impl Into<String>, start: u64) -> Self {
        self.state.counters.insert(name.into(), start);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> Result<SequenceServerHandle> {
        let addr = self.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let Self { listener, state } = self;

        info!(%addr, "sequence service listening");
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, state).await {
                                    warn!(%peer, error = %e, "sequence connection failed");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "sequence service accept failed"),
                    },
                }
            }
            debug!(%addr, "sequence service stopped");
        });

        Ok(SequenceServerHandle {
            addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<ServerState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<SequenceRequest>(&line) {
            Ok(request) => state.handle(request).await,
            Err(e) => SequenceResponse::error(format!("bad request: {e}")),
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
    }
    Ok(())
}

pub struct SequenceServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SequenceServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn client(&self) -> SequenceClient {
        SequenceClient::new(self.addr.to_string())
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SequenceServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// SequenceClient
// ============================================================================

/// Client side of the sequence service. Each request uses a fresh connection.
#[derive(Debug, Clone)]
pub struct SequenceClient {
    addr: String,
}

impl SequenceClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn next_nonce(&self, account: &AccountId32) -> Result<u64> {
        self.request(&SequenceRequest::NextNonce {
            account: account.to_string(),
        })
        .await
    }

    pub async fn next_counter(&self, name: &str) -> Result<u64> {
        self.request(&SequenceRequest::NextCounter {
            name: name.to_string(),
        })
        .await
    }

    pub async fn ping(&self) -> Result<()> {
        self.request(&SequenceRequest::Ping).await.map(|_| ())
    }

    async fn request(&self, request: &SequenceRequest) -> Result<u64> {
        let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
            Error::SequenceService(format!("cannot reach {}: {e}", self.addr))
        })?;
        let (reader, mut writer) = stream.into_split();

        let mut out = serde_json::to_vec(request)?;
        out.push(b'\n');
        writer.write_all(&out).await?;

        let line = BufReader::new(reader)
            .lines()
            .next_line()
            .await?
            .ok_or_else(|| Error::SequenceService("connection closed without reply".into()))?;
        let response: SequenceResponse = serde_json::from_str(&line)?;

        match response {
            SequenceResponse {
                ok: true,
                value: Some(value),
                ..
            } => Ok(value),
            SequenceResponse { error, .. } => Err(Error::SequenceService(
                error.unwrap_or_else(|| "malformed reply".into()),
            )),
        }
    }
}

// ============================================================================
// NonceAllocator
// ============================================================================

/// Where a client draws nonces from.
#[derive(Debug, Clone)]
pub enum NonceAllocator {
    /// Sequencer shared by everything in this process
    Local(NonceSequencer),
    /// Sequence service shared by several processes
    Remote(SequenceClient),
}

impl NonceAllocator {
    pub async fn next_nonce<S>(&self, source: &S, account: &AccountId32) -> Result<u64>
    where
        S: NonceSource + ?Sized,
    {
        match self {
            NonceAllocator::Local(sequencer) => sequencer.next_nonce(source, account).await,
            NonceAllocator::Remote(client) => client.next_nonce(account).await,
        }
    }

    /// Issue a nonce together with a slot handle.
    ///
    /// Remote nonces get a detached slot; the service only tracks allocation.
    pub async fn reserve<S>(&self, source: &S, account: &AccountId32) -> Result<NonceReservation>
    where
        S: NonceSource + ?Sized,
    {
        match self {
            NonceAllocator::Local(sequencer) => sequencer.reserve(source, account).await,
            NonceAllocator::Remote(client) => Ok(NonceReservation {
                nonce: client.next_nonce(account).await?,
                state: Arc::new(AtomicNonceState::new_reserved()),
            }),
        }
    }

    pub fn sequencer(&self) -> Option<&NonceSequencer> {
        match self {
            NonceAllocator::Local(sequencer) => Some(sequencer),
            NonceAllocator::Remote(_) => None,
        }
    }
}

impl Default for NonceAllocator {
    fn default() -> Self {
        NonceAllocator::Local(NonceSequencer::new())
    }
}
