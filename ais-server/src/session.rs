//! Per-connection session: the Idle / Searching state machine.
//!
//! Each connection gets one session task. Client frames arrive on an
//! inbound channel; encoded server frames leave on a bounded outbound
//! channel drained by the transport. Queries run on a separate worker task
//! so the session keeps answering `stop`, `ack` and `validrange` while a
//! scan is in flight.
//!
//! - at most one query per session; a second is rejected with
//!   "already searching"
//! - `stop` cancels the worker, sends the cancelled terminal message
//!   immediately and returns to Idle
//! - worker output is tagged with a query generation; output from a stopped
//!   query is dropped, so nothing follows the cancelled message
//! - with an ack window, each result message consumes one credit and each
//!   `ack` returns one

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ais_core::config::ServerConfig;
use ais_core::encoder::{encode, ServerMessage};
use ais_core::protocol::{parse_client_message, ClientMessage};
use ais_core::types::{QueryError, QueryKind, QueryRequest};

use crate::engine::{
    terminal_message, CancelFlag, QueryEngine, ResultSink, STATUS_CANCELLED, STATUS_NO_DATA,
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unacknowledged result messages allowed in flight; 0 disables.
    pub ack_window: usize,
    pub outbound_buffer: usize,
    pub ack_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for SessionConfig {
    fn from(server: &ServerConfig) -> Self {
        SessionConfig {
            ack_window: server.ack_window,
            outbound_buffer: server.outbound_buffer.max(1),
            ack_timeout: Duration::from_secs(server.ack_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Searching,
}

/// The transport went away.
#[derive(Debug)]
struct Closed;

struct WorkerEvent {
    generation: u64,
    msg: ServerMessage,
}

struct ActiveQuery {
    generation: u64,
    kind: QueryKind,
    cancel: CancelFlag,
    credits: Option<Arc<Semaphore>>,
}

impl ActiveQuery {
    fn halt(&self) {
        self.cancel.cancel();
        if let Some(credits) = &self.credits {
            credits.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Worker sink
// ---------------------------------------------------------------------------

/// Forwards engine output to the session, waiting for ack credit.
struct ChannelSink {
    generation: u64,
    tx: mpsc::Sender<WorkerEvent>,
    credits: Option<Arc<Semaphore>>,
    ack_timeout: Duration,
}

#[async_trait]
impl ResultSink for ChannelSink {
    async fn send(&mut self, msg: ServerMessage) -> Result<(), QueryError> {
        if let (true, Some(credits)) = (msg.is_result(), &self.credits) {
            match tokio::time::timeout(self.ack_timeout, credits.acquire()).await {
                Ok(Ok(permit)) => permit.forget(),
                // Closed by stop: the engine sees the cancel flag next.
                Ok(Err(_)) => return Ok(()),
                Err(_) => return Err(QueryError::ClientTimeout),
            }
        }
        let _ = self
            .tx
            .send(WorkerEvent {
                generation: self.generation,
                msg,
            })
            .await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    id: Uuid,
    engine: Arc<QueryEngine>,
    config: SessionConfig,
    outbound: mpsc::Sender<Vec<u8>>,
    worker_tx: mpsc::Sender<WorkerEvent>,
    active: Option<ActiveQuery>,
    generation: u64,

    // Counters
    pub queries: u64,
    pub cancelled: u64,
    pub rejected: u64,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SearchState {
        if self.active.is_some() {
            SearchState::Searching
        } else {
            SearchState::Idle
        }
    }

    async fn send(&self, msg: &ServerMessage) -> Result<(), Closed> {
        self.outbound.send(encode(msg)).await.map_err(|_| Closed)
    }

    async fn handle_text(&mut self, text: &str) -> Result<(), Closed> {
        let msg = match parse_client_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session = %self.id, error = %e, "malformed client message");
                return Ok(());
            }
        };
        match msg {
            ClientMessage::ValidRange => {
                let reply = match self.engine.valid_range().await {
                    Ok(Some((start, end))) => ServerMessage::ValidRange { start, end },
                    Ok(None) => ServerMessage::error(STATUS_NO_DATA),
                    Err(e) => ServerMessage::error(e.to_string()),
                };
                self.send(&reply).await
            }
            ClientMessage::Query(req) => self.start_query(req).await,
            ClientMessage::Stop => self.stop().await,
            ClientMessage::Ack => {
                if let Some(credits) = self.active.as_ref().and_then(|a| a.credits.as_ref()) {
                    if credits.available_permits() < self.config.ack_window {
                        credits.add_permits(1);
                    }
                }
                Ok(())
            }
            ClientMessage::Unknown(tag) => {
                warn!(session = %self.id, msgtype = %tag, "ignoring unknown message");
                Ok(())
            }
        }
    }

    /// A query arriving while another is active is answered with an error
    /// `done` at once. That frame goes out ahead of the active query's own
    /// results and terminal `done`, so clients must not treat the first
    /// `done` after a query as the end of the running stream.
    async fn start_query(&mut self, req: QueryRequest) -> Result<(), Closed> {
        if self.active.is_some() {
            self.rejected += 1;
            debug!(session = %self.id, "query rejected while searching");
            return self
                .send(&ServerMessage::error(QueryError::AlreadySearching.to_string()))
                .await;
        }
        if let Err(e) = self.engine.validate(&req) {
            info!(session = %self.id, error = %e, "query rejected");
            return self.send(&ServerMessage::error(e.to_string())).await;
        }

        self.generation += 1;
        let generation = self.generation;
        let kind = req.kind;
        let cancel = CancelFlag::new();
        let credits =
            (self.config.ack_window > 0).then(|| Arc::new(Semaphore::new(self.config.ack_window)));
        let mut sink = ChannelSink {
            generation,
            tx: self.worker_tx.clone(),
            credits: credits.clone(),
            ack_timeout: self.config.ack_timeout,
        };

        let engine = self.engine.clone();
        let flag = cancel.clone();
        tokio::spawn(async move {
            let terminal = match engine.execute(&req, &flag, &mut sink).await {
                Ok(completion) => terminal_message(kind, completion),
                Err(e) => ServerMessage::error(e.to_string()),
            };
            let _ = sink
                .tx
                .send(WorkerEvent {
                    generation,
                    msg: terminal,
                })
                .await;
        });

        self.queries += 1;
        info!(session = %self.id, ?kind, generation, "query started");
        self.active = Some(ActiveQuery {
            generation,
            kind,
            cancel,
            credits,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), Closed> {
        let Some(active) = self.active.take() else {
            debug!(session = %self.id, "stop while idle");
            return Ok(());
        };
        active.halt();
        self.cancelled += 1;
        info!(session = %self.id, kind = ?active.kind, "query cancelled");
        self.send(&ServerMessage::cancelled(STATUS_CANCELLED)).await
    }

    async fn forward(&mut self, event: WorkerEvent) -> Result<(), Closed> {
        match &self.active {
            Some(active) if active.generation == event.generation => {}
            _ => return Ok(()),
        }
        self.send(&event.msg).await?;
        if event.msg.is_terminal() {
            if let Some(active) = self.active.take() {
                info!(session = %self.id, kind = ?active.kind, "query finished");
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        let state = self.state();
        if let Some(active) = self.active.take() {
            active.halt();
        }
        info!(
            session = %self.id,
            ?state,
            queries = self.queries,
            cancelled = self.cancelled,
            rejected = self.rejected,
            "session closed"
        );
    }
}

/// Drive one session until the inbound channel closes or the outbound
/// receiver is dropped.
pub async fn run_session(
    engine: Arc<QueryEngine>,
    config: SessionConfig,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<Vec<u8>>,
) {
    let (worker_tx, mut worker_rx) = mpsc::channel(config.outbound_buffer);
    let mut session = Session {
        id: Uuid::new_v4(),
        engine,
        config,
        outbound,
        worker_tx,
        active: None,
        generation: 0,
        queries: 0,
        cancelled: 0,
        rejected: 0,
    };
    info!(session = %session.id(), "session opened");

    loop {
        let step = tokio::select! {
            msg = inbound.recv() => match msg {
                Some(text) => session.handle_text(&text).await,
                None => break,
            },
            Some(event) = worker_rx.recv() => session.forward(event).await,
        };
        if step.is_err() {
            break;
        }
    }
    session.shutdown();
}

/// Channels and task of a spawned session.
pub struct SessionHandle {
    pub inbound: mpsc::Sender<String>,
    pub outbound: mpsc::Receiver<Vec<u8>>,
    pub task: JoinHandle<()>,
}

pub fn spawn_session(engine: Arc<QueryEngine>, config: SessionConfig) -> SessionHandle {
    let (in_tx, in_rx) = mpsc::channel(config.outbound_buffer);
    let (out_tx, out_rx) = mpsc::channel(config.outbound_buffer);
    let task = tokio::spawn(run_session(engine, config, in_rx, out_tx));
    SessionHandle {
        inbound: in_tx,
        outbound: out_rx,
        task,
    }
}
