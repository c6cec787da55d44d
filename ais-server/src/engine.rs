//! Query Engine: validated, cancellable, streaming track queries.
//!
//! A query scans storage in MMSI order. After each batch every vessel with
//! an MMSI below the last one seen is complete, so it is assembled,
//! processed and handed to the [`ResultSink`] right away instead of holding
//! the whole result in memory. The cancellation flag is checked between
//! batches and between vessels; storage cursors are never abandoned
//! mid-read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use ais_core::assembler::{TrackAssembler, VesselTrack};
use ais_core::config::{AssemblerSettings, Config, Denoise, QueryConfig};
use ais_core::encoder::{messages_for, ServerMessage, TrackVector};
use ais_core::pathways::{separate_pathways, PathwayParams};
use ais_core::processor::{process, ProcessingOptions};
use ais_core::types::{QueryError, QueryKind, QueryRequest, VesselMetadata};
use ais_core::zones::{ZonePolygon, ZoneSet};

use crate::store::{ReportStore, Scan};

pub const STATUS_NO_DATA: &str = "No data for selection";
pub const STATUS_CANCELLED: &str = "Search cancelled";

/// Engine settings drawn from the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub assembler: AssemblerSettings,
    pub processing: ProcessingOptions,
    pub pathways: PathwayParams,
    pub query: QueryConfig,
    pub max_query_days: Option<u32>,
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        EngineConfig {
            assembler: config.assembler.clone(),
            processing: config.processing.clone(),
            pathways: config.pathways,
            query: config.query.clone(),
            max_query_days: config.server.max_query_days,
        }
    }
}

/// Cooperative cancellation shared between a session and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives result messages as the engine produces them.
#[async_trait]
pub trait ResultSink: Send {
    /// An error stops the query with that error.
    async fn send(&mut self, msg: ServerMessage) -> Result<(), QueryError>;
}

/// How a query that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Number of vessels (or zones) that produced output.
    Done { count: usize },
    Cancelled,
}

/// Collected outcome of a whole query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    TrackSet(Vec<TrackVector>),
    ZoneSet(Vec<ZonePolygon>),
    HeatmapPoints(Vec<[f64; 2]>),
    Error(QueryError),
}

/// Terminal message for a finished query.
pub fn terminal_message(kind: QueryKind, completion: Completion) -> ServerMessage {
    match (kind, completion) {
        (_, Completion::Cancelled) => ServerMessage::cancelled(STATUS_CANCELLED),
        (QueryKind::Zones, Completion::Done { .. }) => ServerMessage::DoneZones,
        (QueryKind::Heatmap, Completion::Done { count }) => {
            ServerMessage::done(format!("done loading heatmap. vessel count: {count}"))
        }
        (QueryKind::TrackVectors, Completion::Done { count: 0 }) => ServerMessage::done(STATUS_NO_DATA),
        (QueryKind::TrackVectors, Completion::Done { count }) => {
            ServerMessage::done(format!("Done. Count: {count}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct QueryEngine {
    store: Arc<dyn ReportStore>,
    zones: Arc<ZoneSet>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn ReportStore>, zones: Arc<ZoneSet>, config: EngineConfig) -> Self {
        QueryEngine { store, zones, config }
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    /// Check a request without touching storage.
    pub fn validate(&self, req: &QueryRequest) -> Result<(), QueryError> {
        req.validate(self.config.max_query_days).map(|_| ())
    }

    pub async fn valid_range(&self) -> Result<Option<(i64, i64)>, QueryError> {
        self.store.valid_range().await.map_err(|e| {
            error!(error = %e, "valid range lookup failed");
            QueryError::from(e)
        })
    }

    /// Run one query, streaming result messages into `sink`.
    ///
    /// The terminal message is not sent; see [`terminal_message`].
    pub async fn execute(
        &self,
        req: &QueryRequest,
        cancel: &CancelFlag,
        sink: &mut dyn ResultSink,
    ) -> Result<Completion, QueryError> {
        let window = req.validate(self.config.max_query_days)?;

        if req.kind == QueryKind::Zones {
            let mut count = 0;
            for zone in self.zones.iter() {
                if cancel.is_cancelled() {
                    return Ok(Completion::Cancelled);
                }
                sink.send(ServerMessage::Zone(zone.clone())).await?;
                count += 1;
            }
            return Ok(Completion::Done { count });
        }

        let opts = match req.kind {
            QueryKind::Heatmap => self.config.query.heatmap_options(&self.config.processing),
            _ => self.config.processing.clone(),
        };
        let scan = Scan {
            window,
            valid_mmsi_only: self.config.query.valid_mmsi_only,
            batch_size: self.config.query.batch_size,
        };
        let mut assembler = TrackAssembler::new(self.config.assembler.assembler_config(), window);
        let mut cursor = None;
        let mut count = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(Completion::Cancelled);
            }
            let batch = self.store.fetch_batch(&scan, cursor).await.map_err(|e| {
                error!(error = %e, "storage scan failed");
                QueryError::from(e)
            })?;
            let last_mmsi = batch.reports.last().map(|r| r.mmsi);
            for report in batch.reports {
                assembler.push(report);
            }

            let ready = match (batch.next, last_mmsi) {
                (Some(next), Some(mmsi)) => {
                    cursor = Some(next);
                    assembler.drain_below(mmsi)
                }
                _ => assembler.drain_all(),
            };
            for track in ready {
                if cancel.is_cancelled() {
                    return Ok(Completion::Cancelled);
                }
                if self.emit(track, req.kind, &opts, sink).await? {
                    count += 1;
                }
            }
            if batch.next.is_none() {
                break;
            }
        }

        debug!(
            reports = assembler.total_reports,
            duplicates = assembler.duplicates,
            rejected = assembler.rejected_noise,
            vessels = count,
            "query complete"
        );
        Ok(Completion::Done { count })
    }

    /// Process one vessel and send its messages. Returns whether anything
    /// was sent.
    async fn emit(
        &self,
        track: VesselTrack,
        kind: QueryKind,
        opts: &ProcessingOptions,
        sink: &mut dyn ResultSink,
    ) -> Result<bool, QueryError> {
        let mmsi = track.mmsi;
        let tracks = match self.config.assembler.denoise {
            Denoise::Pathways => separate_pathways(track, &self.config.pathways),
            Denoise::Teleport | Denoise::None => vec![track],
        };
        let segments: Vec<_> = tracks.iter().flat_map(|t| process(t, opts)).collect();
        if segments.is_empty() {
            return Ok(false);
        }

        let metadata = if kind == QueryKind::TrackVectors {
            self.store.vessel_metadata(mmsi).await.unwrap_or_else(|e| {
                warn!(mmsi, error = %e, "metadata lookup failed");
                VesselMetadata::bare(mmsi)
            })
        } else {
            VesselMetadata::bare(mmsi)
        };

        let messages = messages_for(&segments, &metadata, kind, &self.zones);
        let sent = !messages.is_empty();
        for msg in messages {
            sink.send(msg).await?;
        }
        Ok(sent)
    }

    /// Run a query to completion and collect its results.
    pub async fn run_query(&self, req: &QueryRequest) -> QueryResult {
        let mut sink = CollectSink::default();
        match self.execute(req, &CancelFlag::new(), &mut sink).await {
            Err(e) => QueryResult::Error(e),
            Ok(_) => sink.into_result(req.kind),
        }
    }
}

/// Sink that keeps every message in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub messages: Vec<ServerMessage>,
}

impl CollectSink {
    fn into_result(self, kind: QueryKind) -> QueryResult {
        let messages = self.messages.into_iter();
        match kind {
            QueryKind::TrackVectors => QueryResult::TrackSet(
                messages
                    .filter_map(|m| match m {
                        ServerMessage::TrackVector(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            ),
            QueryKind::Zones => QueryResult::ZoneSet(
                messages
                    .filter_map(|m| match m {
                        ServerMessage::Zone(z) => Some(z),
                        _ => None,
                    })
                    .collect(),
            ),
            QueryKind::Heatmap => QueryResult::HeatmapPoints(
                messages
                    .flat_map(|m| match m {
                        ServerMessage::Heatmap { xy } => xy,
                        _ => Vec::new(),
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ResultSink for CollectSink {
    async fn send(&mut self, msg: ServerMessage) -> Result<(), QueryError> {
        self.messages.push(msg);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use ais_core::types::{BoundingBox, Mmsi, QueryRequest, RawReport};

    use crate::store::MemoryStore;

    /// 2021-07-01T00:00:00Z
    pub const JULY_1: i64 = 1_625_097_600;
    pub const DAY: i64 = 86_400;

    pub fn report(mmsi: Mmsi, timestamp: i64, lon: f64, lat: f64) -> RawReport {
        RawReport {
            mmsi,
            timestamp,
            lat,
            lon,
            sog: Some(8.0),
            cog: Some(90.0),
            heading: None,
            rot: None,
            nav_status: Some(0),
            msg_type: 1,
        }
    }

    /// A vessel steaming east from `lon` for `n` ten-minute steps.
    pub fn voyage(mmsi: Mmsi, start: i64, lon: f64, lat: f64, n: i64) -> Vec<RawReport> {
        (0..n)
            .map(|i| report(mmsi, start + i * 600, lon + i as f64 * 0.02, lat))
            .collect()
    }

    /// Three vessels: two inside the Halifax box on July 1st, one far away.
    pub fn three_vessels() -> MemoryStore {
        let mut reports = voyage(316000001, JULY_1 + 3600, -63.9, 44.3, 12);
        reports.extend(voyage(316000002, JULY_1 + 7200, -63.8, 44.7, 12));
        reports.extend(voyage(366000003, JULY_1 + 3600, -70.0, 40.0, 12));
        MemoryStore::new(reports)
    }

    pub fn halifax_query() -> QueryRequest {
        QueryRequest::tracks(
            BoundingBox::new(-64.0, 44.0, -63.0, 45.0),
            JULY_1,
            JULY_1 + DAY,
        )
    }
}
