//! Storage backends behind the Query Engine.
//!
//! The engine sees storage only through [`ReportStore`]: a finite,
//! restartable, MMSI-ordered scan of position reports plus metadata lookup.
//! [`SqliteStore`] opens its own connection per call on the blocking pool;
//! [`MemoryStore`] serves fixtures and can inject delays and failures.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use ais_core::types::{Mmsi, QueryError, QueryWindow, RawReport, VesselMetadata};
use ais_core::mid::is_valid_mmsi;

use crate::db::Database;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        QueryError::StorageUnavailable(e.to_string())
    }
}

/// Resume point of a scan: the last row returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub mmsi: Mmsi,
    pub time: i64,
    pub rowid: i64,
}

/// One page of a scan. `next` is `None` once the scan is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub reports: Vec<RawReport>,
    pub next: Option<Cursor>,
}

/// What a query scans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scan {
    pub window: QueryWindow,
    pub valid_mmsi_only: bool,
    pub batch_size: usize,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Earliest and latest stored position time.
    async fn valid_range(&self) -> Result<Option<(i64, i64)>, StoreError>;

    /// Positions ordered by (MMSI, time), resuming after `after`.
    async fn fetch_batch(&self, scan: &Scan, after: Option<Cursor>) -> Result<Batch, StoreError>;

    async fn vessel_metadata(&self, mmsi: Mmsi) -> Result<VesselMetadata, StoreError>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    db_path: String,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<String>) -> Self {
        SqliteStore {
            db_path: db_path.into(),
        }
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let db = Database::open(&path)?;
            f(&db)
        })
        .await?;
        Ok(result?)
    }
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn valid_range(&self) -> Result<Option<(i64, i64)>, StoreError> {
        self.with_db(|db| db.valid_range()).await
    }

    async fn fetch_batch(&self, scan: &Scan, after: Option<Cursor>) -> Result<Batch, StoreError> {
        let scan = *scan;
        self.with_db(move |db| db.fetch_batch(&scan, after)).await
    }

    async fn vessel_metadata(&self, mmsi: Mmsi) -> Result<VesselMetadata, StoreError> {
        self.with_db(move |db| db.vessel_metadata(mmsi)).await
    }
}

// ---------------------------------------------------------------------------
// In-memory fixture store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    /// Sorted by (mmsi, time, insertion order); the index is the row id.
    reports: Vec<RawReport>,
    metadata: HashMap<Mmsi, VesselMetadata>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl MemoryStore {
    pub fn new(mut reports: Vec<RawReport>) -> Self {
        reports.sort_by_key(|r| (r.mmsi, r.timestamp));
        MemoryStore {
            reports,
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, meta: VesselMetadata) -> Self {
        self.metadata.insert(meta.mmsi, meta);
        self
    }

    /// Sleep before every batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with this message.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    fn check(&self) -> Result<(), StoreError> {
        match &self.failure {
            Some(msg) => Err(StoreError::Unavailable(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn valid_range(&self) -> Result<Option<(i64, i64)>, StoreError> {
        self.check()?;
        let start = self.reports.iter().map(|r| r.timestamp).min();
        let end = self.reports.iter().map(|r| r.timestamp).max();
        Ok(start.zip(end))
    }

    async fn fetch_batch(&self, scan: &Scan, after: Option<Cursor>) -> Result<Batch, StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;

        let mut reports = Vec::new();
        let mut last = None;
        for (rowid, r) in self.reports.iter().enumerate() {
            let cursor = Cursor {
                mmsi: r.mmsi,
                time: r.timestamp,
                rowid: rowid as i64,
            };
            if after.is_some_and(|a| cursor <= a) {
                continue;
            }
            if !scan.window.contains(r) || (scan.valid_mmsi_only && !is_valid_mmsi(r.mmsi)) {
                continue;
            }
            reports.push(r.clone());
            last = Some(cursor);
            if reports.len() == scan.batch_size {
                break;
            }
        }
        let next = if reports.len() < scan.batch_size { None } else { last };
        Ok(Batch { reports, next })
    }

    async fn vessel_metadata(&self, mmsi: Mmsi) -> Result<VesselMetadata, StoreError> {
        self.check()?;
        Ok(self
            .metadata
            .get(&mmsi)
            .cloned()
            .unwrap_or_else(|| VesselMetadata::bare(mmsi)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(mmsi: Mmsi, timestamp: i64) -> RawReport {
        RawReport {
            mmsi,
            timestamp,
            lat: 44.5,
            lon: -63.5,
            sog: None,
            cog: None,
            heading: None,
            rot: None,
            nav_status: None,
            msg_type: 1,
        }
    }

    fn scan(batch_size: usize) -> Scan {
        Scan {
            window: QueryWindow::unbounded(),
            valid_mmsi_only: false,
            batch_size,
        }
    }

    async fn drain(store: &dyn ReportStore, s: Scan) -> Vec<(Mmsi, i64)> {
        let mut out = Vec::new();
        let mut cursor = None;
        loop {
            let batch = store.fetch_batch(&s, cursor).await.unwrap();
            out.extend(batch.reports.iter().map(|r| (r.mmsi, r.timestamp)));
            match batch.next {
                Some(c) => cursor = Some(c),
                None => return out,
            }
        }
    }

    #[tokio::test]
    async fn test_memory_store_paging() {
        let store = MemoryStore::new(vec![report(2, 1), report(1, 5), report(1, 1), report(3, 0)]);
        assert_eq!(drain(&store, scan(3)).await, vec![(1, 1), (1, 5), (2, 1), (3, 0)]);
        assert_eq!(store.valid_range().await.unwrap(), Some((0, 5)));
    }

    #[tokio::test]
    async fn test_memory_store_failure() {
        let store = MemoryStore::new(vec![report(1, 1)]).with_failure("disk offline");
        let err = store.fetch_batch(&scan(10), None).await.unwrap_err();
        assert_eq!(
            QueryError::from(err),
            QueryError::StorageUnavailable("disk offline".into())
        );
    }

    #[tokio::test]
    async fn test_memory_store_bare_metadata() {
        let store = MemoryStore::new(Vec::new());
        let meta = store.vessel_metadata(316001234).await.unwrap();
        assert_eq!(meta.flag.as_deref(), Some("Canada"));
        assert!(meta.name.is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_matches_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db").to_str().unwrap().to_string();
        let reports = vec![report(2, 1), report(1, 5), report(1, 1), report(3, 0)];
        {
            let mut db = Database::open(&path).unwrap();
            for r in &reports {
                db.insert_position(r).unwrap();
            }
        }
        let sqlite = SqliteStore::new(path);
        let memory = MemoryStore::new(reports);
        assert_eq!(drain(&sqlite, scan(2)).await, drain(&memory, scan(2)).await);
        assert_eq!(sqlite.valid_range().await.unwrap(), Some((0, 5)));
    }
}
