//! Raw-file ingest: decode AIVDM / JSON records into SQLite.
//!
//! Each input file gets its own [`Decoder`] so multi-sentence fragments
//! never pair across files. Writes run in batch mode and are flushed once per
//! file. Dropped records are counted by [`DecodeError::kind`].

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use ais_core::config::DecoderConfig;
use ais_core::decode::Decoder;
use ais_core::types::AisMessage;

use crate::db::Database;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Counts over one ingest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub records: u64,
    pub decoded: u64,
    pub positions: u64,
    pub statics: u64,
    /// Partial multi-sentence groups that never completed.
    pub incomplete_fragments: u64,
    pub dropped: BTreeMap<&'static str, u64>,
}

impl IngestSummary {
    pub fn total_dropped(&self) -> u64 {
        self.dropped.values().sum()
    }
}

/// Decode every line of `reader` into `db`.
pub fn ingest_reader(
    db: &mut Database,
    decoder: &mut Decoder,
    reader: impl BufRead,
    summary: &mut IngestSummary,
) -> rusqlite::Result<()> {
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        summary.records += 1;

        let msg = match decoder.decode(line.as_bytes()) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(e) => {
                *summary.dropped.entry(e.kind()).or_insert(0) += 1;
                continue;
            }
        };
        summary.decoded += 1;
        match &msg {
            AisMessage::Position(_) => summary.positions += 1,
            AisMessage::Static(_) => summary.statics += 1,
            AisMessage::Extended(_, _) => {
                summary.positions += 1;
                summary.statics += 1;
            }
        }
        db.insert_message(&msg)?;
    }
    Ok(())
}

/// Ingest files in order; `-` reads stdin.
pub fn ingest_files(
    db: &mut Database,
    files: &[PathBuf],
    config: &DecoderConfig,
    default_timestamp: Option<i64>,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();
    db.set_autocommit(false)?;

    for file in files {
        let mut decoder = Decoder::new(config.fragment_window, config.fragment_capacity);
        decoder.set_default_timestamp(default_timestamp);

        if file.to_str() == Some("-") {
            ingest_reader(db, &mut decoder, io::stdin().lock(), &mut summary)?;
        } else {
            let reader = open(file)?;
            ingest_reader(db, &mut decoder, reader, &mut summary)?;
        }
        db.flush()?;

        summary.files += 1;
        summary.incomplete_fragments += decoder.fragments_discarded();
        debug!(
            file = %file.display(),
            records = decoder.total_records,
            decoded = decoder.decoded,
            dropped = decoder.dropped,
            "file ingested"
        );
    }

    db.set_autocommit(true)?;
    info!(
        files = summary.files,
        records = summary.records,
        positions = summary.positions,
        statics = summary.statics,
        dropped = summary.total_dropped(),
        "ingest complete"
    );
    Ok(summary)
}

fn open(path: &Path) -> Result<io::BufReader<std::fs::File>, IngestError> {
    std::fs::File::open(path)
        .map(io::BufReader::new)
        .map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })
}
