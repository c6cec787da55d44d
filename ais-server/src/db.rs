//! SQLite persistence: WAL mode, two report tables, keyset-paginated scans.
//!
//! Schema: dynamic_reports (positions), static_reports (identity/voyage).
//! Scans are ordered by (mmsi, time, id) so a query can stop between
//! batches and resume from the last row seen.

use rusqlite::types::FromSql;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use serde::Serialize;
use std::path::Path;

use ais_core::mid::{VALID_MMSI_END, VALID_MMSI_MIN};
use ais_core::types::{AisMessage, Mmsi, RawReport, StaticReport, VesselMetadata};

use crate::store::{Batch, Cursor, Scan};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS dynamic_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mmsi INTEGER NOT NULL,
    time INTEGER NOT NULL,
    lon REAL NOT NULL,
    lat REAL NOT NULL,
    sog REAL,
    cog REAL,
    heading REAL,
    rot REAL,
    nav_status INTEGER,
    msg_type INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS static_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mmsi INTEGER NOT NULL,
    time INTEGER NOT NULL,
    msg_type INTEGER NOT NULL,
    name TEXT,
    callsign TEXT,
    imo INTEGER,
    ship_type INTEGER,
    dim_bow INTEGER,
    dim_stern INTEGER,
    dim_port INTEGER,
    dim_star INTEGER,
    draught REAL,
    destination TEXT
);

CREATE INDEX IF NOT EXISTS idx_dynamic_mmsi_time ON dynamic_reports(mmsi, time);
CREATE INDEX IF NOT EXISTS idx_dynamic_time ON dynamic_reports(time);
CREATE INDEX IF NOT EXISTS idx_static_mmsi_time ON static_reports(mmsi, time);
"#;

/// SQLite database of decoded AIS reports.
pub struct Database {
    conn: Connection,
    autocommit: bool,
    pending: u32,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &str) -> SqlResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            Connection::open(path)?
        };

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Database {
            conn,
            autocommit: true,
            pending: 0,
        })
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> SqlResult<Self> {
        Self::open(":memory:")
    }

    /// Set batch mode: with autocommit off, writes accumulate in one
    /// transaction until [`flush`](Self::flush).
    pub fn set_autocommit(&mut self, autocommit: bool) -> SqlResult<()> {
        if self.autocommit == autocommit {
            return Ok(());
        }
        if autocommit {
            self.conn.execute_batch("COMMIT;")?;
            self.pending = 0;
        } else {
            self.conn.execute_batch("BEGIN;")?;
        }
        self.autocommit = autocommit;
        Ok(())
    }

    /// Commit pending writes when batching.
    pub fn flush(&mut self) -> SqlResult<()> {
        if !self.autocommit && self.pending > 0 {
            self.conn.execute_batch("COMMIT; BEGIN;")?;
            self.pending = 0;
        }
        Ok(())
    }

    /// Number of writes since the last commit.
    pub fn pending(&self) -> u32 {
        self.pending
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn insert_position(&mut self, r: &RawReport) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO dynamic_reports (mmsi, time, lon, lat, sog, cog, heading, rot, nav_status, msg_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                r.mmsi,
                r.timestamp,
                r.lon,
                r.lat,
                r.sog,
                r.cog,
                r.heading,
                r.rot,
                r.nav_status,
                r.msg_type
            ],
        )?;
        self.pending += 1;
        Ok(())
    }

    pub fn insert_static(&mut self, s: &StaticReport) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO static_reports (mmsi, time, msg_type, name, callsign, imo, ship_type,
                                         dim_bow, dim_stern, dim_port, dim_star, draught, destination)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                s.mmsi,
                s.timestamp,
                s.msg_type,
                s.name,
                s.callsign,
                s.imo,
                s.ship_type,
                s.dim_bow,
                s.dim_stern,
                s.dim_port,
                s.dim_star,
                s.draught,
                s.destination
            ],
        )?;
        self.pending += 1;
        Ok(())
    }

    /// Store every part of a decoded message.
    pub fn insert_message(&mut self, msg: &AisMessage) -> SqlResult<()> {
        if let Some(r) = msg.position() {
            self.insert_position(r)?;
        }
        if let Some(s) = msg.static_data() {
            self.insert_static(s)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Earliest and latest stored position time.
    pub fn valid_range(&self) -> SqlResult<Option<(i64, i64)>> {
        let (start, end): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(time), MAX(time) FROM dynamic_reports",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(start.zip(end))
    }

    /// One page of positions inside the scan window, after `after`.
    pub fn fetch_batch(&self, scan: &Scan, after: Option<Cursor>) -> SqlResult<Batch> {
        let window = &scan.window;
        let mut conditions = vec!["time >= ?1".to_string(), "time <= ?2".to_string()];
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(window.start), Box::new(window.end)];

        if let Some(area) = window.area {
            let n = bind_values.len();
            conditions.push(format!("lat >= ?{} AND lat <= ?{}", n + 1, n + 2));
            let lon = if area.crosses_antimeridian() { "OR" } else { "AND" };
            conditions.push(format!("(lon >= ?{} {lon} lon <= ?{})", n + 3, n + 4));
            bind_values.push(Box::new(area.y0));
            bind_values.push(Box::new(area.y1));
            bind_values.push(Box::new(area.x0));
            bind_values.push(Box::new(area.x1));
        }
        if scan.valid_mmsi_only {
            let n = bind_values.len();
            conditions.push(format!("mmsi >= ?{} AND mmsi < ?{}", n + 1, n + 2));
            bind_values.push(Box::new(VALID_MMSI_MIN));
            bind_values.push(Box::new(VALID_MMSI_END));
        }
        if let Some(c) = after {
            let n = bind_values.len();
            conditions.push(format!("(mmsi, time, id) > (?{}, ?{}, ?{})", n + 1, n + 2, n + 3));
            bind_values.push(Box::new(c.mmsi));
            bind_values.push(Box::new(c.time));
            bind_values.push(Box::new(c.rowid));
        }

        let where_clause = conditions.join(" AND ");
        let sql = format!(
            "SELECT id, mmsi, time, lon, lat, sog, cog, heading, rot, nav_status, msg_type
             FROM dynamic_reports
             WHERE {where_clause}
             ORDER BY mmsi, time, id LIMIT ?{}",
            bind_values.len() + 1
        );
        bind_values.push(Box::new(scan.batch_size as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::types::ToSql> = bind_values.iter().map(|b| b.as_ref()).collect();

        let mut last: Option<Cursor> = None;
        let mut reports = Vec::new();
        let rows = stmt.query_map(refs.as_slice(), |r| {
            Ok((
                r.get::<_, i64>(0)?,
                RawReport {
                    mmsi: r.get(1)?,
                    timestamp: r.get(2)?,
                    lon: r.get(3)?,
                    lat: r.get(4)?,
                    sog: r.get(5)?,
                    cog: r.get(6)?,
                    heading: r.get(7)?,
                    rot: r.get(8)?,
                    nav_status: r.get(9)?,
                    msg_type: r.get(10)?,
                },
            ))
        })?;
        for row in rows {
            let (rowid, report) = row?;
            last = Some(Cursor {
                mmsi: report.mmsi,
                time: report.timestamp,
                rowid,
            });
            reports.push(report);
        }

        let next = if reports.len() < scan.batch_size { None } else { last };
        Ok(Batch { reports, next })
    }

    fn latest<T: FromSql>(&self, mmsi: Mmsi, column: &str) -> SqlResult<Option<T>> {
        let sql = format!(
            "SELECT {column} FROM static_reports
             WHERE mmsi = ?1 AND {column} IS NOT NULL AND {column} != ''
             ORDER BY time DESC, id DESC LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![mmsi], |r| r.get(0))
            .optional()
    }

    /// Latest non-empty static fields for a vessel; flag from the MID.
    pub fn vessel_metadata(&self, mmsi: Mmsi) -> SqlResult<VesselMetadata> {
        let mut meta = VesselMetadata::bare(mmsi);
        meta.name = self.latest(mmsi, "name")?;
        meta.callsign = self.latest(mmsi, "callsign")?;
        meta.imo = self.latest(mmsi, "imo")?;
        meta.vessel_type = self.latest(mmsi, "ship_type")?;
        Ok(meta)
    }

    pub fn stats(&self) -> SqlResult<DbStats> {
        let count = |sql: &str| -> SqlResult<i64> { self.conn.query_row(sql, [], |r| r.get(0)) };
        let range = self.valid_range()?;
        Ok(DbStats {
            positions: count("SELECT COUNT(*) FROM dynamic_reports")?,
            static_reports: count("SELECT COUNT(*) FROM static_reports")?,
            vessels: count("SELECT COUNT(DISTINCT mmsi) FROM dynamic_reports")?,
            first_time: range.map(|r| r.0),
            last_time: range.map(|r| r.1),
        })
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DbStats {
    pub positions: i64,
    pub static_reports: i64,
    pub vessels: i64,
    pub first_time: Option<i64>,
    pub last_time: Option<i64>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
