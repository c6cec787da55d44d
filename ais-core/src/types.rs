//! Shared types, error enums, and decoded report types for ais-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maritime Mobile Service Identity.
pub type Mmsi = u32;

/// All errors produced by ais-core outside the per-record decode path.
#[derive(Debug, Error)]
pub enum AisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("zone {name}: {reason}")]
    Zone { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AisError>;

/// Reasons a single transport record fails to decode.
///
/// Every variant is recoverable: the record is dropped and decoding continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("checksum mismatch: expected {expected:02X}, computed {computed:02X}")]
    Checksum { expected: u8, computed: u8 },
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(u8),
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("payload too short for message type {msg_type}: {bits} bits")]
    PayloadTooShort { msg_type: u8, bits: usize },
    #[error("position not available")]
    PositionUnavailable,
    #[error("no timestamp for record")]
    MissingTimestamp,
    #[error("fragment {number} of {count} out of order")]
    FragmentOutOfOrder { number: u8, count: u8 },
}

impl DecodeError {
    /// Short stable label, used for drop counters.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Checksum { .. } => "checksum",
            DecodeError::UnsupportedMessageType(_) => "unsupported",
            DecodeError::Malformed(_) => "malformed",
            DecodeError::PayloadTooShort { .. } => "short",
            DecodeError::PositionUnavailable => "no_position",
            DecodeError::MissingTimestamp => "no_timestamp",
            DecodeError::FragmentOutOfOrder { .. } => "fragment_order",
        }
    }
}

/// Query failures surfaced to the client as a status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("No area selected")]
    NoAreaSelected,
    #[error("No time range selected")]
    NoTimeSelected,
    #[error("Start time must be before end time")]
    StartAfterEnd,
    #[error("Time range too large: {days} days exceeds the limit of {max_days} days")]
    RangeTooLarge { days: i64, max_days: u32 },
    #[error("already searching")]
    AlreadySearching,
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Client did not acknowledge results in time")]
    ClientTimeout,
}

// ---------------------------------------------------------------------------
// Decoded reports
// ---------------------------------------------------------------------------

/// Message types accepted by the decoder.
pub const SUPPORTED_TYPES: &[u8] = &[1, 2, 3, 4, 5, 18, 19, 24];

/// A single decoded position report. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    pub mmsi: Mmsi,
    /// Epoch seconds.
    pub timestamp: i64,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground, knots.
    pub sog: Option<f64>,
    /// Course over ground, degrees.
    pub cog: Option<f64>,
    pub heading: Option<f64>,
    /// Rate of turn, degrees per minute.
    pub rot: Option<f64>,
    pub nav_status: Option<u8>,
    pub msg_type: u8,
}

/// Static and voyage data (types 5, 19 and 24).
///
/// Type 24 arrives in two halves; each half fills only its own fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticReport {
    pub mmsi: Mmsi,
    pub timestamp: i64,
    pub msg_type: u8,
    pub name: Option<String>,
    pub callsign: Option<String>,
    pub imo: Option<u32>,
    pub ship_type: Option<u8>,
    pub dim_bow: Option<u16>,
    pub dim_stern: Option<u16>,
    pub dim_port: Option<u16>,
    pub dim_star: Option<u16>,
    pub draught: Option<f64>,
    pub destination: Option<String>,
    /// Type 24 part number (0 = A, 1 = B).
    pub part: Option<u8>,
}

/// Decoded AIS message.
#[derive(Debug, Clone, PartialEq)]
pub enum AisMessage {
    Position(RawReport),
    Static(StaticReport),
    /// Type 19 carries both a position and static fields.
    Extended(RawReport, StaticReport),
}

impl AisMessage {
    pub fn mmsi(&self) -> Mmsi {
        match self {
            AisMessage::Position(r) | AisMessage::Extended(r, _) => r.mmsi,
            AisMessage::Static(s) => s.mmsi,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            AisMessage::Position(r) | AisMessage::Extended(r, _) => r.timestamp,
            AisMessage::Static(s) => s.timestamp,
        }
    }

    pub fn msg_type(&self) -> u8 {
        match self {
            AisMessage::Position(r) | AisMessage::Extended(r, _) => r.msg_type,
            AisMessage::Static(s) => s.msg_type,
        }
    }

    pub fn position(&self) -> Option<&RawReport> {
        match self {
            AisMessage::Position(r) | AisMessage::Extended(r, _) => Some(r),
            AisMessage::Static(_) => None,
        }
    }

    pub fn static_data(&self) -> Option<&StaticReport> {
        match self {
            AisMessage::Static(s) | AisMessage::Extended(_, s) => Some(s),
            AisMessage::Position(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Vessel metadata
// ---------------------------------------------------------------------------

/// Display metadata joined onto tracks. Not needed for geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VesselMetadata {
    pub mmsi: Mmsi,
    pub name: Option<String>,
    pub imo: Option<u32>,
    pub callsign: Option<String>,
    pub flag: Option<String>,
    pub vessel_type: Option<u8>,
}

impl VesselMetadata {
    /// Metadata with only the MID-derived flag filled in.
    pub fn bare(mmsi: Mmsi) -> Self {
        VesselMetadata {
            mmsi,
            flag: crate::mid::flag_from_mmsi(mmsi).map(str::to_string),
            ..Default::default()
        }
    }
}

/// Generic vessel category for an ITU ship type code.
pub fn ship_type_text(code: u8) -> Option<&'static str> {
    let text = match code {
        20..=29 => "Wing in ground",
        30 => "Fishing",
        31 | 32 => "Towing",
        33 => "Dredging",
        34 => "Diving",
        35 => "Military",
        36 => "Sailing",
        37 => "Pleasure craft",
        40..=49 => "High speed craft",
        50 => "Pilot vessel",
        51 => "Search and rescue",
        52 => "Tug",
        53 => "Port tender",
        54 => "Anti-pollution",
        55 => "Law enforcement",
        58 => "Medical transport",
        59 => "Noncombatant",
        60..=69 => "Passenger",
        70..=79 => "Cargo",
        80..=89 => "Tanker",
        90..=99 => "Other",
        _ => return None,
    };
    Some(text)
}

/// Navigational status text for types 1-3.
pub fn nav_status_text(code: u8) -> &'static str {
    match code {
        0 => "Under way using engine",
        1 => "At anchor",
        2 => "Not under command",
        3 => "Restricted manoeuverability",
        4 => "Constrained by draught",
        5 => "Moored",
        6 => "Aground",
        7 => "Engaged in fishing",
        8 => "Under way sailing",
        14 => "AIS-SART active",
        _ => "Not defined",
    }
}

// ---------------------------------------------------------------------------
// Query request
// ---------------------------------------------------------------------------

/// Geographic bounding box in degrees.
///
/// `x0 > x1` denotes a box crossing the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let (y0, y1) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        BoundingBox { x0, y0, x1, y1 }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.x0 > self.x1
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if lat < self.y0 || lat > self.y1 {
            return false;
        }
        if self.crosses_antimeridian() {
            lon >= self.x0 || lon <= self.x1
        } else {
            lon >= self.x0 && lon <= self.x1
        }
    }
}

/// Which result stream a query produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    TrackVectors,
    Heatmap,
    Zones,
}

/// A client query: area, time window, and output kind.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub kind: QueryKind,
    pub area: Option<BoundingBox>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl QueryRequest {
    pub fn tracks(area: BoundingBox, start: i64, end: i64) -> Self {
        QueryRequest {
            kind: QueryKind::TrackVectors,
            area: Some(area),
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn zones() -> Self {
        QueryRequest {
            kind: QueryKind::Zones,
            area: None,
            start: None,
            end: None,
        }
    }

    /// Check the request before any storage access.
    ///
    /// Zone requests carry no window and always pass. `max_days` of `None`
    /// disables the span cap.
    pub fn validate(&self, max_days: Option<u32>) -> std::result::Result<QueryWindow, QueryError> {
        if self.kind == QueryKind::Zones {
            return Ok(QueryWindow::unbounded());
        }
        let area = self.area.ok_or(QueryError::NoAreaSelected)?;
        let (start, end) = match (self.start, self.end) {
            (Some(s), Some(e)) => (s, e),
            _ => return Err(QueryError::NoTimeSelected),
        };
        if start >= end {
            return Err(QueryError::StartAfterEnd);
        }
        if let Some(max_days) = max_days {
            // Extreme endpoints can overflow the subtraction; that is too large too.
            let span = end.checked_sub(start);
            if span.map_or(true, |span| span > i64::from(max_days) * 86_400) {
                return Err(QueryError::RangeTooLarge {
                    days: span.map_or(i64::MAX / 86_400, |span| {
                        span.saturating_add(86_399) / 86_400
                    }),
                    max_days,
                });
            }
        }
        Ok(QueryWindow {
            area: Some(area),
            start,
            end,
        })
    }
}

/// A validated query window: reports outside it are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryWindow {
    pub area: Option<BoundingBox>,
    pub start: i64,
    /// Inclusive.
    pub end: i64,
}

impl QueryWindow {
    pub fn unbounded() -> Self {
        QueryWindow {
            area: None,
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    pub fn contains(&self, report: &RawReport) -> bool {
        if report.timestamp < self.start || report.timestamp > self.end {
            return false;
        }
        self.area
            .map_or(true, |area| area.contains(report.lon, report.lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_contains() {
        let bbox = BoundingBox::new(-64.0, 44.0, -63.0, 45.0);
        assert!(bbox.contains(-63.5, 44.5));
        assert!(bbox.contains(-64.0, 44.0));
        assert!(!bbox.contains(-62.9, 44.5));
        assert!(!bbox.contains(-63.5, 45.1));
    }

    #[test]
    fn test_bbox_antimeridian() {
        let bbox = BoundingBox::new(170.0, -10.0, -170.0, 10.0);
        assert!(bbox.crosses_antimeridian());
        assert!(bbox.contains(175.0, 0.0));
        assert!(bbox.contains(-175.0, 0.0));
        assert!(!bbox.contains(0.0, 0.0));
    }

    #[test]
    fn test_bbox_normalizes_latitude() {
        let bbox = BoundingBox::new(0.0, 10.0, 1.0, -10.0);
        assert_eq!(bbox.y0, -10.0);
        assert_eq!(bbox.y1, 10.0);
    }

    #[test]
    fn test_validate_missing_area() {
        let req = QueryRequest {
            kind: QueryKind::TrackVectors,
            area: None,
            start: Some(0),
            end: Some(10),
        };
        assert_eq!(req.validate(Some(31)), Err(QueryError::NoAreaSelected));
    }

    #[test]
    fn test_validate_missing_time() {
        let req = QueryRequest {
            kind: QueryKind::Heatmap,
            area: Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            start: None,
            end: Some(10),
        };
        assert_eq!(req.validate(Some(31)), Err(QueryError::NoTimeSelected));
    }

    #[test]
    fn test_validate_start_after_end() {
        let req = QueryRequest::tracks(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 100, 50);
        assert_eq!(req.validate(None), Err(QueryError::StartAfterEnd));
    }

    #[test]
    fn test_validate_range_too_large() {
        let req = QueryRequest::tracks(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0, 40 * 86_400);
        assert_eq!(
            req.validate(Some(31)),
            Err(QueryError::RangeTooLarge {
                days: 40,
                max_days: 31
            })
        );
        assert!(req.validate(None).is_ok());
    }

    #[test]
    fn test_validate_extreme_endpoints() {
        let req = QueryRequest::tracks(BoundingBox::new(0.0, 0.0, 1.0, 1.0), i64::MIN, i64::MAX);
        assert_eq!(
            req.validate(Some(31)),
            Err(QueryError::RangeTooLarge {
                days: i64::MAX / 86_400,
                max_days: 31
            })
        );

        let req = QueryRequest::tracks(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0, i64::MAX);
        assert!(matches!(
            req.validate(Some(31)),
            Err(QueryError::RangeTooLarge { max_days: 31, .. })
        ));
    }

    #[test]
    fn test_validate_ok_window() {
        let req = QueryRequest::tracks(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0, 31 * 86_400);
        let window = req.validate(Some(31)).unwrap();
        assert_eq!(window.start, 0);
        assert_eq!(window.end, 31 * 86_400);
    }

    #[test]
    fn test_zones_request_always_valid() {
        assert_eq!(
            QueryRequest::zones().validate(Some(1)),
            Ok(QueryWindow::unbounded())
        );
    }

    #[test]
    fn test_range_error_message() {
        let err = QueryError::RangeTooLarge {
            days: 40,
            max_days: 31,
        };
        assert_eq!(
            err.to_string(),
            "Time range too large: 40 days exceeds the limit of 31 days"
        );
    }

    #[test]
    fn test_ship_type_text() {
        assert_eq!(ship_type_text(70), Some("Cargo"));
        assert_eq!(ship_type_text(84), Some("Tanker"));
        assert_eq!(ship_type_text(0), None);
    }

    #[test]
    fn test_message_accessors() {
        let report = RawReport {
            mmsi: 316001234,
            timestamp: 10,
            lat: 44.0,
            lon: -63.0,
            sog: None,
            cog: None,
            heading: None,
            rot: None,
            nav_status: None,
            msg_type: 19,
        };
        let msg = AisMessage::Extended(
            report.clone(),
            StaticReport {
                mmsi: 316001234,
                timestamp: 10,
                msg_type: 19,
                ..Default::default()
            },
        );
        assert_eq!(msg.mmsi(), 316001234);
        assert_eq!(msg.position(), Some(&report));
        assert!(msg.static_data().is_some());
    }
}
