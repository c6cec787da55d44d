//! Client-to-server message parsing.
//!
//! Clients send JSON objects tagged with `msgtype` (older clients use
//! `type`). Query messages carry `start`, `end` and `area`; the parser is
//! lenient about their shape and leaves range checks to
//! [`QueryRequest::validate`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::types::{BoundingBox, QueryKind, QueryRequest, Result};

/// Epoch values above this are milliseconds.
const MILLIS_THRESHOLD: f64 = 1e11;

/// A parsed client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    ValidRange,
    /// Track, heatmap, or zone query.
    Query(QueryRequest),
    Stop,
    Ack,
    /// Unrecognised tag, kept for logging.
    Unknown(String),
}

/// Parse one client frame. Fails only on malformed JSON.
pub fn parse_client_message(text: &str) -> Result<ClientMessage> {
    let value: Value = serde_json::from_str(text)?;
    let tag = value
        .get("msgtype")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let msg = match tag {
        "validrange" => ClientMessage::ValidRange,
        "zones" => ClientMessage::Query(QueryRequest::zones()),
        "track_vectors" => ClientMessage::Query(query(QueryKind::TrackVectors, &value)),
        "heatmap" => ClientMessage::Query(query(QueryKind::Heatmap, &value)),
        "stop" => ClientMessage::Stop,
        "ack" => ClientMessage::Ack,
        other => ClientMessage::Unknown(other.to_string()),
    };
    Ok(msg)
}

fn query(kind: QueryKind, value: &Value) -> QueryRequest {
    QueryRequest {
        kind,
        area: value.get("area").and_then(parse_area),
        start: value.get("start").and_then(parse_time),
        end: value.get("end").and_then(parse_time),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `{x0,y0,x1,y1}` or `{minX,minY,maxX,maxY}`.
fn parse_area(value: &Value) -> Option<BoundingBox> {
    let field = |short: &str, long: &str| value.get(short).or_else(|| value.get(long)).and_then(number);
    Some(BoundingBox::new(
        field("x0", "minX")?,
        field("y0", "minY")?,
        field("x1", "maxX")?,
        field("y1", "maxY")?,
    ))
}

/// Epoch seconds (or milliseconds), `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`,
/// or RFC 3339. Naive times are UTC.
pub fn parse_time(value: &Value) -> Option<i64> {
    let text = match value {
        Value::Number(n) => return n.as_f64().and_then(epoch),
        Value::String(s) => s.trim(),
        _ => return None,
    };
    if let Ok(n) = text.parse::<f64>() {
        return epoch(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// `None` for values outside the calendar range chrono can represent.
fn epoch(n: f64) -> Option<i64> {
    if !n.is_finite() {
        return None;
    }
    let secs = if n.abs() > MILLIS_THRESHOLD {
        (n / 1000.0) as i64
    } else {
        n as i64
    };
    DateTime::from_timestamp(secs, 0).map(|_| secs)
}
