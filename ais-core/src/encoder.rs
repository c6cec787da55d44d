//! Server-to-client message encoding.
//!
//! Every message is a JSON object carrying the dispatch tag twice, as
//! `msgtype` and as `type`, so both client generations can route it.
//! [`decode_response`] is the exact inverse of [`encode`]: derived zone
//! fields (centroid, bounds, radius) are recomputed from the ring rather
//! than trusted from the wire.
//!
//! Wire shapes:
//! - `validrange`: `start`, `end` (epoch seconds)
//! - `zone`: `x`, `y` ring coordinates, empty `t`, `meta {name, maxradius}`
//! - `track_vector`: parallel `x`, `y`, `t`, `sog`, `cog` arrays, `zones`
//!   visited, and a string-valued `meta` map
//! - `heatmap`: `xy` pairs
//! - `done`: `status` text and an `outcome` of complete / cancelled / error
//! - `doneZones`: no body

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::processor::{TrackPoint, TrackSegment};
use crate::types::{ship_type_text, AisError, Mmsi, QueryKind, Result, VesselMetadata};
use crate::zones::{ZonePolygon, ZoneSet};

pub const TAG_VALID_RANGE: &str = "validrange";
pub const TAG_ZONE: &str = "zone";
pub const TAG_TRACK_VECTOR: &str = "track_vector";
pub const TAG_HEATMAP: &str = "heatmap";
pub const TAG_DONE: &str = "done";
pub const TAG_DONE_ZONES: &str = "doneZones";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One processed segment with its display metadata.
///
/// `metadata.mmsi` is expected to equal `segment.mmsi`; the wire carries a
/// single MMSI for both.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackVector {
    pub segment: TrackSegment,
    pub metadata: VesselMetadata,
    /// Zones visited, in order of first visit.
    pub zones: Vec<String>,
}

/// How a query stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Complete,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    ValidRange { start: i64, end: i64 },
    Zone(ZonePolygon),
    TrackVector(TrackVector),
    Heatmap { xy: Vec<[f64; 2]> },
    Done { outcome: Outcome, status: String },
    DoneZones,
}

impl ServerMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            ServerMessage::ValidRange { .. } => TAG_VALID_RANGE,
            ServerMessage::Zone(_) => TAG_ZONE,
            ServerMessage::TrackVector(_) => TAG_TRACK_VECTOR,
            ServerMessage::Heatmap { .. } => TAG_HEATMAP,
            ServerMessage::Done { .. } => TAG_DONE,
            ServerMessage::DoneZones => TAG_DONE_ZONES,
        }
    }

    /// Result payloads count against the client's ack window; terminal and
    /// informational messages do not.
    pub fn is_result(&self) -> bool {
        matches!(
            self,
            ServerMessage::Zone(_) | ServerMessage::TrackVector(_) | ServerMessage::Heatmap { .. }
        )
    }

    /// Terminal message of a query stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerMessage::Done { .. } | ServerMessage::DoneZones)
    }

    pub fn done(status: impl Into<String>) -> Self {
        ServerMessage::Done {
            outcome: Outcome::Complete,
            status: status.into(),
        }
    }

    pub fn cancelled(status: impl Into<String>) -> Self {
        ServerMessage::Done {
            outcome: Outcome::Cancelled,
            status: status.into(),
        }
    }

    pub fn error(status: impl Into<String>) -> Self {
        ServerMessage::Done {
            outcome: Outcome::Error,
            status: status.into(),
        }
    }
}

/// Build the result messages for one vessel's segments.
///
/// Track queries yield one `track_vector` per segment; heatmap queries yield
/// a single `heatmap` message with every point of every segment.
pub fn messages_for(
    segments: &[TrackSegment],
    metadata: &VesselMetadata,
    kind: QueryKind,
    zones: &ZoneSet,
) -> Vec<ServerMessage> {
    match kind {
        QueryKind::TrackVectors => segments
            .iter()
            .map(|seg| {
                ServerMessage::TrackVector(TrackVector {
                    zones: zones.zones_visited(seg.points.iter().map(|p| (p.lon, p.lat))),
                    segment: seg.clone(),
                    metadata: metadata.clone(),
                })
            })
            .collect(),
        QueryKind::Heatmap => {
            let xy: Vec<[f64; 2]> = segments
                .iter()
                .flat_map(|s| s.points.iter().map(|p| [p.lon, p.lat]))
                .collect();
            if xy.is_empty() {
                Vec::new()
            } else {
                vec![ServerMessage::Heatmap { xy }]
            }
        }
        QueryKind::Zones => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Wire bodies
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct RangeBody {
    start: i64,
    end: i64,
}

#[derive(Serialize, Deserialize)]
struct ZoneMeta {
    name: String,
    maxradius: f64,
}

#[derive(Serialize, Deserialize)]
struct ZoneBody {
    x: Vec<f64>,
    y: Vec<f64>,
    t: Vec<i64>,
    meta: ZoneMeta,
}

#[derive(Serialize, Deserialize)]
struct TrackBody {
    x: Vec<f64>,
    y: Vec<f64>,
    t: Vec<i64>,
    sog: Vec<Option<f64>>,
    cog: Vec<Option<f64>>,
    #[serde(default)]
    zones: Vec<String>,
    meta: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct HeatmapBody {
    xy: Vec<[f64; 2]>,
}

#[derive(Serialize, Deserialize)]
struct DoneBody {
    status: String,
    #[serde(default = "complete")]
    outcome: Outcome,
}

fn complete() -> Outcome {
    Outcome::Complete
}

fn track_body(v: &TrackVector) -> TrackBody {
    let points = &v.segment.points;
    let meta = &v.metadata;
    let mut map = BTreeMap::new();
    map.insert("mmsi".to_string(), v.segment.mmsi.to_string());
    map.insert("label".to_string(), v.segment.label.to_string());
    map.insert("segment".to_string(), v.segment.index.to_string());
    if let Some(name) = &meta.name {
        map.insert("name".to_string(), name.clone());
    }
    if let Some(imo) = meta.imo {
        map.insert("imo".to_string(), imo.to_string());
    }
    if let Some(callsign) = &meta.callsign {
        map.insert("callsign".to_string(), callsign.clone());
    }
    if let Some(flag) = &meta.flag {
        map.insert("flag".to_string(), flag.clone());
    }
    if let Some(code) = meta.vessel_type {
        map.insert("vessel_type".to_string(), code.to_string());
        if let Some(text) = ship_type_text(code) {
            map.insert("vesseltype_generic".to_string(), text.to_string());
        }
    }
    TrackBody {
        x: points.iter().map(|p| p.lon).collect(),
        y: points.iter().map(|p| p.lat).collect(),
        t: points.iter().map(|p| p.time).collect(),
        sog: points.iter().map(|p| p.sog).collect(),
        cog: points.iter().map(|p| p.cog).collect(),
        zones: v.zones.clone(),
        meta: map,
    }
}

fn parse_meta<T: std::str::FromStr>(meta: &BTreeMap<String, String>, key: &str) -> Result<Option<T>> {
    match meta.get(key) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| wire_error(format!("meta.{key}: invalid value {s:?}"))),
    }
}

fn wire_error(msg: impl std::fmt::Display) -> AisError {
    AisError::Protocol(serde_json::Error::custom(msg))
}

fn track_from_body(body: TrackBody) -> Result<TrackVector> {
    let n = body.x.len();
    if [body.y.len(), body.t.len(), body.sog.len(), body.cog.len()]
        .iter()
        .any(|&len| len != n)
    {
        return Err(wire_error("track_vector arrays differ in length"));
    }
    let mmsi: Mmsi = parse_meta(&body.meta, "mmsi")?.ok_or_else(|| wire_error("meta.mmsi missing"))?;
    let points = (0..n)
        .map(|i| TrackPoint {
            time: body.t[i],
            lon: body.x[i],
            lat: body.y[i],
            sog: body.sog[i],
            cog: body.cog[i],
        })
        .collect();
    Ok(TrackVector {
        segment: TrackSegment {
            mmsi,
            label: parse_meta(&body.meta, "label")?.unwrap_or(0),
            index: parse_meta(&body.meta, "segment")?.unwrap_or(0),
            points,
        },
        metadata: VesselMetadata {
            mmsi,
            name: body.meta.get("name").cloned(),
            imo: parse_meta(&body.meta, "imo")?,
            callsign: body.meta.get("callsign").cloned(),
            flag: body.meta.get("flag").cloned(),
            vessel_type: parse_meta(&body.meta, "vessel_type")?,
        },
        zones: body.zones,
    })
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

fn body_value(msg: &ServerMessage) -> serde_json::Result<Value> {
    match msg {
        ServerMessage::ValidRange { start, end } => serde_json::to_value(RangeBody {
            start: *start,
            end: *end,
        }),
        ServerMessage::Zone(zone) => serde_json::to_value(ZoneBody {
            x: zone.ring.iter().map(|v| v[0]).collect(),
            y: zone.ring.iter().map(|v| v[1]).collect(),
            t: Vec::new(),
            meta: ZoneMeta {
                name: zone.name.clone(),
                maxradius: zone.max_radius,
            },
        }),
        ServerMessage::TrackVector(v) => serde_json::to_value(track_body(v)),
        ServerMessage::Heatmap { xy } => serde_json::to_value(HeatmapBody { xy: xy.clone() }),
        ServerMessage::Done { outcome, status } => serde_json::to_value(DoneBody {
            status: status.clone(),
            outcome: *outcome,
        }),
        ServerMessage::DoneZones => Ok(json!({})),
    }
}

/// Encode one message to its wire bytes.
pub fn encode(msg: &ServerMessage) -> Vec<u8> {
    let mut object = match body_value(msg) {
        Ok(Value::Object(map)) => map,
        // Bodies are plain structs of numbers and strings.
        _ => Map::new(),
    };
    let tag = Value::String(msg.tag().to_string());
    object.insert("msgtype".to_string(), tag.clone());
    object.insert("type".to_string(), tag);
    serde_json::to_vec(&Value::Object(object)).unwrap_or_default()
}

/// Decode wire bytes produced by [`encode`].
///
/// Accepts either `msgtype` or `type` as the discriminator.
pub fn decode_response(bytes: &[u8]) -> Result<ServerMessage> {
    let value: Value = serde_json::from_slice(bytes)?;
    let tag = value
        .get("msgtype")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| wire_error("message has no msgtype"))?
        .to_string();

    let msg = match tag.as_str() {
        TAG_VALID_RANGE => {
            let body: RangeBody = serde_json::from_value(value)?;
            ServerMessage::ValidRange {
                start: body.start,
                end: body.end,
            }
        }
        TAG_ZONE => {
            let body: ZoneBody = serde_json::from_value(value)?;
            if body.x.len() != body.y.len() {
                return Err(wire_error("zone arrays differ in length"));
            }
            let ring = body.x.iter().zip(&body.y).map(|(&x, &y)| [x, y]).collect();
            ServerMessage::Zone(ZonePolygon::new(body.meta.name, ring)?)
        }
        TAG_TRACK_VECTOR => {
            let body: TrackBody = serde_json::from_value(value)?;
            ServerMessage::TrackVector(track_from_body(body)?)
        }
        TAG_HEATMAP => {
            let body: HeatmapBody = serde_json::from_value(value)?;
            ServerMessage::Heatmap { xy: body.xy }
        }
        TAG_DONE => {
            let body: DoneBody = serde_json::from_value(value)?;
            ServerMessage::Done {
                outcome: body.outcome,
                status: body.status,
            }
        }
        TAG_DONE_ZONES => ServerMessage::DoneZones,
        other => return Err(wire_error(format!("unknown msgtype {other:?}"))),
    };
    Ok(msg)
}

/// GeoJSON `Feature` with a `LineString` geometry for a track vector or
/// zone; `None` for other messages.
pub fn to_geojson(msg: &ServerMessage) -> Option<Value> {
    let (coordinates, properties): (Vec<[f64; 2]>, Value) = match msg {
        ServerMessage::TrackVector(v) => (
            v.segment.points.iter().map(|p| [p.lon, p.lat]).collect(),
            serde_json::to_value(track_body(v).meta).ok()?,
        ),
        ServerMessage::Zone(zone) => (
            zone.ring.clone(),
            json!({ "name": zone.name, "maxradius": zone.max_radius }),
        ),
        _ => return None,
    };
    Some(json!({
        "type": "Feature",
        "geometry": { "type": "LineString", "coordinates": coordinates },
        "properties": properties,
    }))
}
