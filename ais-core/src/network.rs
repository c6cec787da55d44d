//! Zone-to-zone transit edges for a vessel network graph.
//!
//! Zones are graph nodes. Each processed segment is labelled point by point
//! with the zone containing it (or none), and every run of points in one
//! zone becomes an edge towards the zone of the following run. The edge's
//! point range includes the first point of that next run, so timings and
//! distances cover the crossing itself. The last run of a segment has no
//! receiving zone.

use std::collections::BTreeMap;

use crate::geodesy::{haversine_m, knots};
use crate::processor::{TrackPoint, TrackSegment};
use crate::types::Mmsi;
use crate::zones::ZoneSet;

/// Min, mean and max of the step speeds computed from positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// One transit between graph nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitEdge {
    pub mmsi: Mmsi,
    /// Segment label within the vessel track.
    pub segment: u32,
    pub src_zone: Option<String>,
    pub rcv_zone: Option<String>,
    pub first_seen: i64,
    pub last_seen: i64,
    /// Straight-line distance between the first and last point.
    pub total_distance_m: f64,
    /// Distance along the reported path.
    pub cumulative_distance_m: f64,
    /// `None` when the edge holds a single point.
    pub velocity_knots: Option<SpeedStats>,
    pub points: usize,
}

impl TransitEdge {
    /// Minutes between first and last point; `None` for a single point.
    pub fn minutes_in_zone(&self) -> Option<f64> {
        (self.points > 1).then(|| (self.last_seen - self.first_seen) as f64 / 60.0)
    }

    /// `src_rcv` node pair, with `-` standing in for open water or the end
    /// of the segment.
    pub fn transit_nodes(&self) -> String {
        format!(
            "{}_{}",
            self.src_zone.as_deref().unwrap_or("-"),
            self.rcv_zone.as_deref().unwrap_or("-")
        )
    }

    /// Edges that leave one zone for a different one.
    pub fn is_transit(&self) -> bool {
        self.src_zone.is_some() && self.rcv_zone.is_some() && self.src_zone != self.rcv_zone
    }
}

/// Transit edges for one segment, in time order.
pub fn transit_edges(segment: &TrackSegment, zones: &ZoneSet) -> Vec<TransitEdge> {
    let points = &segment.points;
    if points.is_empty() {
        return Vec::new();
    }
    let labels: Vec<Option<&str>> = points
        .iter()
        .map(|p| zones.zone_of(p.lon, p.lat).map(|z| z.name.as_str()))
        .collect();

    // Start index of every run of equal labels.
    let mut starts = vec![0];
    starts.extend((1..labels.len()).filter(|&i| labels[i] != labels[i - 1]));

    starts
        .iter()
        .enumerate()
        .map(|(k, &start)| {
            let (end, rcv) = match starts.get(k + 1) {
                Some(&next) => (next, labels[next]),
                None => (points.len() - 1, None),
            };
            edge(segment, &points[start..=end], labels[start], rcv)
        })
        .collect()
}

fn edge(segment: &TrackSegment, run: &[TrackPoint], src: Option<&str>, rcv: Option<&str>) -> TransitEdge {
    let (first, last) = (&run[0], &run[run.len() - 1]);
    let steps: Vec<(f64, i64)> = run
        .windows(2)
        .map(|w| (haversine_m(w[0].lon, w[0].lat, w[1].lon, w[1].lat), w[1].time - w[0].time))
        .collect();

    TransitEdge {
        mmsi: segment.mmsi,
        segment: segment.label,
        src_zone: src.map(str::to_string),
        rcv_zone: rcv.map(str::to_string),
        first_seen: first.time,
        last_seen: last.time,
        total_distance_m: haversine_m(first.lon, first.lat, last.lon, last.lat),
        cumulative_distance_m: steps.iter().map(|(m, _)| m).sum(),
        velocity_knots: speed_stats(&steps),
        points: run.len(),
    }
}

/// Speeds over steps with a positive time delta; duplicate timestamps
/// carry no speed.
fn speed_stats(steps: &[(f64, i64)]) -> Option<SpeedStats> {
    let speeds: Vec<f64> = steps
        .iter()
        .filter(|(_, secs)| *secs > 0)
        .map(|&(m, secs)| knots(m, secs))
        .collect();
    if speeds.is_empty() {
        return None;
    }
    Some(SpeedStats {
        min: speeds.iter().copied().fold(f64::INFINITY, f64::min),
        avg: speeds.iter().sum::<f64>() / speeds.len() as f64,
        max: speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Count zone-to-zone transits across all edges.
pub fn transit_counts<'a>(edges: impl IntoIterator<Item = &'a TransitEdge>) -> BTreeMap<(String, String), usize> {
    let mut counts = BTreeMap::new();
    for edge in edges.into_iter().filter(|e| e.is_transit()) {
        if let (Some(src), Some(rcv)) = (&edge.src_zone, &edge.rcv_zone) {
            *counts.entry((src.clone(), rcv.clone())).or_insert(0) += 1;
        }
    }
    counts
}
