//! Separate interleaved trajectories sharing one MMSI.
//!
//! Spoofed or misconfigured transponders make two vessels report under the
//! same identity, which shows up as a track zig-zagging between distant
//! positions. The track is cut wherever consecutive points are implausible
//! (too fast or too far apart); each fragment then joins whichever existing
//! pathway it continues best, or starts a new one.

use serde::Deserialize;
use tracing::warn;

use crate::assembler::VesselTrack;
use crate::geodesy::{haversine_m, knots};
use crate::types::RawReport;

/// Pathway count above which a vessel is reported as suspicious.
const EXCESSIVE_PATHWAYS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathwayParams {
    pub distance_threshold_m: f64,
    pub speed_threshold_knots: f64,
    /// Minimum continuity score for a fragment to join a pathway.
    pub min_score: f64,
}

impl Default for PathwayParams {
    fn default() -> Self {
        PathwayParams {
            distance_threshold_m: 250_000.0,
            speed_threshold_knots: 50.0,
            min_score: 0.0,
        }
    }
}

/// Continuity score for appending `next` after `last`.
///
/// Closer and sooner scores higher; `-1` when the join would break either
/// threshold.
pub fn continuity_score(last: &RawReport, next: &RawReport, params: &PathwayParams) -> f64 {
    let dt = next.timestamp - last.timestamp;
    let dm = haversine_m(last.lon, last.lat, next.lon, next.lat);
    if dm > params.distance_threshold_m || knots(dm, dt) > params.speed_threshold_knots {
        return -1.0;
    }
    (params.distance_threshold_m / dm.max(5.0)) / (dt as f64).max(2.0)
}

/// Start index of every fragment.
fn fragment_starts(points: &[RawReport], params: &PathwayParams) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, pair) in points.windows(2).enumerate() {
        let (a, b) = (&pair[0], &pair[1]);
        let dm = haversine_m(a.lon, a.lat, b.lon, b.lat);
        if dm > params.distance_threshold_m
            || knots(dm, b.timestamp - a.timestamp) > params.speed_threshold_knots
        {
            starts.push(i + 1);
        }
    }
    starts
}

/// Split one vessel track into labelled pathways.
///
/// A clean track comes back as a single pathway with label 0.
pub fn separate_pathways(track: VesselTrack, params: &PathwayParams) -> Vec<VesselTrack> {
    if track.is_empty() {
        return Vec::new();
    }
    let mmsi = track.mmsi;
    let points = track.points;
    let mut starts = fragment_starts(&points, params);
    starts.push(points.len());

    let mut pathways: Vec<Vec<RawReport>> = Vec::new();
    let mut warned = false;
    for bounds in starts.windows(2) {
        let fragment = &points[bounds[0]..bounds[1]];
        let head = &fragment[0];

        // Highest score wins; ties go to the most recently created pathway.
        let best = pathways
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.last().map(|last| (i, continuity_score(last, head, params))))
            .fold(None, |best: Option<(usize, f64)>, (i, s)| match best {
                Some((_, bs)) if bs > s => best,
                _ => Some((i, s)),
            });

        match best {
            Some((i, score)) if score >= params.min_score => {
                pathways[i].extend_from_slice(fragment);
            }
            _ => {
                pathways.push(fragment.to_vec());
                if !warned && pathways.len() > EXCESSIVE_PATHWAYS {
                    warn!(mmsi, pathways = pathways.len(), "excessive number of pathways");
                    warned = true;
                }
            }
        }
    }

    pathways
        .into_iter()
        .enumerate()
        .map(|(label, points)| VesselTrack {
            mmsi,
            label: label as u32,
            points,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(timestamp: i64, lon: f64, lat: f64) -> RawReport {
        RawReport {
            mmsi: 316000001,
            timestamp,
            lat,
            lon,
            sog: None,
            cog: None,
            heading: None,
            rot: None,
            nav_status: None,
            msg_type: 1,
        }
    }

    fn track(points: Vec<RawReport>) -> VesselTrack {
        VesselTrack {
            mmsi: 316000001,
            label: 0,
            points,
        }
    }

    #[test]
    fn test_clean_track_single_pathway() {
        let points: Vec<RawReport> = (0..10)
            .map(|i| report(i * 60, -63.0 + i as f64 * 0.001, 44.0))
            .collect();
        let out = separate_pathways(track(points.clone()), &PathwayParams::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, 0);
        assert_eq!(out[0].points, points);
    }

    #[test]
    fn test_interleaved_vessels_separated() {
        // Two vessels 5 degrees apart alternating under one MMSI.
        let mut points = Vec::new();
        for i in 0..6 {
            let t = i * 120;
            if i % 2 == 0 {
                points.push(report(t, -63.0 + i as f64 * 0.001, 44.0));
            } else {
                points.push(report(t, -58.0 + i as f64 * 0.001, 44.0));
            }
        }
        let out = separate_pathways(track(points), &PathwayParams::default());
        assert_eq!(out.len(), 2);
        assert!(out[0].points.iter().all(|p| p.lon < -62.0));
        assert!(out[1].points.iter().all(|p| p.lon > -59.0));
        assert_eq!(out[0].len(), 3);
        assert_eq!(out[1].len(), 3);
        assert_eq!(out[1].label, 1);
    }

    #[test]
    fn test_score_infeasible() {
        let a = report(0, -63.0, 44.0);
        let b = report(10, -60.0, 44.0);
        assert_eq!(continuity_score(&a, &b, &PathwayParams::default()), -1.0);
    }

    #[test]
    fn test_score_prefers_closer() {
        let params = PathwayParams::default();
        let last = report(0, -63.0, 44.0);
        let near = report(600, -63.01, 44.0);
        let far = report(600, -63.05, 44.0);
        assert!(continuity_score(&last, &near, &params) > continuity_score(&last, &far, &params));
    }

    #[test]
    fn test_empty_track() {
        assert!(separate_pathways(track(Vec::new()), &PathwayParams::default()).is_empty());
    }
}
