//! Track processing: segmentation, merge, interpolation, simplification.
//!
//! A vessel track is cut into segments wherever consecutive points are more
//! than `max_time_gap_secs` apart, imply more than `max_speed_knots`, or
//! (optionally) jump more than `max_distance_m`. Neighbouring segments are
//! then rejoined when the gap between them is within the tighter merge
//! thresholds. Merge thresholds sit strictly below the split thresholds, so
//! a boundary is either always split or always merged and reprocessing the
//! output reproduces the same boundaries.
//!
//! Interpolation runs in Web Mercator metres; simplification is
//! Douglas-Peucker in a local metric frame with endpoints kept exactly and
//! crossings that the original path did not have repaired.

use serde::Deserialize;

use crate::assembler::VesselTrack;
use crate::geodesy::{
    haversine_m, inverse_mercator, knots, mercator, normalize_lon, unwrap_lon, LocalFrame,
};
use crate::types::{AisError, Mmsi, RawReport, Result};

use geo::{Intersects, Line, LineString};
use tracing::debug;

/// Simplification passes before giving up on reaching the point budget.
const MAX_TOLERANCE_DOUBLINGS: u32 = 8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One point of a processed segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub time: i64,
    pub lon: f64,
    pub lat: f64,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
}

impl From<&RawReport> for TrackPoint {
    fn from(r: &RawReport) -> Self {
        TrackPoint {
            time: r.timestamp,
            lon: r.lon,
            lat: r.lat,
            sog: r.sog,
            cog: r.cog,
        }
    }
}

/// A contiguous run of a vessel track. Segments of one vessel pathway are
/// time-disjoint and numbered in time order by `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSegment {
    pub mmsi: Mmsi,
    pub label: u32,
    pub index: u32,
    pub points: Vec<TrackPoint>,
}

impl TrackSegment {
    pub fn start(&self) -> Option<i64> {
        self.points.first().map(|p| p.time)
    }

    pub fn end(&self) -> Option<i64> {
        self.points.last().map(|p| p.time)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    pub max_time_gap_secs: i64,
    pub max_speed_knots: f64,
    pub max_distance_m: Option<f64>,
    pub merge_time_gap_secs: i64,
    pub merge_speed_knots: f64,
    /// Resample to this step when set.
    pub interpolate_secs: Option<i64>,
    pub simplify: bool,
    /// Segments longer than this are simplified toward this many points.
    pub simplify_threshold: usize,
    pub simplify_tolerance_m: f64,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        ProcessingOptions {
            max_time_gap_secs: 24 * 3600,
            max_speed_knots: 50.0,
            max_distance_m: None,
            merge_time_gap_secs: 3600,
            merge_speed_knots: 40.0,
            interpolate_secs: None,
            simplify: true,
            simplify_threshold: 150,
            simplify_tolerance_m: 25.0,
        }
    }
}

impl ProcessingOptions {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(AisError::InvalidConfig(msg));
        if self.max_time_gap_secs <= 0 {
            return fail("max_time_gap_secs must be positive".into());
        }
        if self.merge_time_gap_secs < 0 || self.merge_time_gap_secs >= self.max_time_gap_secs {
            return fail(format!(
                "merge_time_gap_secs ({}) must be below max_time_gap_secs ({})",
                self.merge_time_gap_secs, self.max_time_gap_secs
            ));
        }
        if !(self.merge_speed_knots >= 0.0 && self.merge_speed_knots < self.max_speed_knots) {
            return fail(format!(
                "merge_speed_knots ({}) must be below max_speed_knots ({})",
                self.merge_speed_knots, self.max_speed_knots
            ));
        }
        if matches!(self.max_distance_m, Some(d) if d <= 0.0) {
            return fail("max_distance_m must be positive".into());
        }
        if matches!(self.interpolate_secs, Some(s) if s <= 0) {
            return fail("interpolate_secs must be positive".into());
        }
        if self.simplify && (self.simplify_threshold < 2 || self.simplify_tolerance_m < 0.0) {
            return fail("simplify_threshold must be at least 2 with a non-negative tolerance".into());
        }
        Ok(())
    }

    fn breaks(&self, a: &TrackPoint, b: &TrackPoint) -> bool {
        let dt = b.time - a.time;
        let dm = haversine_m(a.lon, a.lat, b.lon, b.lat);
        dt > self.max_time_gap_secs
            || knots(dm, dt) > self.max_speed_knots
            || self.max_distance_m.is_some_and(|max| dm > max)
    }

    fn joins(&self, a: &TrackPoint, b: &TrackPoint) -> bool {
        let dt = b.time - a.time;
        let dm = haversine_m(a.lon, a.lat, b.lon, b.lat);
        dt > 0
            && dt <= self.merge_time_gap_secs
            && knots(dm, dt) <= self.merge_speed_knots
            && self.max_distance_m.map_or(true, |max| dm <= max)
    }
}

// ---------------------------------------------------------------------------
// Segmentation and merge
// ---------------------------------------------------------------------------

/// Split points wherever consecutive points break the thresholds.
fn split_points(points: Vec<TrackPoint>, opts: &ProcessingOptions) -> Vec<Vec<TrackPoint>> {
    let mut out: Vec<Vec<TrackPoint>> = Vec::new();
    let mut current: Vec<TrackPoint> = Vec::new();
    for p in points {
        if let Some(prev) = current.last() {
            if opts.breaks(prev, &p) {
                out.push(std::mem::take(&mut current));
            }
        }
        current.push(p);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Rejoin neighbouring pieces whose gap is within the merge thresholds.
fn merge_pieces(pieces: Vec<Vec<TrackPoint>>, opts: &ProcessingOptions) -> Vec<Vec<TrackPoint>> {
    let mut out: Vec<Vec<TrackPoint>> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let joinable = match (out.last().and_then(|p| p.last()), piece.first()) {
            (Some(a), Some(b)) => opts.joins(a, b),
            _ => false,
        };
        match out.last_mut() {
            Some(prev) if joinable => prev.extend(piece),
            _ => out.push(piece),
        }
    }
    out
}

/// Recompute segment boundaries for any set of segments.
///
/// Segments are grouped by (MMSI, label) and ordered by start time; each is
/// split where needed and adjacent pieces are merged across old boundaries.
/// No interpolation or simplification is applied.
pub fn resegment(segments: Vec<TrackSegment>, opts: &ProcessingOptions) -> Vec<TrackSegment> {
    let mut segments: Vec<TrackSegment> = segments.into_iter().filter(|s| !s.is_empty()).collect();
    segments.sort_by_key(|s| (s.mmsi, s.label, s.start()));

    let mut out = Vec::new();
    let mut i = 0;
    while i < segments.len() {
        let (mmsi, label) = (segments[i].mmsi, segments[i].label);
        let mut pieces = Vec::new();
        while i < segments.len() && segments[i].mmsi == mmsi && segments[i].label == label {
            pieces.extend(split_points(std::mem::take(&mut segments[i].points), opts));
            i += 1;
        }
        for (index, points) in merge_pieces(pieces, opts).into_iter().enumerate() {
            out.push(TrackSegment {
                mmsi,
                label,
                index: index as u32,
                points,
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

fn lerp_point(a: &TrackPoint, b: &TrackPoint, time: i64) -> TrackPoint {
    if time <= a.time {
        return *a;
    }
    if time >= b.time {
        return *b;
    }
    let f = (time - a.time) as f64 / (b.time - a.time) as f64;
    let (ax, ay) = mercator(a.lon, a.lat);
    let (bx, by) = mercator(unwrap_lon(a.lon, b.lon), b.lat);
    let (lon, lat) = inverse_mercator(ax + (bx - ax) * f, ay + (by - ay) * f);
    TrackPoint {
        time,
        lon: normalize_lon(lon),
        lat,
        sog: match (a.sog, b.sog) {
            (Some(s0), Some(s1)) => Some(s0 + (s1 - s0) * f),
            (s0, s1) => s0.or(s1),
        },
        cog: if f < 0.5 { a.cog } else { b.cog },
    }
}

/// Resample to a uniform time step.
///
/// Output starts at the first point, steps by `step_secs`, and ends with the
/// last point; no point lies outside the original time span.
pub fn interpolate(points: &[TrackPoint], step_secs: i64) -> Vec<TrackPoint> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    if points.len() < 2 || step_secs <= 0 {
        return points.to_vec();
    }

    let mut out = Vec::with_capacity(((last.time - first.time) / step_secs + 2) as usize);
    let mut j = 0;
    let mut t = first.time;
    while t < last.time {
        while j + 1 < points.len() - 1 && points[j + 1].time <= t {
            j += 1;
        }
        out.push(lerp_point(&points[j], &points[j + 1], t));
        t += step_secs;
    }
    out.push(*last);
    out
}

// ---------------------------------------------------------------------------
// Simplification
// ---------------------------------------------------------------------------

/// Perpendicular distance from `p` to the segment `a`-`b`.
fn segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return ((p.0 - a.0).powi(2) + (p.1 - a.1).powi(2)).sqrt();
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0);
    ((p.0 - a.0 - t * dx).powi(2) + (p.1 - a.1 - t * dy).powi(2)).sqrt()
}

/// Index of the interior point farthest from the chord `s`-`e`.
fn farthest(xy: &[(f64, f64)], s: usize, e: usize) -> Option<(usize, f64)> {
    (s + 1..e)
        .map(|i| (i, segment_distance(xy[i], xy[s], xy[e])))
        .fold(None, |best, (i, d)| match best {
            Some((_, bd)) if bd >= d => best,
            _ => Some((i, d)),
        })
}

/// Douglas-Peucker keep mask. A chord is also refined while it spans more
/// than `max_chord_secs` or `max_chord_m`.
fn douglas_peucker(
    xy: &[(f64, f64)],
    points: &[TrackPoint],
    tolerance_m: f64,
    max_chord_secs: i64,
    max_chord_m: Option<f64>,
) -> Vec<bool> {
    let n = xy.len();
    let mut keep = vec![false; n];
    if n == 0 {
        return keep;
    }
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0, n - 1)];
    while let Some((s, e)) = stack.pop() {
        let Some((idx, dist)) = farthest(xy, s, e) else {
            continue;
        };
        let (a, b) = (&points[s], &points[e]);
        let forced = b.time - a.time > max_chord_secs
            || max_chord_m.is_some_and(|max| haversine_m(a.lon, a.lat, b.lon, b.lat) > max);
        let split = if dist > tolerance_m {
            idx
        } else if forced {
            (s + e) / 2
        } else {
            continue;
        };
        keep[split] = true;
        stack.push((s, split));
        stack.push((split, e));
    }
    keep
}

fn kept_indices(keep: &[bool]) -> Vec<usize> {
    keep.iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect()
}

fn sub_path(xy: &[(f64, f64)], from: usize, to: usize) -> LineString<f64> {
    LineString::from(xy[from..=to].to_vec())
}

/// Add points back until no pair of simplified edges crosses where the
/// original sub-paths did not. Returns false if no further point could be
/// added to resolve a crossing.
fn repair_crossings(xy: &[(f64, f64)], keep: &mut [bool]) -> bool {
    'search: loop {
        let kept = kept_indices(keep);
        let edges: Vec<(usize, usize)> = kept.windows(2).map(|w| (w[0], w[1])).collect();
        for i in 0..edges.len() {
            let (a0, a1) = edges[i];
            let line_a = Line::new(xy[a0], xy[a1]);
            for &(b0, b1) in edges.iter().skip(i + 2) {
                // A closed path meets itself at the shared endpoint.
                if xy[a0] == xy[b1] || xy[a1] == xy[b0] {
                    continue;
                }
                if !line_a.intersects(&Line::new(xy[b0], xy[b1])) {
                    continue;
                }
                if sub_path(xy, a0, a1).intersects(&sub_path(xy, b0, b1)) {
                    continue;
                }
                let mut added = false;
                for (s, e) in [(a0, a1), (b0, b1)] {
                    if let Some((idx, _)) = farthest(xy, s, e) {
                        keep[idx] = true;
                        added = true;
                    }
                }
                if !added {
                    return false;
                }
                continue 'search;
            }
        }
        return true;
    }
}

/// Simplify a point run, keeping both endpoints exactly.
///
/// Tolerance doubles until at most `max_points` remain or the chord limits
/// stop further reduction. `max_points` is a target, not a hard cap: chord
/// limits and crossing repair take precedence and may keep more. If a
/// crossing cannot be repaired the input is returned unchanged.
pub fn simplify(
    points: &[TrackPoint],
    tolerance_m: f64,
    max_points: usize,
    max_chord_secs: i64,
    max_chord_m: Option<f64>,
) -> Vec<TrackPoint> {
    if points.len() <= 2 || points.len() <= max_points {
        return points.to_vec();
    }
    let mean_lat = points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64;
    let frame = LocalFrame::new(points[0].lon, mean_lat);
    let xy: Vec<(f64, f64)> = points.iter().map(|p| frame.project(p.lon, p.lat)).collect();

    let mut tolerance = tolerance_m.max(f64::EPSILON);
    let mut keep = douglas_peucker(&xy, points, tolerance, max_chord_secs, max_chord_m);
    for _ in 0..MAX_TOLERANCE_DOUBLINGS {
        if keep.iter().filter(|&&k| k).count() <= max_points {
            break;
        }
        tolerance *= 2.0;
        keep = douglas_peucker(&xy, points, tolerance, max_chord_secs, max_chord_m);
    }

    if !repair_crossings(&xy, &mut keep) {
        debug!(
            points = points.len(),
            max_points,
            "crossing repair failed, track left unsimplified"
        );
        return points.to_vec();
    }
    let kept = kept_indices(&keep);
    if kept.len() > max_points {
        debug!(
            points = points.len(),
            kept = kept.len(),
            max_points,
            tolerance_m = tolerance,
            "simplified track still above point budget"
        );
    }
    kept.into_iter().map(|i| points[i]).collect()
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn finish(segments: Vec<TrackSegment>, opts: &ProcessingOptions) -> Vec<TrackSegment> {
    segments
        .into_iter()
        .map(|mut seg| {
            if let Some(step) = opts.interpolate_secs {
                seg.points = interpolate(&seg.points, step);
            }
            if opts.simplify {
                seg.points = simplify(
                    &seg.points,
                    opts.simplify_tolerance_m,
                    opts.simplify_threshold,
                    opts.max_time_gap_secs,
                    opts.max_distance_m,
                );
            }
            seg
        })
        .collect()
}

/// Segment, merge, and optionally resample and simplify one vessel track.
pub fn process(track: &VesselTrack, opts: &ProcessingOptions) -> Vec<TrackSegment> {
    if track.is_empty() {
        return Vec::new();
    }
    let whole = TrackSegment {
        mmsi: track.mmsi,
        label: track.label,
        index: 0,
        points: track.points.iter().map(TrackPoint::from).collect(),
    };
    finish(resegment(vec![whole], opts), opts)
}

/// Run already-processed segments through the pipeline again.
pub fn reprocess(segments: &[TrackSegment], opts: &ProcessingOptions) -> Vec<TrackSegment> {
    finish(resegment(segments.to_vec(), opts), opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3600;

    fn pt(time: i64, lon: f64, lat: f64) -> TrackPoint {
        TrackPoint {
            time,
            lon,
            lat,
            sog: None,
            cog: None,
        }
    }

    fn report(time: i64, lon: f64, lat: f64) -> RawReport {
        RawReport {
            mmsi: 316000001,
            timestamp: time,
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

    fn segment(index: u32, points: Vec<TrackPoint>) -> TrackSegment {
        TrackSegment {
            mmsi: 316000001,
            label: 0,
            index,
            points,
        }
    }

    fn bounds(segments: &[TrackSegment]) -> Vec<(Option<i64>, Option<i64>)> {
        segments.iter().map(|s| (s.start(), s.end())).collect()
    }

    fn plain() -> ProcessingOptions {
        ProcessingOptions {
            simplify: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_split_on_time_gap() {
        let hours = [0, 1, 2, 100, 101, 102];
        let t = track(
            hours
                .iter()
                .enumerate()
                .map(|(i, h)| report(h * HOUR, -63.0 + i as f64 * 0.01, 44.0))
                .collect(),
        );
        let segs = process(&t, &plain());
        assert_eq!(segs.len(), 2);
        let times: Vec<Vec<i64>> = segs
            .iter()
            .map(|s| s.points.iter().map(|p| p.time / HOUR).collect())
            .collect();
        assert_eq!(times, vec![vec![0, 1, 2], vec![100, 101, 102]]);
        assert_eq!(segs[0].index, 0);
        assert_eq!(segs[1].index, 1);
    }

    #[test]
    fn test_no_split_single_segment() {
        let t = track((0..5).map(|i| report(i * 600, -63.0 + i as f64 * 0.01, 44.0)).collect());
        assert_eq!(process(&t, &plain()).len(), 1);
    }

    #[test]
    fn test_split_on_speed() {
        // 0.01 deg per 10 min is ~3 kn; then a 2 degree jump in 10 min.
        let t = track(vec![
            report(0, -63.0, 44.0),
            report(600, -63.01, 44.0),
            report(1200, -61.0, 44.0),
            report(1800, -61.01, 44.0),
        ]);
        let segs = process(&t, &plain());
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].start(), Some(1200));
    }

    #[test]
    fn test_split_on_distance() {
        let opts = ProcessingOptions {
            max_distance_m: Some(1_000.0),
            ..plain()
        };
        let t = track(vec![
            report(0, -63.0, 44.0),
            report(HOUR, -62.95, 44.0),
            report(2 * HOUR, -62.9499, 44.0),
        ]);
        assert_eq!(process(&t, &opts).len(), 2);
    }

    #[test]
    fn test_merge_below_merge_threshold() {
        let opts = plain();
        let segs = vec![
            segment(0, vec![pt(0, -63.0, 44.0), pt(600, -63.001, 44.0)]),
            segment(1, vec![pt(600 + 1800, -63.002, 44.0), pt(3000, -63.003, 44.0)]),
        ];
        let out = reprocess(&segs, &opts);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 4);
    }

    #[test]
    fn test_gap_between_thresholds_is_stable() {
        let opts = plain();
        let gap = 5 * HOUR;
        let segs = vec![
            segment(0, vec![pt(0, -63.0, 44.0), pt(600, -63.001, 44.0)]),
            segment(1, vec![pt(600 + gap, -63.002, 44.0), pt(1200 + gap, -63.003, 44.0)]),
        ];
        let once = reprocess(&segs, &opts);
        assert_eq!(once.len(), 2);
        let twice = reprocess(&once, &opts);
        assert_eq!(bounds(&once), bounds(&twice));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_zero_gap_not_merged() {
        let segs = vec![
            segment(0, vec![pt(0, -63.0, 44.0), pt(600, -63.001, 44.0)]),
            segment(1, vec![pt(600, -63.001, 44.0), pt(1200, -63.002, 44.0)]),
        ];
        assert_eq!(reprocess(&segs, &plain()).len(), 2);
    }

    #[test]
    fn test_reprocess_idempotent_boundaries() {
        let opts = ProcessingOptions {
            interpolate_secs: Some(300),
            simplify_threshold: 10,
            ..Default::default()
        };
        let mut points = Vec::new();
        let mut t = 0;
        for leg in 0..4 {
            for i in 0..40 {
                points.push(report(t, -63.0 + i as f64 * 0.002 + leg as f64 * 0.1, 44.0 + (i as f64 * 0.3).sin() * 0.01));
                t += 400;
            }
            // alternate gaps: one beyond split, one inside the hysteresis band
            t += if leg % 2 == 0 { 30 * HOUR } else { 3 * HOUR };
        }
        let first = process(&track(points), &opts);
        let second = reprocess(&first, &opts);
        let third = reprocess(&second, &opts);
        assert_eq!(bounds(&first), bounds(&second));
        assert_eq!(bounds(&second), bounds(&third));
    }

    #[test]
    fn test_interpolate_uniform_no_extrapolation() {
        let points = vec![pt(0, 0.0, 0.0), pt(1000, 1.0, 0.0), pt(2500, 1.0, 1.0)];
        let out = interpolate(&points, 300);
        assert_eq!(out.first(), points.first());
        assert_eq!(out.last(), points.last());
        assert!(out.iter().all(|p| p.time >= 0 && p.time <= 2500));
        for w in out.windows(2).take(out.len() - 2) {
            assert_eq!(w[1].time - w[0].time, 300);
        }
    }

    #[test]
    fn test_interpolate_midpoint_equator() {
        let points = vec![pt(0, 0.0, 0.0), pt(100, 1.0, 0.0)];
        let out = interpolate(&points, 50);
        assert_eq!(out.len(), 3);
        assert!((out[1].lon - 0.5).abs() < 1e-9);
        assert!(out[1].lat.abs() < 1e-9);
    }

    #[test]
    fn test_interpolate_projected_not_degrees() {
        // Mercator midpoint in latitude sits poleward of the degree midpoint.
        let points = vec![pt(0, 0.0, 60.0), pt(100, 0.0, 70.0)];
        let out = interpolate(&points, 50);
        assert!(out[1].lat > 65.0);
    }

    #[test]
    fn test_interpolate_across_antimeridian() {
        let points = vec![pt(0, 179.5, 0.0), pt(100, -179.5, 0.0)];
        let out = interpolate(&points, 50);
        assert!((out[1].lon.abs() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolate_single_point() {
        let points = vec![pt(5, 1.0, 1.0)];
        assert_eq!(interpolate(&points, 60), points);
    }

    #[test]
    fn test_simplify_straight_line() {
        let points: Vec<TrackPoint> = (0..300).map(|i| pt(i * 60, -63.0 + i as f64 * 0.001, 44.0)).collect();
        let out = simplify(&points, 10.0, 150, 24 * HOUR, None);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], points[0]);
        assert_eq!(out[1], points[299]);
    }

    #[test]
    fn test_simplify_respects_chord_span() {
        let points: Vec<TrackPoint> = (0..200).map(|i| pt(i * HOUR, -63.0 + i as f64 * 0.001, 44.0)).collect();
        let out = simplify(&points, 10.0, 20, 24 * HOUR, None);
        assert!(out.len() < points.len());
        assert!(out.windows(2).all(|w| w[1].time - w[0].time <= 24 * HOUR));
        assert_eq!(out.first(), points.first());
        assert_eq!(out.last(), points.last());
    }

    #[test]
    fn test_simplify_chord_limit_overrides_budget() {
        // 200 hourly points with a 24h chord cap cannot fit in 2 vertices.
        let points: Vec<TrackPoint> = (0..200).map(|i| pt(i * HOUR, -63.0 + i as f64 * 0.001, 44.0)).collect();
        let out = simplify(&points, 10.0, 2, 24 * HOUR, None);
        assert!(out.len() > 2);
        assert!(out.len() >= (199 / 24) + 1);
        assert!(out.len() < points.len());
        assert!(out.windows(2).all(|w| w[1].time - w[0].time <= 24 * HOUR));
        assert_eq!(out.first(), points.first());
        assert_eq!(out.last(), points.last());
    }

    #[test]
    fn test_simplify_short_untouched() {
        let points: Vec<TrackPoint> = (0..10).map(|i| pt(i, 0.0, i as f64 * 0.1)).collect();
        assert_eq!(simplify(&points, 1000.0, 150, HOUR, None), points);
    }

    #[test]
    fn test_repair_crossing() {
        // Dropping the dip at 1 makes chord 0-2 cross edge 3-4.
        let xy = vec![
            (0.0, 0.0),
            (50.0, -10.0),
            (100.0, 0.0),
            (100.0, 10.0),
            (50.0, -5.0),
            (0.0, 10.0),
        ];
        let mut keep = vec![true, false, true, true, true, true];
        assert!(repair_crossings(&xy, &mut keep));
        assert!(keep[1]);
    }

    #[test]
    fn test_repair_keeps_original_crossings() {
        // A figure-eight crosses itself; the simplified form may too.
        let xy = vec![(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)];
        let mut keep = vec![true, true, true, true];
        assert!(repair_crossings(&xy, &mut keep));
        assert_eq!(keep, vec![true, true, true, true]);
    }

    #[test]
    fn test_validate_rejects_inverted_hysteresis() {
        let opts = ProcessingOptions {
            merge_time_gap_secs: 48 * HOUR,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        let opts = ProcessingOptions {
            merge_speed_knots: 60.0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        assert!(ProcessingOptions::default().validate().is_ok());
    }

    #[test]
    fn test_empty_track() {
        assert!(process(&track(Vec::new()), &plain()).is_empty());
    }
}
