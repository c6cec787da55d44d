//! Per-vessel track assembly from decoded position reports.
//!
//! Pure logic: no I/O, no database. Reports are buffered per MMSI and
//! finalized into a [`VesselTrack`] once the caller knows a vessel is
//! complete (storage yields rows grouped by MMSI, so every MMSI below the
//! current one is done).
//!
//! Finalizing a vessel:
//! - stable sort by timestamp (replays and multiple receivers arrive out of
//!   order)
//! - drop later reports sharing a timestamp with an earlier one; the
//!   first-seen report wins
//! - drop reports whose implied speed from the previous accepted point
//!   exceeds the teleport threshold

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::geodesy::{haversine_m, knots};
use crate::types::{Mmsi, QueryWindow, RawReport};

/// Default teleport threshold, knots. Fast ferries and patrol craft exceed
/// 40 kn; nothing on the water sustains 50.
pub const DEFAULT_MAX_SPEED_KNOTS: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Teleport rejection threshold; `None` keeps every report.
    pub max_speed_knots: Option<f64>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        AssemblerConfig {
            max_speed_knots: Some(DEFAULT_MAX_SPEED_KNOTS),
        }
    }
}

// ---------------------------------------------------------------------------
// Vessel track
// ---------------------------------------------------------------------------

/// Time-ordered reports for one vessel.
///
/// Timestamps are strictly increasing. `label` distinguishes separate
/// pathways sharing one MMSI (0 when no separation was done).
#[derive(Debug, Clone, PartialEq)]
pub struct VesselTrack {
    pub mmsi: Mmsi,
    pub label: u32,
    pub points: Vec<RawReport>,
}

impl VesselTrack {
    /// Build a track from reports in any order, applying first-seen
    /// deduplication. Returns the track and the number of duplicates.
    pub fn from_reports(mmsi: Mmsi, mut reports: Vec<RawReport>) -> (Self, usize) {
        reports.sort_by_key(|r| r.timestamp);
        let before = reports.len();
        reports.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);
        let duplicates = before - reports.len();
        (
            VesselTrack {
                mmsi,
                label: 0,
                points: reports,
            },
            duplicates,
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> Option<i64> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn end(&self) -> Option<i64> {
        self.points.last().map(|p| p.timestamp)
    }
}

/// Drop points implying more than `max_knots` from the last kept point.
/// Returns the number rejected.
fn reject_teleports(points: &mut Vec<RawReport>, max_knots: f64) -> usize {
    let before = points.len();
    let mut kept: Vec<RawReport> = Vec::with_capacity(points.len());
    for p in points.drain(..) {
        if let Some(prev) = kept.last() {
            let dist = haversine_m(prev.lon, prev.lat, p.lon, p.lat);
            if knots(dist, p.timestamp - prev.timestamp) > max_knots {
                continue;
            }
        }
        kept.push(p);
    }
    *points = kept;
    before - points.len()
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// What happened to a pushed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Buffered,
    OutOfWindow,
}

/// Groups reports into vessel tracks for one query window.
pub struct TrackAssembler {
    config: AssemblerConfig,
    window: QueryWindow,
    pending: BTreeMap<Mmsi, Vec<RawReport>>,

    // Counters
    pub total_reports: u64,
    pub out_of_window: u64,
    pub duplicates: u64,
    pub rejected_noise: u64,
    pub vessels: u64,
}

impl TrackAssembler {
    pub fn new(config: AssemblerConfig, window: QueryWindow) -> Self {
        TrackAssembler {
            config,
            window,
            pending: BTreeMap::new(),
            total_reports: 0,
            out_of_window: 0,
            duplicates: 0,
            rejected_noise: 0,
            vessels: 0,
        }
    }

    /// Buffer one report.
    pub fn push(&mut self, report: RawReport) -> Admission {
        self.total_reports += 1;
        if !self.window.contains(&report) {
            self.out_of_window += 1;
            return Admission::OutOfWindow;
        }
        self.pending.entry(report.mmsi).or_default().push(report);
        Admission::Buffered
    }

    /// Number of vessels with buffered reports.
    pub fn pending_vessels(&self) -> usize {
        self.pending.len()
    }

    /// Finalize one vessel. `None` if it has no surviving reports.
    pub fn take(&mut self, mmsi: Mmsi) -> Option<VesselTrack> {
        let reports = self.pending.remove(&mmsi)?;
        self.finalize(mmsi, reports)
    }

    /// Finalize every buffered vessel with an MMSI below `mmsi`.
    pub fn drain_below(&mut self, mmsi: Mmsi) -> Vec<VesselTrack> {
        let rest = self.pending.split_off(&mmsi);
        let done = std::mem::replace(&mut self.pending, rest);
        done.into_iter()
            .filter_map(|(m, reports)| self.finalize(m, reports))
            .collect()
    }

    /// Finalize everything still buffered, in MMSI order.
    pub fn drain_all(&mut self) -> Vec<VesselTrack> {
        let done = std::mem::take(&mut self.pending);
        done.into_iter()
            .filter_map(|(m, reports)| self.finalize(m, reports))
            .collect()
    }

    fn finalize(&mut self, mmsi: Mmsi, reports: Vec<RawReport>) -> Option<VesselTrack> {
        let (mut track, duplicates) = VesselTrack::from_reports(mmsi, reports);
        self.duplicates += duplicates as u64;
        if let Some(max) = self.config.max_speed_knots {
            let rejected = reject_teleports(&mut track.points, max);
            if rejected > 0 {
                debug!(mmsi, rejected, "rejected implausible positions");
            }
            self.rejected_noise += rejected as u64;
        }
        if track.is_empty() {
            return None;
        }
        self.vessels += 1;
        Some(track)
    }
}

/// Assemble a complete report stream into per-vessel tracks.
///
/// Vessels with no valid reports in the window are absent from the map.
pub fn assemble(
    reports: impl IntoIterator<Item = RawReport>,
    window: &QueryWindow,
    config: &AssemblerConfig,
) -> BTreeMap<Mmsi, VesselTrack> {
    let mut assembler = TrackAssembler::new(*config, *window);
    for report in reports {
        assembler.push(report);
    }
    assembler
        .drain_all()
        .into_iter()
        .map(|t| (t.mmsi, t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn report(mmsi: Mmsi, timestamp: i64, lon: f64, lat: f64) -> RawReport {
        RawReport {
            mmsi,
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

    #[test]
    fn test_groups_by_mmsi_and_sorts() {
        let reports = vec![
            report(2, 30, -63.0, 44.0),
            report(1, 20, -63.0, 44.0),
            report(2, 10, -63.0, 44.0),
            report(1, 10, -63.0, 44.0),
        ];
        let tracks = assemble(reports, &QueryWindow::unbounded(), &AssemblerConfig::default());
        assert_eq!(tracks.len(), 2);
        let times: Vec<i64> = tracks[&2].points.iter().map(|p| p.timestamp).collect();
        assert_eq!(times, vec![10, 30]);
        let times: Vec<i64> = tracks[&1].points.iter().map(|p| p.timestamp).collect();
        assert_eq!(times, vec![10, 20]);
    }

    #[test]
    fn test_first_seen_duplicate_wins() {
        let mut first = report(1, 100, -63.0, 44.0);
        first.sog = Some(5.0);
        let mut second = report(1, 100, -63.0001, 44.0001);
        second.sog = Some(7.0);

        let mut asm = TrackAssembler::new(AssemblerConfig::default(), QueryWindow::unbounded());
        asm.push(first.clone());
        asm.push(second);
        let track = asm.take(1).unwrap();
        assert_eq!(track.points, vec![first]);
        assert_eq!(asm.duplicates, 1);
    }

    #[test]
    fn test_duplicate_survives_out_of_order_arrival() {
        let a = report(1, 200, -63.0, 44.0);
        let mut b = report(1, 100, -63.0, 44.0);
        b.sog = Some(1.0);
        let mut c = report(1, 100, -63.0, 44.0);
        c.sog = Some(2.0);
        let tracks = assemble(
            vec![a, b.clone(), c],
            &QueryWindow::unbounded(),
            &AssemblerConfig::default(),
        );
        assert_eq!(tracks[&1].points[0], b);
        assert_eq!(tracks[&1].len(), 2);
    }

    #[test]
    fn test_teleport_rejected() {
        // One degree of latitude in 60 s is far beyond 50 kn.
        let reports = vec![
            report(1, 0, -63.0, 44.0),
            report(1, 60, -63.0, 45.0),
            report(1, 120, -63.001, 44.0),
        ];
        let mut asm = TrackAssembler::new(AssemblerConfig::default(), QueryWindow::unbounded());
        for r in reports {
            asm.push(r);
        }
        let track = asm.take(1).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.points[1].timestamp, 120);
        assert_eq!(asm.rejected_noise, 1);
    }

    #[test]
    fn test_teleport_rejection_disabled() {
        let reports = vec![report(1, 0, -63.0, 44.0), report(1, 60, -63.0, 45.0)];
        let config = AssemblerConfig {
            max_speed_knots: None,
        };
        let tracks = assemble(reports, &QueryWindow::unbounded(), &config);
        assert_eq!(tracks[&1].len(), 2);
    }

    #[test]
    fn test_window_filter() {
        let window = QueryWindow {
            area: Some(BoundingBox::new(-64.0, 44.0, -63.0, 45.0)),
            start: 0,
            end: 1000,
        };
        let reports = vec![
            report(1, 10, -63.5, 44.5),
            report(1, 2000, -63.5, 44.5),
            report(2, 10, -10.0, 10.0),
        ];
        let mut asm = TrackAssembler::new(AssemblerConfig::default(), window);
        let admissions: Vec<Admission> = reports.into_iter().map(|r| asm.push(r)).collect();
        assert_eq!(
            admissions,
            vec![Admission::Buffered, Admission::OutOfWindow, Admission::OutOfWindow]
        );
        let tracks = asm.drain_all();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].mmsi, 1);
        assert_eq!(asm.out_of_window, 2);
    }

    #[test]
    fn test_vessel_without_reports_absent() {
        let window = QueryWindow {
            area: None,
            start: 0,
            end: 10,
        };
        let tracks = assemble(
            vec![report(7, 50, 0.0, 0.0)],
            &window,
            &AssemblerConfig::default(),
        );
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_drain_below() {
        let mut asm = TrackAssembler::new(AssemblerConfig::default(), QueryWindow::unbounded());
        for mmsi in [5, 1, 3] {
            asm.push(report(mmsi, 0, 0.0, 0.0));
        }
        let done: Vec<Mmsi> = asm.drain_below(4).iter().map(|t| t.mmsi).collect();
        assert_eq!(done, vec![1, 3]);
        assert_eq!(asm.pending_vessels(), 1);
        assert_eq!(asm.drain_all()[0].mmsi, 5);
        assert_eq!(asm.vessels, 3);
    }
}
