//! Zone polygons (geofences, ecoregions).
//!
//! Loaded once from a directory of `.txt` files, one `lon,lat` vertex per
//! line, zone name taken from the file stem. The set is immutable after
//! load and shared read-only across sessions.

use std::path::Path;

use geo::{Centroid, Intersects, LineString, Point, Polygon};

use crate::geodesy::haversine_m;
use crate::types::{AisError, BoundingBox, Result};

/// A named polygon with precomputed centroid, bounds and radius.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePolygon {
    pub name: String,
    /// Closed ring of `[lon, lat]` vertices.
    pub ring: Vec<[f64; 2]>,
    pub centroid: [f64; 2],
    pub bbox: BoundingBox,
    /// Largest distance from the centroid to a vertex, metres.
    pub max_radius: f64,
    polygon: Polygon<f64>,
}

impl ZonePolygon {
    pub fn new(name: impl Into<String>, ring: Vec<[f64; 2]>) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: &str| AisError::Zone {
            name: name.clone(),
            reason: reason.to_string(),
        };

        let mut ring = ring;
        if ring
            .iter()
            .any(|[lon, lat]| !(-180.0..=180.0).contains(lon) || !(-90.0..=90.0).contains(lat))
        {
            return Err(invalid("vertex out of range"));
        }
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }
        if ring.len() < 4 {
            return Err(invalid("fewer than three vertices"));
        }

        let polygon = Polygon::new(
            LineString::from(ring.iter().map(|&[x, y]| (x, y)).collect::<Vec<_>>()),
            Vec::new(),
        );
        let centroid = polygon
            .centroid()
            .map(|p| [p.x(), p.y()])
            .ok_or_else(|| invalid("degenerate polygon"))?;

        let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for &[x, y] in &ring {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        let max_radius = ring
            .iter()
            .map(|&[x, y]| haversine_m(centroid[0], centroid[1], x, y))
            .fold(0.0, f64::max);

        Ok(ZonePolygon {
            name,
            ring,
            centroid,
            bbox: BoundingBox::new(x0, y0, x1, y1),
            max_radius,
            polygon,
        })
    }

    /// Point-in-polygon, boundary inclusive.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.bbox.contains(lon, lat) && self.polygon.intersects(&Point::new(lon, lat))
    }
}

/// Parse the text zone format: one `lon,lat` per line, `#` comments.
pub fn parse_zone_txt(name: &str, text: &str) -> Result<ZonePolygon> {
    let mut ring = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed = line.split_once(',').and_then(|(x, y)| {
            Some([x.trim().parse::<f64>().ok()?, y.trim().parse::<f64>().ok()?])
        });
        match parsed {
            Some(v) => ring.push(v),
            None => {
                return Err(AisError::Zone {
                    name: name.to_string(),
                    reason: format!("line {}: expected lon,lat", lineno + 1),
                })
            }
        }
    }
    ZonePolygon::new(name, ring)
}

// ---------------------------------------------------------------------------
// Zone set
// ---------------------------------------------------------------------------

/// All zones known to the server, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct ZoneSet {
    zones: Vec<ZonePolygon>,
}

impl ZoneSet {
    pub fn new(mut zones: Vec<ZonePolygon>) -> Self {
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        ZoneSet { zones }
    }

    /// Load every `*.txt` file in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut zones = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path)?;
            zones.push(parse_zone_txt(name, &text)?);
        }
        Ok(ZoneSet::new(zones))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZonePolygon> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// First zone (by name) containing the point.
    pub fn zone_of(&self, lon: f64, lat: f64) -> Option<&ZonePolygon> {
        self.zones.iter().find(|z| z.contains(lon, lat))
    }

    /// Names of zones visited by a sequence of points, in order of first
    /// visit.
    pub fn zones_visited(&self, points: impl IntoIterator<Item = (f64, f64)>) -> Vec<String> {
        let mut visited: Vec<String> = Vec::new();
        if self.zones.is_empty() {
            return visited;
        }
        for (lon, lat) in points {
            if let Some(zone) = self.zone_of(lon, lat) {
                if !visited.iter().any(|n| n == &zone.name) {
                    visited.push(zone.name.clone());
                }
            }
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(name: &str, x0: f64, y0: f64, size: f64) -> ZonePolygon {
        ZonePolygon::new(
            name,
            vec![[x0, y0], [x0 + size, y0], [x0 + size, y0 + size], [x0, y0 + size]],
        )
        .unwrap()
    }

    #[test]
    fn test_ring_closed_and_centroid() {
        let z = square("a", 0.0, 0.0, 2.0);
        assert_eq!(z.ring.len(), 5);
        assert_eq!(z.ring.first(), z.ring.last());
        assert!((z.centroid[0] - 1.0).abs() < 1e-9);
        assert!((z.centroid[1] - 1.0).abs() < 1e-9);
        assert!(z.max_radius > 150_000.0 && z.max_radius < 160_000.0);
    }

    #[test]
    fn test_contains() {
        let z = square("a", -64.0, 44.0, 1.0);
        assert!(z.contains(-63.5, 44.5));
        assert!(z.contains(-64.0, 44.5));
        assert!(!z.contains(-62.5, 44.5));
    }

    #[test]
    fn test_too_few_vertices() {
        assert!(ZonePolygon::new("x", vec![[0.0, 0.0], [1.0, 1.0]]).is_err());
    }

    #[test]
    fn test_vertex_out_of_range() {
        assert!(ZonePolygon::new("x", vec![[0.0, 0.0], [1.0, 95.0], [2.0, 0.0]]).is_err());
    }

    #[test]
    fn test_parse_zone_txt() {
        let text = "# Bay\n-64.0,44.0\n-63.0,44.0\n-63.0,45.0\n-64.0,45.0\n";
        let z = parse_zone_txt("bay", text).unwrap();
        assert_eq!(z.name, "bay");
        assert_eq!(z.ring.len(), 5);
    }

    #[test]
    fn test_parse_zone_txt_bad_line() {
        let err = parse_zone_txt("bay", "-64.0,44.0\nnope\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zeta.txt"), "0,0\n1,0\n1,1\n0,1\n").unwrap();
        std::fs::write(dir.path().join("alpha.txt"), "10,10\n11,10\n11,11\n").unwrap();
        std::fs::write(dir.path().join("readme.md"), "ignored").unwrap();
        let set = ZoneSet::load_dir(dir.path()).unwrap();
        let names: Vec<&str> = set.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_zones_visited_in_order() {
        let set = ZoneSet::new(vec![square("west", -64.0, 44.0, 1.0), square("east", -63.0, 44.0, 1.0)]);
        let visited = set.zones_visited(vec![
            (-62.5, 44.5),
            (-63.5, 44.5),
            (-62.2, 44.5),
            (0.0, 0.0),
        ]);
        assert_eq!(visited, vec!["east".to_string(), "west".to_string()]);
    }
}
