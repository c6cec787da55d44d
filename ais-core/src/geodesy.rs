//! Great-circle distance, implied speed, and map projections.
//!
//! All distance and speed checks use haversine distance on geographic
//! degrees. Interpolation works in spherical Web Mercator metres, and
//! simplification in a local equirectangular frame, so neither is done on
//! raw degrees.

use geo::{HaversineDistance, Point};

/// Metres per second to knots.
pub const MS_TO_KNOTS: f64 = 1.943_844_5;

/// Web Mercator sphere radius, metres.
pub const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Mean earth radius used for local projections, metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Latitude limit of the Web Mercator square.
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_78;

/// Great-circle distance in metres between two lon/lat points.
pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2))
}

/// Implied speed in knots for `metres` covered in `seconds`.
///
/// A zero or negative interval is infinitely fast unless nothing moved.
pub fn knots(metres: f64, seconds: i64) -> f64 {
    if seconds <= 0 {
        return if metres == 0.0 { 0.0 } else { f64::INFINITY };
    }
    metres / seconds as f64 * MS_TO_KNOTS
}

/// Project lon/lat degrees to Web Mercator metres.
pub fn mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT);
    let x = MERCATOR_RADIUS * lon.to_radians();
    let y = MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Inverse of [`mercator`].
pub fn inverse_mercator(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (y / MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

/// Wrap a longitude into [-180, 180].
pub fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Longitude of `lon` shifted by whole turns to lie within 180 degrees of
/// `reference`, so that a straight segment between them does not wrap the
/// long way round.
pub fn unwrap_lon(reference: f64, lon: f64) -> f64 {
    let mut lon = lon;
    while lon - reference > 180.0 {
        lon -= 360.0;
    }
    while lon - reference < -180.0 {
        lon += 360.0;
    }
    lon
}

/// Local equirectangular frame centred on a reference latitude.
///
/// Distances in this frame are metres, accurate over the extent of a
/// single vessel segment.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    lon0: f64,
    cos_lat0: f64,
}

impl LocalFrame {
    pub fn new(lon0: f64, lat0: f64) -> Self {
        LocalFrame {
            lon0,
            cos_lat0: lat0.to_radians().cos(),
        }
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lon = unwrap_lon(self.lon0, lon);
        (
            EARTH_RADIUS_M * (lon - self.lon0).to_radians() * self.cos_lat0,
            EARTH_RADIUS_M * lat.to_radians(),
        )
    }
}
