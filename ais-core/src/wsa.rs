//! Wetted surface area estimate from deadweight tonnage.
//!
//! Denny-Mumford regression `coef * dwt^exp`, with coefficients per ship
//! category from Moser et al. (2017), "Quantifying the extent of niche areas
//! in the global fleet of commercial ships", Biological Invasions 19(6).
//! Only the numeric AIS ship type is known here, so container and bulk
//! carriers fall under the general cargo regression.

/// Regression coefficient and exponent for an ITU ship type code.
///
/// `None` for unknown, reserved and wing-in-ground types (below 30).
pub fn coefficients(ship_type: Option<u8>) -> Option<(f64, f64)> {
    let pair = match ship_type? {
        0..=29 => return None,
        30 => (15.58, 0.602),
        52 | 53 => (19.36, 0.553),
        60..=69 => (14.64, 0.671),
        70..=79 => (14.24, 0.596),
        // oil / LNG / LPG tankers
        84 => (5.41, 0.699),
        80..=89 => (9.56, 0.63),
        _ => (26.2, 0.551),
    };
    Some(pair)
}

/// Submerged hull area in square metres. Zero when the type has no
/// regression or the tonnage is not positive.
pub fn wetted_surface_area(deadweight_t: f64, ship_type: Option<u8>) -> f64 {
    match coefficients(ship_type) {
        Some((coef, exp)) if deadweight_t > 0.0 && deadweight_t.is_finite() => coef * deadweight_t.powf(exp),
        _ => 0.0,
    }
}
