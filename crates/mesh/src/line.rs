use foundation::math::{Geodetic, geodetic_to_ecef};
use formats::GeoPoint;

use crate::fragment::LineFragment;

/// Expands one polyline into GL_LINES segment pairs in ECEF meters.
/// Returns `None` for degenerate input (fewer than two points).
pub fn build_line_fragment(points: &[GeoPoint], lift_m: f64) -> Option<LineFragment> {
    if points.len() < 2 {
        return None;
    }

    let ecef: Vec<[f32; 3]> = points
        .iter()
        .map(|p| {
            let e = geodetic_to_ecef(Geodetic::from_lon_lat_deg(p.lon_deg, p.lat_deg, lift_m));
            [e.x as f32, e.y as f32, e.z as f32]
        })
        .collect();

    let mut positions = Vec::with_capacity((ecef.len() - 1) * 6);
    for pair in ecef.windows(2) {
        positions.extend(pair[0]);
        positions.extend(pair[1]);
    }
    Some(LineFragment { positions })
}
