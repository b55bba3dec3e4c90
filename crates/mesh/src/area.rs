use earcutr::earcut;
use foundation::math::{Ecef, Geodetic, Vec3, ellipsoid_normal, geodetic_to_ecef};
use formats::GeoPoint;

use crate::fragment::AreaFragment;

/// Vertices within this distance of the outer ring's tangent plane count
/// as coplanar.
const FLAT_TOLERANCE_M: f64 = 1.0;

/// Triangulates one polygon (outer ring plus holes) into an ECEF triangle
/// list. Returns `None` for degenerate coordinate trees (fewer than three
/// distinct outer-ring points, or nothing left after cleanup).
///
/// Triangulation runs in a local tangent plane at the centroid of the outer
/// ring; `lift_m` raises the surface along the ellipsoid normal.
pub fn build_area_fragment(rings: &[Vec<GeoPoint>], lift_m: f64) -> Option<AreaFragment> {
    let outer = rings.first()?;
    if outer.len() < 3 {
        return None;
    }

    let mut vertices: Vec<Vec3> = Vec::new();
    let mut coords_2d: Vec<f64> = Vec::new();
    let mut hole_indices: Vec<usize> = Vec::new();

    // Project rings into ECEF once; the tangent basis comes from the outer
    // ring's centroid.
    let outer_ecef = ring_to_ecef(outer, lift_m);
    if outer_ecef.len() < 3 {
        return None;
    }
    let origin = centroid(&outer_ecef);
    let n = ellipsoid_normal(Ecef::new(origin.x, origin.y, origin.z));

    let up = if n.z.abs() < 0.99 {
        Vec3::new(0.0, 0.0, 1.0)
    } else {
        Vec3::new(0.0, 1.0, 0.0)
    };
    let east = up.cross(n).normalized();
    let north = n.cross(east);

    let mut max_plane_dist: f64 = 0.0;
    for (ring_i, ring) in rings.iter().enumerate() {
        let ring_pts = if ring_i == 0 {
            outer_ecef.clone()
        } else {
            ring_to_ecef(ring, lift_m)
        };
        if ring_pts.len() < 3 {
            continue;
        }

        if ring_i > 0 {
            hole_indices.push(vertices.len());
        }

        for p in ring_pts {
            let v = p - origin;
            coords_2d.push(v.dot(east));
            coords_2d.push(v.dot(north));
            max_plane_dist = max_plane_dist.max(v.dot(n).abs());
            vertices.push(p);
        }
    }

    if vertices.len() < 3 {
        return None;
    }

    let indices = earcut(&coords_2d, &hole_indices, 2).ok()?;
    if indices.is_empty() {
        return None;
    }

    let mut out = AreaFragment {
        positions: Vec::with_capacity(indices.len() * 3),
        normals: Vec::with_capacity(indices.len() * 3),
        flat: max_plane_dist <= FLAT_TOLERANCE_M,
    };
    for idx in indices {
        let Some(v) = vertices.get(idx) else {
            continue;
        };
        out.positions
            .extend([v.x as f32, v.y as f32, v.z as f32]);
        let vn = ellipsoid_normal(Ecef::new(v.x, v.y, v.z));
        out.normals
            .extend([vn.x as f32, vn.y as f32, vn.z as f32]);
    }
    Some(out)
}

fn ring_to_ecef(ring: &[GeoPoint], lift_m: f64) -> Vec<Vec3> {
    let mut pts: Vec<Vec3> = ring
        .iter()
        .map(|p| {
            geodetic_to_ecef(Geodetic::from_lon_lat_deg(p.lon_deg, p.lat_deg, lift_m)).as_vec3()
        })
        .collect();
    drop_closing_duplicate(&mut pts);
    pts
}

fn drop_closing_duplicate(points: &mut Vec<Vec3>) {
    if points.len() >= 2 {
        let first = points[0];
        let last = points[points.len() - 1];
        if (first.x - last.x).abs() < 1e-9
            && (first.y - last.y).abs() < 1e-9
            && (first.z - last.z).abs() < 1e-9
        {
            points.pop();
        }
    }
}

fn centroid(vertices: &[Vec3]) -> Vec3 {
    let mut sum = Vec3::new(0.0, 0.0, 0.0);
    for v in vertices {
        sum = sum + *v;
    }
    sum.scale(1.0 / vertices.len() as f64)
}
