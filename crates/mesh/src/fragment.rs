/// Triangle-list buffer fragment for one polygon's worth of area geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaFragment {
    /// Interleaved xyz, three entries per vertex, ECEF meters.
    pub positions: Vec<f32>,
    /// Interleaved per-vertex ellipsoid normals.
    pub normals: Vec<f32>,
    /// True when every vertex lies in the outer ring's tangent plane
    /// (within tolerance), enabling a depth-write optimization downstream.
    pub flat: bool,
}

impl AreaFragment {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Appends another polygon's triangles; flatness survives only if both
    /// sides are flat.
    pub fn extend(&mut self, other: AreaFragment) {
        self.flat = self.flat && other.flat;
        self.positions.extend(other.positions);
        self.normals.extend(other.normals);
    }
}

/// Segment-pair buffer fragment (GL_LINES layout) for one polyline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineFragment {
    /// Interleaved xyz; every consecutive pair of vertices is one segment.
    pub positions: Vec<f32>,
}

impl LineFragment {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn extend(&mut self, other: LineFragment) {
        self.positions.extend(other.positions);
    }
}
