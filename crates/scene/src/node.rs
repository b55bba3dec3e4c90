use std::sync::Arc;

use foundation::Aabb3;

/// Render-ready buffer descriptors for one draw batch.
///
/// Position data is behind `Arc` so picking geometry can alias the render
/// geometry's vertices without duplicating coordinate data.
#[derive(Debug, Clone)]
pub struct GeometryBuffers {
    /// Interleaved xyz, three entries per vertex.
    pub positions: Arc<Vec<f32>>,
    /// Interleaved xyz normals; absent for line geometry.
    pub normals: Option<Arc<Vec<f32>>>,
    /// Interleaved rgb, three entries per vertex.
    pub colors: Arc<Vec<f32>>,
    /// One identifier per vertex, mapping hits back to features.
    pub picking_ids: Option<Arc<Vec<u32>>>,
    pub bounds: Aabb3,
}

impl GeometryBuffers {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Blending {
    Normal,
    Additive,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AreaMaterial {
    /// Flat batches may write depth without self-occlusion artifacts.
    pub depth_write: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineMaterial {
    pub width: f32,
    pub opacity: f32,
    pub transparent: bool,
    pub blending: Blending,
    pub render_order: i32,
}

/// Hit-test-only material: never visually rendered.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PickingMaterial {
    /// Widened hit width for line geometry; `None` for area geometry.
    pub line_width: Option<f32>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Material {
    Area(AreaMaterial),
    Line(LineMaterial),
    Picking(PickingMaterial),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub geometry: GeometryBuffers,
    pub material: Material,
}
