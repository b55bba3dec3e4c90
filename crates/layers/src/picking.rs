use std::sync::Arc;

use scene::{GeometryBuffers, Material, Node, PickingMaterial};

use crate::batch::MergedBatch;
use crate::dispatch::GeometryClass;

/// Extra hit width, logical pixels, so thin lines stay practically
/// clickable.
pub const LINE_PICK_WIDTH_PAD: f32 = 4.0;

/// Builds the hit-test twin of a merged batch.
///
/// Vertex positions (and colors) are shared with the render geometry by
/// reference; only the picking-identifier attribute and the non-rendered
/// material are specific to the picking node. Returns `None` for batches
/// merged without picking identifiers.
pub fn compose_picking(batch: &MergedBatch) -> Option<Node> {
    let picking_ids = batch.picking_ids.as_ref()?;

    let line_width = match batch.class {
        GeometryClass::Line => Some(batch.style.line_width + LINE_PICK_WIDTH_PAD),
        _ => None,
    };

    Some(Node {
        geometry: GeometryBuffers {
            positions: Arc::clone(&batch.positions),
            normals: None,
            colors: Arc::clone(&batch.colors),
            picking_ids: Some(Arc::clone(picking_ids)),
            bounds: batch.bounds,
        },
        material: Material::Picking(PickingMaterial { line_width }),
    })
}
