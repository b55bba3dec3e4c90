use std::sync::Arc;

use foundation::Aabb3;

use crate::dispatch::{FeatureLayer, Fragment, GeometryClass};
use crate::symbology::LayerStyle;

/// One merged, contiguous draw batch for a geometry class.
///
/// Buffers are `Arc`-shared so picking geometry can alias them without
/// copying coordinate data.
#[derive(Debug, Clone)]
pub struct MergedBatch {
    pub class: GeometryClass,
    pub positions: Arc<Vec<f32>>,
    pub normals: Option<Arc<Vec<f32>>>,
    pub colors: Arc<Vec<f32>>,
    pub picking_ids: Option<Arc<Vec<u32>>>,
    /// AND over contributing fragments; meaningful for area batches only.
    pub flat: bool,
    /// Pure function of the merged vertex array, recomputed on every merge.
    pub bounds: Aabb3,
    /// Style driving batch-level material configuration (first contributor;
    /// per-feature variation lives in the per-vertex color buffer).
    pub style: LayerStyle,
}

impl MergedBatch {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergedBatches {
    pub area: Option<MergedBatch>,
    pub line: Option<MergedBatch>,
}

/// Merges per-feature fragments into at most one batch per geometry class.
///
/// Relative layer order is preserved, and within a layer its fragment's own
/// vertex order. An empty class yields `None`, never an empty buffer. With
/// `interactive`, per-vertex picking identifiers (the originating feature
/// index) are concatenated alongside the vertices.
pub fn merge(layers: &[FeatureLayer], interactive: bool) -> MergedBatches {
    MergedBatches {
        area: merge_class(layers, GeometryClass::Area, interactive),
        line: merge_class(layers, GeometryClass::Line, interactive),
    }
}

fn merge_class(
    layers: &[FeatureLayer],
    class: GeometryClass,
    interactive: bool,
) -> Option<MergedBatch> {
    let contributing: Vec<&FeatureLayer> = layers.iter().filter(|l| l.class() == class).collect();
    if contributing.is_empty() {
        return None;
    }

    let total: usize = contributing.iter().map(|l| l.vertex_count()).sum();
    let mut positions: Vec<f32> = Vec::with_capacity(total * 3);
    let mut normals: Vec<f32> = Vec::with_capacity(if class == GeometryClass::Area {
        total * 3
    } else {
        0
    });
    let mut colors: Vec<f32> = Vec::with_capacity(total * 3);
    let mut picking_ids: Vec<u32> = Vec::with_capacity(if interactive { total } else { 0 });
    let mut flat = true;

    for layer in &contributing {
        let count = layer.vertex_count();
        match &layer.fragment {
            Fragment::Area(frag) => {
                positions.extend_from_slice(&frag.positions);
                normals.extend_from_slice(&frag.normals);
                flat = flat && frag.flat;
            }
            Fragment::Line(frag) => {
                positions.extend_from_slice(&frag.positions);
            }
        }
        for _ in 0..count {
            colors.extend_from_slice(&layer.style.color);
        }
        if interactive {
            picking_ids.extend(std::iter::repeat(layer.feature_index as u32).take(count));
        }
    }

    let bounds = Aabb3::from_points(
        positions
            .chunks_exact(3)
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64]),
    )?;

    Some(MergedBatch {
        class,
        positions: Arc::new(positions),
        normals: if class == GeometryClass::Area {
            Some(Arc::new(normals))
        } else {
            None
        },
        colors: Arc::new(colors),
        picking_ids: if interactive {
            Some(Arc::new(picking_ids))
        } else {
            None
        },
        flat,
        bounds,
        style: contributing[0].style,
    })
}
