use formats::{Feature, Geometry};
use mesh::{AreaFragment, LineFragment, build_area_fragment, build_line_fragment};

use crate::symbology::LayerStyle;

/// Closed classification over the two render pipelines.
///
/// Points, geometry collections, and features without usable geometry all
/// land in `Unsupported`; callers pattern-match and skip. This is a
/// documented limitation, not an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GeometryClass {
    Area,
    Line,
    Unsupported,
}

pub fn classify(feature: &Feature) -> GeometryClass {
    match feature.geometry {
        Some(Geometry::Polygon(_)) | Some(Geometry::MultiPolygon(_)) => GeometryClass::Area,
        Some(Geometry::LineString(_)) | Some(Geometry::MultiLineString(_)) => GeometryClass::Line,
        _ => GeometryClass::Unsupported,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Area(AreaFragment),
    Line(LineFragment),
}

/// Per-feature geometry object owning one buffer fragment.
///
/// `feature_index` is a lookup-only back-reference into the extracted
/// feature list; the feature itself stays owned by the layer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayer {
    pub feature_index: usize,
    pub style: LayerStyle,
    pub fragment: Fragment,
}

impl FeatureLayer {
    pub fn class(&self) -> GeometryClass {
        match self.fragment {
            Fragment::Area(_) => GeometryClass::Area,
            Fragment::Line(_) => GeometryClass::Line,
        }
    }

    pub fn vertex_count(&self) -> usize {
        match &self.fragment {
            Fragment::Area(f) => f.vertex_count(),
            Fragment::Line(f) => f.vertex_count(),
        }
    }

    pub fn is_flat(&self) -> bool {
        match &self.fragment {
            Fragment::Area(f) => f.flat,
            Fragment::Line(_) => false,
        }
    }
}

/// Builds the geometry object for one feature, or `None` for unsupported
/// or degenerate geometry. Skipping is silent by design: heterogeneous
/// real-world datasets routinely mix feature completeness.
pub fn dispatch(feature: &Feature, feature_index: usize, style: LayerStyle) -> Option<FeatureLayer> {
    let lift = style.lift as f64;
    let fragment = match feature.geometry.as_ref()? {
        Geometry::Polygon(rings) => Fragment::Area(build_area_fragment(rings, lift)?),
        Geometry::MultiPolygon(polys) => {
            let mut merged: Option<AreaFragment> = None;
            for rings in polys {
                let Some(frag) = build_area_fragment(rings, lift) else {
                    continue;
                };
                match merged.as_mut() {
                    Some(m) => m.extend(frag),
                    None => merged = Some(frag),
                }
            }
            Fragment::Area(merged?)
        }
        Geometry::LineString(points) => Fragment::Line(build_line_fragment(points, lift)?),
        Geometry::MultiLineString(lines) => {
            let mut merged: Option<LineFragment> = None;
            for points in lines {
                let Some(frag) = build_line_fragment(points, lift) else {
                    continue;
                };
                match merged.as_mut() {
                    Some(m) => m.extend(frag),
                    None => merged = Some(frag),
                }
            }
            Fragment::Line(merged?)
        }
        Geometry::Point(_) | Geometry::MultiPoint(_) => return None,
    };

    Some(FeatureLayer {
        feature_index,
        style,
        fragment,
    })
}
