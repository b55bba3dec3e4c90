use formats::Feature;
use scene::Blending;

/// Concrete style record for one feature (or a whole batch when static).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LayerStyle {
    pub color: [f32; 3],
    /// Lift above the ellipsoid surface, meters.
    pub lift: f32,
    pub line_width: f32,
    pub line_opacity: f32,
    pub line_transparent: bool,
    pub line_blending: Blending,
    pub line_render_order: i32,
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            lift: 0.0,
            line_width: 1.0,
            line_opacity: 1.0,
            line_transparent: false,
            line_blending: Blending::Normal,
            line_render_order: 0,
        }
    }
}

/// Style input: one record for the whole layer, or a per-feature function
/// for data-driven styling. Callers fall back to defaults with struct
/// update syntax (`LayerStyle { color, ..Default::default() }`).
pub enum StyleSpec {
    Static(LayerStyle),
    PerFeature(Box<dyn Fn(&Feature) -> LayerStyle>),
}

impl Default for StyleSpec {
    fn default() -> Self {
        StyleSpec::Static(LayerStyle::default())
    }
}

impl StyleSpec {
    /// Uniform resolution regardless of variant. A static record is copied,
    /// not re-evaluated, per feature.
    pub fn resolve(&self, feature: &Feature) -> LayerStyle {
        match self {
            StyleSpec::Static(style) => *style,
            StyleSpec::PerFeature(f) => f(feature),
        }
    }
}

#[cfg(test)]
mod tests {
    use formats::Feature;
    use serde_json::Map;

    use super::{LayerStyle, StyleSpec};

    fn feature_with_rank(rank: f64) -> Feature {
        let mut properties = Map::new();
        properties.insert("rank".to_string(), rank.into());
        Feature {
            id: None,
            properties,
            geometry: None,
        }
    }

    #[test]
    fn static_style_is_shared_across_features() {
        let spec = StyleSpec::Static(LayerStyle {
            color: [0.2, 0.4, 0.6],
            ..Default::default()
        });
        let a = spec.resolve(&feature_with_rank(1.0));
        let b = spec.resolve(&feature_with_rank(2.0));
        assert_eq!(a, b);
        assert_eq!(a.color, [0.2, 0.4, 0.6]);
    }

    #[test]
    fn per_feature_style_varies_with_the_feature() {
        let spec = StyleSpec::PerFeature(Box::new(|f| LayerStyle {
            line_width: f.property_f64("rank").unwrap_or(0.0) as f32,
            ..Default::default()
        }));
        assert_eq!(spec.resolve(&feature_with_rank(1.0)).line_width, 1.0);
        assert_eq!(spec.resolve(&feature_with_rank(3.0)).line_width, 3.0);
        // Unset fields fall back to defaults.
        assert_eq!(
            spec.resolve(&feature_with_rank(1.0)).color,
            LayerStyle::default().color
        );
    }
}
