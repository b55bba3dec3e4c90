use formats::Feature;
use scene::{AreaMaterial, GeometryBuffers, LineMaterial, Material, Node, NodeId, World};
use serde_json::Value;
use streaming::{FetchOutcome, Request, RequestIds, Transport};

use crate::batch::{MergedBatch, MergedBatches, merge};
use crate::dispatch::{FeatureLayer, GeometryClass, dispatch};
use crate::extract::extract_features;
use crate::layer::{Layer, LayerId};
use crate::picking::compose_picking;
use crate::symbology::StyleSpec;

/// Raw layer input: an in-memory document or a remote reference.
#[derive(Debug, Clone)]
pub enum VectorSource {
    Document(Value),
    Url(String),
}

pub type FeatureFilter = Box<dyn Fn(&Feature) -> bool>;

/// Extension point invoked with each feature and its freshly built
/// geometry object, before the object is registered for merging. Merging
/// discards per-layer object identity, so this is the only place to attach
/// feature-specific behavior.
pub type FeatureHook = Box<dyn FnMut(&Feature, &FeatureLayer)>;

#[derive(Default)]
pub struct VectorLayerOptions {
    /// When set, this instance performs the final merge and attaches to the
    /// scene. Unset, the layer only builds per-feature geometry for a
    /// parent aggregator.
    pub output: bool,
    pub interactive: bool,
    pub topojson: bool,
    pub filter: Option<FeatureFilter>,
    pub on_each_feature: Option<FeatureHook>,
    pub style: StyleSpec,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayerState {
    Idle,
    Requesting(Request),
    Ready,
}

/// GeoJSON/TopoJSON vector layer.
///
/// Owns the geometry it creates: the per-feature layer objects, the merged
/// draw batches, and the scene node handles for teardown. One merge pass
/// per instance; load different data into a fresh instance instead of
/// reprocessing.
pub struct VectorLayer {
    id: LayerId,
    opts: VectorLayerOptions,
    source: Option<VectorSource>,
    state: LayerState,
    features: Vec<Feature>,
    feature_layers: Vec<FeatureLayer>,
    batches: MergedBatches,
    render_nodes: Vec<NodeId>,
    picking_nodes: Vec<NodeId>,
}

impl VectorLayer {
    pub fn new(id: u64, source: VectorSource, opts: VectorLayerOptions) -> Self {
        Self {
            id: LayerId(id),
            opts,
            source: Some(source),
            state: LayerState::Idle,
            features: Vec::new(),
            feature_layers: Vec::new(),
            batches: MergedBatches::default(),
            render_nodes: Vec::new(),
            picking_nodes: Vec::new(),
        }
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature_layers(&self) -> &[FeatureLayer] {
        &self.feature_layers
    }

    /// Resolves a geometry object's back-reference to its source feature.
    pub fn feature_for(&self, layer: &FeatureLayer) -> Option<&Feature> {
        self.features.get(layer.feature_index)
    }

    pub fn area_batch(&self) -> Option<&MergedBatch> {
        self.batches.area.as_ref()
    }

    pub fn line_batch(&self) -> Option<&MergedBatch> {
        self.batches.line.as_ref()
    }

    pub fn picking_nodes(&self) -> &[NodeId] {
        &self.picking_nodes
    }

    pub fn render_nodes(&self) -> &[NodeId] {
        &self.render_nodes
    }

    /// Starts the layer: in-memory documents are processed synchronously,
    /// remote references begin a fetch. Attaching twice, or after destroy,
    /// is a no-op; a layer fetches at most once in its lifetime.
    pub fn attach(
        &mut self,
        world: &mut World,
        transport: &mut dyn Transport,
        ids: &mut RequestIds,
    ) {
        if self.state != LayerState::Idle {
            return;
        }
        match self.source.take() {
            Some(VectorSource::Document(document)) => {
                if self.process(&document, world) {
                    self.state = LayerState::Ready;
                }
            }
            Some(VectorSource::Url(url)) => {
                let req = ids.allocate();
                transport.begin(&url, req);
                self.state = LayerState::Requesting(req);
            }
            None => {}
        }
    }

    /// Delivers a fetch outcome from the host event loop.
    ///
    /// A completion that does not match the pending request (because the
    /// fetch was aborted, the layer destroyed, or the handle is foreign)
    /// performs no processing at all.
    pub fn complete_fetch(&mut self, req: Request, outcome: FetchOutcome, world: &mut World) {
        let LayerState::Requesting(pending) = self.state else {
            return;
        };
        if pending != req {
            return;
        }
        // Request reference is cleared before anything else; failure is
        // terminal for this attempt (no retry).
        self.state = LayerState::Idle;

        match outcome {
            Ok(document) => {
                if self.process(&document, world) {
                    self.state = LayerState::Ready;
                }
            }
            Err(err) => {
                log::warn!("vector layer {}: fetch failed: {err}", self.id.0);
            }
        }
    }

    /// Tears the layer down: aborts a pending fetch (a no-op if none),
    /// clears the request reference, releases picking geometry, then the
    /// render nodes. Safe to call at any point in the lifecycle.
    pub fn destroy(&mut self, world: &mut World, transport: &mut dyn Transport) {
        if let LayerState::Requesting(req) = self.state {
            transport.abort(req);
        }
        self.state = LayerState::Idle;
        self.source = None;

        for id in self.picking_nodes.drain(..) {
            world.remove(id);
        }
        for id in self.render_nodes.drain(..) {
            world.remove(id);
        }
        self.batches = MergedBatches::default();
        self.feature_layers.clear();
        self.features.clear();
    }

    /// One synchronous processing pass: extract, style, dispatch, merge,
    /// attach. Returns false when decoding fails; the layer then simply
    /// stays without content.
    fn process(&mut self, document: &Value, world: &mut World) -> bool {
        let filter = self.opts.filter.as_deref();
        let features = match extract_features(document, self.opts.topojson, filter) {
            Ok(features) => features,
            Err(err) => {
                log::error!("vector layer {}: decode failed: {err}", self.id.0);
                return false;
            }
        };

        let mut feature_layers = Vec::new();
        for (index, feature) in features.iter().enumerate() {
            let style = self.opts.style.resolve(feature);
            let Some(layer) = dispatch(feature, index, style) else {
                continue;
            };
            if let Some(hook) = self.opts.on_each_feature.as_mut() {
                hook(feature, &layer);
            }
            feature_layers.push(layer);
        }
        self.features = features;
        self.feature_layers = feature_layers;

        // Only the output owner merges and attaches; a pure
        // feature-collection source stops here and leaves both to its
        // parent.
        if self.opts.output && world.is_output_owner() {
            let batches = merge(&self.feature_layers, self.opts.interactive);
            for batch in [batches.area.as_ref(), batches.line.as_ref()]
                .into_iter()
                .flatten()
            {
                self.render_nodes.push(world.add_render_node(render_node(batch)));
                if let Some(node) = compose_picking(batch) {
                    self.picking_nodes.push(world.add_picking_root(node));
                }
            }
            self.batches = batches;
        }
        true
    }
}

impl Layer for VectorLayer {
    fn id(&self) -> LayerId {
        self.id
    }
}

fn render_node(batch: &MergedBatch) -> Node {
    let material = if batch.class == GeometryClass::Line {
        Material::Line(LineMaterial {
            width: batch.style.line_width,
            opacity: batch.style.line_opacity,
            transparent: batch.style.line_transparent,
            blending: batch.style.line_blending,
            render_order: batch.style.line_render_order,
        })
    } else {
        Material::Area(AreaMaterial {
            depth_write: batch.flat,
        })
    };
    Node {
        geometry: GeometryBuffers {
            positions: batch.positions.clone(),
            normals: batch.normals.clone(),
            colors: batch.colors.clone(),
            picking_ids: batch.picking_ids.clone(),
            bounds: batch.bounds,
        },
        material,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use scene::World;
    use serde_json::json;
    use streaming::{MemoryTransport, RequestIds};

    use super::{LayerState, VectorLayer, VectorLayerOptions, VectorSource};
    use crate::symbology::{LayerStyle, StyleSpec};

    fn polygon_and_line_doc() -> serde_json::Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"name": "plaza"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[
                            [0.0, 0.0], [0.001, 0.0], [0.001, 0.001], [0.0, 0.001], [0.0, 0.0]
                        ]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"name": "path"},
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[0.0, 0.0], [0.002, 0.002]]
                    }
                }
            ]
        })
    }

    fn harness() -> (World, MemoryTransport, RequestIds) {
        (World::new(), MemoryTransport::new(), RequestIds::new())
    }

    #[test]
    fn merges_one_area_and_one_line_batch() {
        let (mut world, mut transport, mut ids) = harness();
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(polygon_and_line_doc()),
            VectorLayerOptions {
                output: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        assert_eq!(layer.state(), LayerState::Ready);
        let area = layer.area_batch().expect("area batch");
        let line = layer.line_batch().expect("line batch");
        // One quad's worth of triangles and one segment.
        assert_eq!(area.vertex_count(), 6);
        assert_eq!(line.vertex_count(), 2);
        assert_eq!(world.render_count(), 2);
        // interactive defaults to false: no picking geometry anywhere.
        assert_eq!(world.picking_count(), 0);
        assert!(layer.picking_nodes().is_empty());
        assert!(area.picking_ids.is_none());
    }

    #[test]
    fn filter_excludes_line_features_entirely() {
        let (mut world, mut transport, mut ids) = harness();
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(polygon_and_line_doc()),
            VectorLayerOptions {
                output: true,
                filter: Some(Box::new(|f| {
                    matches!(f.geometry, Some(formats::Geometry::Polygon(_)))
                })),
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        assert!(layer.line_batch().is_none());
        assert_eq!(layer.area_batch().expect("area batch").vertex_count(), 6);
        // The filtered feature left no trace at all.
        assert_eq!(layer.features().len(), 1);
        assert_eq!(world.render_count(), 1);
    }

    #[test]
    fn failed_fetch_leaves_layer_without_content() {
        let (mut world, mut transport, mut ids) = harness();
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Url("mem://unreachable.json".to_string()),
            VectorLayerOptions {
                output: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);
        assert!(matches!(layer.state(), LayerState::Requesting(_)));

        for (req, outcome) in transport.take_ready() {
            layer.complete_fetch(req, outcome, &mut world);
        }

        // Request reference cleared, nothing rendered, nothing thrown.
        assert_eq!(layer.state(), LayerState::Idle);
        assert!(layer.area_batch().is_none());
        assert!(layer.line_batch().is_none());
        assert_eq!(world.render_count(), 0);
    }

    #[test]
    fn successful_fetch_processes_like_inline_data() {
        let (mut world, mut transport, mut ids) = harness();
        transport.route("mem://data.json", Ok(polygon_and_line_doc()));
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Url("mem://data.json".to_string()),
            VectorLayerOptions {
                output: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        for (req, outcome) in transport.take_ready() {
            layer.complete_fetch(req, outcome, &mut world);
        }

        assert_eq!(layer.state(), LayerState::Ready);
        assert!(layer.area_batch().is_some());
        assert!(layer.line_batch().is_some());
    }

    #[test]
    fn destroy_cancels_pending_fetch_and_late_completion_is_a_noop() {
        let (mut world, mut transport, mut ids) = harness();
        transport.route("mem://data.json", Ok(polygon_and_line_doc()));
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Url("mem://data.json".to_string()),
            VectorLayerOptions {
                output: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);
        let LayerState::Requesting(req) = layer.state() else {
            panic!("expected a pending request");
        };

        layer.destroy(&mut world, &mut transport);
        assert_eq!(transport.aborted(), &[req]);
        assert_eq!(transport.pending_count(), 0);

        // A completion that still fires afterwards must not process.
        layer.complete_fetch(req, Ok(polygon_and_line_doc()), &mut world);
        assert_eq!(layer.state(), LayerState::Idle);
        assert!(layer.area_batch().is_none());
        assert!(layer.features().is_empty());
        assert_eq!(world.render_count(), 0);
    }

    #[test]
    fn destroy_is_safe_before_and_after_processing() {
        let (mut world, mut transport, mut ids) = harness();
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(polygon_and_line_doc()),
            VectorLayerOptions {
                output: true,
                interactive: true,
                ..Default::default()
            },
        );
        // Destroy before attach: nothing to release.
        layer.destroy(&mut world, &mut transport);
        assert!(transport.aborted().is_empty());

        // Attach after destroy is a no-op (the source is gone).
        layer.attach(&mut world, &mut transport, &mut ids);
        assert_eq!(layer.state(), LayerState::Idle);
        assert_eq!(world.render_count(), 0);
    }

    #[test]
    fn destroy_releases_scene_nodes() {
        let (mut world, mut transport, mut ids) = harness();
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(polygon_and_line_doc()),
            VectorLayerOptions {
                output: true,
                interactive: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);
        assert!(world.render_count() > 0);
        assert!(world.picking_count() > 0);

        layer.destroy(&mut world, &mut transport);
        assert_eq!(world.render_count(), 0);
        assert_eq!(world.picking_count(), 0);
        assert!(layer.render_nodes().is_empty());
        assert!(layer.picking_nodes().is_empty());
    }

    #[test]
    fn second_attach_is_a_noop() {
        let (mut world, mut transport, mut ids) = harness();
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(polygon_and_line_doc()),
            VectorLayerOptions {
                output: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);
        layer.attach(&mut world, &mut transport, &mut ids);

        assert_eq!(world.render_count(), 2);
        assert_eq!(layer.render_nodes().len(), 2);
    }

    #[test]
    fn interactive_line_layer_gets_widened_picking_twin() {
        let (mut world, mut transport, mut ids) = harness();
        let doc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [0.001, 0.001]]}
            }]
        });
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(doc),
            VectorLayerOptions {
                output: true,
                interactive: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        let line = layer.line_batch().expect("line batch");
        assert_eq!(layer.picking_nodes().len(), 1);
        let (_, picking) = world.picking_nodes().next().expect("picking node");
        // Positions are shared by reference with the render batch.
        assert!(Arc::ptr_eq(&picking.geometry.positions, &line.positions));
        assert!(picking.geometry.picking_ids.is_some());
    }

    #[test]
    fn hook_sees_each_dispatched_feature_before_merging() {
        let (mut world, mut transport, mut ids) = harness();
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(polygon_and_line_doc()),
            VectorLayerOptions {
                output: true,
                on_each_feature: Some(Box::new(move |feature, layer| {
                    let name = feature.property_str("name").unwrap_or("?");
                    sink.borrow_mut()
                        .push(format!("{name}:{}", layer.vertex_count()));
                })),
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        // Input order, geometry already built when the hook runs.
        assert_eq!(&*seen.borrow(), &["plaza:6", "path:2"]);
    }

    #[test]
    fn degenerate_features_are_skipped_silently() {
        let (mut world, mut transport, mut ids) = harness();
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": null},
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}
                },
                {
                    "type": "Feature",
                    "properties": {"name": "kept"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[
                            [0.0, 0.0], [0.001, 0.0], [0.001, 0.001], [0.0, 0.0]
                        ]]
                    }
                }
            ]
        });
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(doc),
            VectorLayerOptions {
                output: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        // All three features survive extraction; only one grew geometry.
        assert_eq!(layer.features().len(), 3);
        assert_eq!(layer.feature_layers().len(), 1);
        let built = &layer.feature_layers()[0];
        assert_eq!(built.feature_index, 2);
        let source = layer.feature_for(built).expect("back-reference");
        assert_eq!(source.property_str("name"), Some("kept"));
    }

    #[test]
    fn non_output_layer_builds_geometry_but_defers_merge() {
        let (mut world, mut transport, mut ids) = harness();
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(polygon_and_line_doc()),
            VectorLayerOptions {
                output: false,
                interactive: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        assert_eq!(layer.feature_layers().len(), 2);
        assert!(layer.area_batch().is_none());
        assert!(layer.line_batch().is_none());
        assert_eq!(world.render_count(), 0);
        assert_eq!(world.picking_count(), 0);
    }

    #[test]
    fn child_source_world_suppresses_merge_even_with_output() {
        let mut world = World::child_source();
        let mut transport = MemoryTransport::new();
        let mut ids = RequestIds::new();
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(polygon_and_line_doc()),
            VectorLayerOptions {
                output: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        assert_eq!(layer.feature_layers().len(), 2);
        assert!(layer.area_batch().is_none());
        assert_eq!(world.render_count(), 0);
    }

    #[test]
    fn per_feature_style_drives_per_vertex_colors() {
        let (mut world, mut transport, mut ids) = harness();
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"kind": "water"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[
                            [0.0, 0.0], [0.001, 0.0], [0.001, 0.001], [0.0, 0.0]
                        ]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"kind": "park"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[
                            [0.01, 0.01], [0.011, 0.01], [0.011, 0.011], [0.01, 0.01]
                        ]]
                    }
                }
            ]
        });
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(doc),
            VectorLayerOptions {
                output: true,
                style: StyleSpec::PerFeature(Box::new(|f| LayerStyle {
                    color: if f.property_str("kind") == Some("water") {
                        [0.0, 0.0, 1.0]
                    } else {
                        [0.0, 1.0, 0.0]
                    },
                    ..Default::default()
                })),
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        let area = layer.area_batch().expect("area batch");
        // Each triangle (3 vertices) keeps its feature's color.
        assert_eq!(&area.colors[..3], &[0.0, 0.0, 1.0]);
        let second = area.vertex_count() / 2 * 3;
        assert_eq!(&area.colors[second..second + 3], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn malformed_document_produces_no_partial_batch() {
        let (mut world, mut transport, mut ids) = harness();
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[
                            [0.0, 0.0], [0.001, 0.0], [0.001, 0.001], [0.0, 0.0]
                        ]]
                    }
                },
                {"type": "NotAFeature"}
            ]
        });
        let mut layer = VectorLayer::new(
            1,
            VectorSource::Document(doc),
            VectorLayerOptions {
                output: true,
                ..Default::default()
            },
        );
        layer.attach(&mut world, &mut transport, &mut ids);

        assert_eq!(layer.state(), LayerState::Idle);
        assert!(layer.area_batch().is_none());
        assert!(layer.features().is_empty());
        assert_eq!(world.render_count(), 0);
    }
}
