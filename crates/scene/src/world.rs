use crate::node::Node;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Retained scene container.
///
/// Owns all attached nodes; layers keep `NodeId` handles sufficient for
/// teardown without assuming the container's internal structure. The
/// picking subgraph is separate from the render list and is never drawn.
#[derive(Debug, Default)]
pub struct World {
    nodes: Vec<Option<Node>>,
    render: Vec<NodeId>,
    picking: Vec<NodeId>,
    output_owner: bool,
}

impl World {
    pub fn new() -> Self {
        Self {
            output_owner: true,
            ..Self::default()
        }
    }

    /// A world used purely as a feature-collection source for a parent
    /// aggregator; layers attached to it defer merging to the parent.
    pub fn child_source() -> Self {
        Self::default()
    }

    /// True if layers attached here perform the final merge/attach.
    pub fn is_output_owner(&self) -> bool {
        self.output_owner
    }

    pub fn add_render_node(&mut self, node: Node) -> NodeId {
        let id = self.insert(node);
        self.render.push(id);
        id
    }

    pub fn add_picking_root(&mut self, node: Node) -> NodeId {
        let id = self.insert(node);
        self.picking.push(id);
        id
    }

    /// Removes a node; a stale or already-removed id is a no-op.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(slot) = self.nodes.get_mut(id.index() as usize) else {
            return false;
        };
        if slot.is_none() {
            return false;
        }
        *slot = None;
        self.render.retain(|n| *n != id);
        self.picking.retain(|n| *n != id);
        true
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index() as usize)?.as_ref()
    }

    pub fn render_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.render
            .iter()
            .filter_map(|id| Some((*id, self.node(*id)?)))
    }

    pub fn picking_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.picking
            .iter()
            .filter_map(|id| Some((*id, self.node(*id)?)))
    }

    pub fn render_count(&self) -> usize {
        self.render.len()
    }

    pub fn picking_count(&self) -> usize {
        self.picking.len()
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }
}
