//! Lazily populated arena of decoded structural nodes.
//!
//! Decoders insert a node the first time they read its header. Payloads stay
//! `Unvisited` until the decoder either descends into the node, materializes
//! it as a leaf, or skips over it. Nodes that were never reached do not exist
//! in the tree at all.

use crate::mp4::BoxType;
use bytes::Bytes;
use serde::Serialize;

/// Index of a node in a [`StructureTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Type tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// ISO-BMFF box
    Box(BoxType),
    /// EBML element id, marker bits included
    Element(u32),
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Box(box_type) => write!(f, "{box_type}"),
            NodeKind::Element(id) => write!(f, "0x{id:X}"),
        }
    }
}

/// Payload state of a node.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Unvisited,
    Skipped,
    Leaf(Bytes),
    Children(Vec<NodeId>),
}

/// One decoded box or element header.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Absolute offset of the header.
    pub offset: u64,
    pub header_size: u64,
    /// Total size including the header, `None` for unknown-size elements.
    pub size: Option<u64>,
    pub parent: Option<NodeId>,
    pub payload: Payload,
}

impl Node {
    /// Absolute offset of the payload.
    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_size
    }

    /// Absolute end offset (exclusive), if the size is known.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.offset + size)
    }

    /// Payload size, if the size is known.
    pub fn payload_size(&self) -> Option<u64> {
        self.size.map(|size| size - self.header_size)
    }
}

/// Arena of visited nodes in visit order.
#[derive(Debug, Clone, Default)]
pub struct StructureTree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl StructureTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a header. The node is appended to its parent's children.
    pub fn insert(
        &mut self,
        parent: Option<NodeId>,
        kind: NodeKind,
        offset: u64,
        header_size: u64,
        size: Option<u64>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            offset,
            header_size,
            size,
            parent,
            payload: Payload::Unvisited,
        });

        match parent {
            Some(parent) => {
                let parent = &mut self.nodes[parent.0];
                match &mut parent.payload {
                    Payload::Children(children) => children.push(id),
                    payload => *payload = Payload::Children(vec![id]),
                }
            }
            None => self.roots.push(id),
        }
        id
    }

    /// Mark a node as a container whose children will follow.
    pub fn open(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        if !matches!(node.payload, Payload::Children(_)) {
            node.payload = Payload::Children(Vec::new());
        }
    }

    pub fn set_leaf(&mut self, id: NodeId, data: Bytes) {
        self.nodes[id.0].payload = Payload::Leaf(data);
    }

    pub fn mark_skipped(&mut self, id: NodeId) {
        self.nodes[id.0].payload = Payload::Skipped;
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].payload {
            Payload::Children(children) => children,
            _ => &[],
        }
    }

    /// Serializable outline of the visited structure.
    pub fn summarize(&self) -> Vec<NodeSummary> {
        self.roots.iter().map(|id| self.summarize_node(*id)).collect()
    }

    fn summarize_node(&self, id: NodeId) -> NodeSummary {
        let node = &self.nodes[id.0];
        let (state, children) = match &node.payload {
            Payload::Unvisited => (NodeState::Unvisited, Vec::new()),
            Payload::Skipped => (NodeState::Skipped, Vec::new()),
            Payload::Leaf(_) => (NodeState::Leaf, Vec::new()),
            Payload::Children(children) => (
                NodeState::Container,
                children.iter().map(|c| self.summarize_node(*c)).collect(),
            ),
        };
        NodeSummary {
            kind: node.kind.to_string(),
            offset: node.offset,
            size: node.size,
            state,
            children,
        }
    }
}

/// Visit state reported in a [`NodeSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Unvisited,
    Skipped,
    Leaf,
    Container,
}

/// Owned, serializable view of one node and its visited descendants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub kind: String,
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub state: NodeState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSummary>,
}
