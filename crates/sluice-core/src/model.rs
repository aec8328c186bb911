use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named entity in the flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub name: String,
    /// Position in [`FlowGraph::nodes`].
    pub index: usize,
    /// True for nodes synthesized by the normalizer (the shared entry node).
    #[serde(default)]
    pub synthetic: bool,
}

/// A directed, weighted edge referencing its endpoints by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowLink {
    pub source: String,
    pub target: String,
    pub value: f64,
    #[serde(default)]
    pub synthetic: bool,
}

/// Normalized node/link collections. Rebuilt from scratch for every payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub links: Vec<FlowLink>,
}

impl FlowGraph {
    /// Name to index lookup. A repeated name resolves to its last occurrence.
    pub fn name_index(&self) -> FxHashMap<&str, usize> {
        let mut map = FxHashMap::default();
        map.reserve(self.nodes.len());
        for (i, n) in self.nodes.iter().enumerate() {
            map.insert(n.name.as_str(), i);
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadLink {
    pub source: String,
    pub target: String,
    pub value: f64,
}

/// The wire shape handed to the normalizer:
/// `{ nodes: [{name}], links: [{source, target, value}], entry_pages?: {page: count} }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub nodes: Vec<PayloadNode>,
    pub links: Vec<PayloadLink>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub entry_pages: IndexMap<String, u64>,
}

impl Payload {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
