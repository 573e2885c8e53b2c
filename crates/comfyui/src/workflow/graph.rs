//! Node graph representation and the per-call builder.
//!
//! A [`Graph`] serializes to the service's API prompt format:
//!
//! ```json
//! {"1": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "..."}},
//!  "2": {"class_type": "CLIPTextEncode", "inputs": {"text": "...", "clip": ["1", 1]}}}
//! ```
//!
//! Links are only obtainable from [`GraphBuilder::add`], so every input
//! reference points at a node added earlier and the graph is acyclic by
//! construction.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeTuple, Serializer};

/// Synthetic node id, unique within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn get(self) -> u32 {
        self.0
    }

    /// Reference to output slot `slot` of this node.
    pub fn out(self, slot: u32) -> Output {
        Output { node: self, slot }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `(node, output slot)` pair, serialized as `["<id>", slot]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub node: NodeId,
    pub slot: u32,
}

impl Serialize for Output {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.node.0.to_string())?;
        tuple.serialize_element(&self.slot)?;
        tuple.end()
    }
}

/// A node input: a literal parameter or a link to another node's output.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Input {
    Link(Output),
    Value(serde_json::Value),
}

impl From<Output> for Input {
    fn from(output: Output) -> Self {
        Input::Link(output)
    }
}

macro_rules! value_input {
    ($($t:ty),+) => {
        $(impl From<$t> for Input {
            fn from(value: $t) -> Self {
                Input::Value(serde_json::Value::from(value))
            }
        })+
    };
}

value_input!(&str, String, bool, u32, u64, i64, f64);

/// One operation in the graph.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Node {
    pub class_type: String,
    pub inputs: BTreeMap<String, Input>,
}

impl Node {
    /// Links feeding this node, as `(input name, output)` pairs.
    pub fn links(&self) -> impl Iterator<Item = (&str, Output)> {
        self.inputs.iter().filter_map(|(name, input)| match input {
            Input::Link(output) => Some((name.as_str(), *output)),
            Input::Value(_) => None,
        })
    }

    /// Literal value of an input, if present.
    pub fn value(&self, name: &str) -> Option<&serde_json::Value> {
        match self.inputs.get(name)? {
            Input::Value(v) => Some(v),
            Input::Link(_) => None,
        }
    }
}

/// An ordered operation DAG keyed by node id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Graph {
    nodes: BTreeMap<u32, Node>,
}

impl Serialize for Graph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Keys are emitted as strings in ascending numeric order.
        serializer.collect_map(self.nodes.iter().map(|(id, node)| (id.to_string(), node)))
    }
}

impl Graph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id.0)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (NodeId(*id), node))
    }

    /// Operation names in id order.
    pub fn class_types(&self) -> Vec<&str> {
        self.nodes.values().map(|n| n.class_type.as_str()).collect()
    }

    /// All edges as `(from, slot, to, input name)`.
    pub fn edges(&self) -> Vec<(NodeId, u32, NodeId, String)> {
        self.nodes()
            .flat_map(|(to, node)| {
                node.links()
                    .map(move |(name, out)| (out.node, out.slot, to, name.to_string()))
            })
            .collect()
    }

    /// First node of the given operation.
    pub fn find(&self, class_type: &str) -> Option<(NodeId, &Node)> {
        self.nodes().find(|(_, n)| n.class_type == class_type)
    }

    /// API prompt JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Builds one graph. Ids start at 1 and the builder is consumed by
/// [`finish`](Self::finish), so no id state outlives a build.
#[derive(Debug)]
pub struct GraphBuilder {
    next_id: u32,
    nodes: BTreeMap<u32, Node>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            nodes: BTreeMap::new(),
        }
    }

    /// Append a node and return its id.
    pub fn add<'a>(
        &mut self,
        class_type: &str,
        inputs: impl IntoIterator<Item = (&'a str, Input)>,
    ) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                class_type: class_type.to_string(),
                inputs: inputs
                    .into_iter()
                    .map(|(name, input)| (name.to_string(), input))
                    .collect(),
            },
        );
        NodeId(id)
    }

    pub fn finish(self) -> Graph {
        Graph { nodes: self.nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_links_serialize_as_pairs() {
        let mut b = GraphBuilder::new();
        let loader = b.add("CheckpointLoaderSimple", [("ckpt_name", "model.safetensors".into())]);
        let text = b.add(
            "CLIPTextEncode",
            [("text", "a cat".into()), ("clip", loader.out(1).into())],
        );
        assert_eq!(loader.get(), 1);
        assert_eq!(text.get(), 2);

        let json = b.finish().to_json();
        assert_eq!(json["2"]["inputs"]["clip"], serde_json::json!(["1", 1]));
        assert_eq!(json["1"]["class_type"], "CheckpointLoaderSimple");
    }

    #[test]
    fn serialized_keys_are_in_numeric_order() {
        let mut b = GraphBuilder::new();
        for i in 0..12 {
            b.add("Noop", [("i", Input::from(i as u32))]);
        }
        let text = serde_json::to_string(&b.finish()).unwrap();
        let pos_2 = text.find("\"2\":").unwrap();
        let pos_10 = text.find("\"10\":").unwrap();
        assert!(pos_2 < pos_10);
    }

    #[test]
    fn edges_list_every_link() {
        let mut b = GraphBuilder::new();
        let a = b.add("A", []);
        let c = b.add("C", [("x", a.out(0).into()), ("y", a.out(2).into())]);
        let graph = b.finish();
        let edges = graph.edges();
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&(a, 2, c, "y".to_string())));
    }
}
