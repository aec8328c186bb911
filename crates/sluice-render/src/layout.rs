//! Column assignment and node/link positioning.
//!
//! Layout is split in two phases so a resize can re-run positioning without reclassifying:
//! [`assign_columns`] decides which column every valid node lives in, [`layout`] turns that into
//! coordinates for a given canvas.

use serde::{Deserialize, Serialize};
use sluice_core::{CycleBreak, FlowGraph, SankeyConfig};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    pub width: f64,
    pub height: f64,
    pub node_width: f64,
    /// Vertical gap between stacked nodes.
    pub node_padding: f64,
    pub min_node_height: f64,
    /// Node height per unit of flow.
    pub height_scale: f64,
    /// Band thickness per unit of flow, before clamping to the endpoint heights.
    pub link_scale: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 500.0,
            node_width: 30.0,
            node_padding: 20.0,
            min_node_height: 10.0,
            height_scale: 0.6,
            link_scale: 1.2,
        }
    }
}

impl LayoutOptions {
    pub fn from_config(cfg: &SankeyConfig) -> Self {
        let d = Self::default();
        let raw = Self {
            width: cfg.get_f64("layout.width").unwrap_or(d.width),
            height: cfg.get_f64("layout.height").unwrap_or(d.height),
            node_width: cfg.get_f64("layout.nodeWidth").unwrap_or(d.node_width),
            node_padding: cfg.get_f64("layout.nodePadding").unwrap_or(d.node_padding),
            min_node_height: cfg
                .get_f64("layout.minNodeHeight")
                .unwrap_or(d.min_node_height),
            height_scale: cfg.get_f64("layout.heightScale").unwrap_or(d.height_scale),
            link_scale: cfg.get_f64("layout.linkScale").unwrap_or(d.link_scale),
        };
        let clamped = raw.sanitized();
        if clamped != raw {
            tracing::warn!(?raw, "non-finite or negative layout options adjusted");
        }
        clamped
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self.sanitized()
    }

    /// Clamps every field to a finite, non-negative value.
    ///
    /// Stacked nodes must keep distinct `y` values, so when both `node_padding` and
    /// `min_node_height` end up at 0 the default minimum height is restored.
    pub fn sanitized(self) -> Self {
        fn clamp(v: f64) -> f64 {
            if v.is_finite() { v.max(0.0) } else { 0.0 }
        }
        let node_padding = clamp(self.node_padding);
        let mut min_node_height = clamp(self.min_node_height);
        if node_padding == 0.0 && min_node_height == 0.0 {
            min_node_height = Self::default().min_node_height;
        }
        Self {
            width: clamp(self.width),
            height: clamp(self.height),
            node_width: clamp(self.node_width),
            node_padding,
            min_node_height,
            height_scale: clamp(self.height_scale),
            link_scale: clamp(self.link_scale),
        }
    }
}

/// Maps a node name to a funnel stage.
pub trait StageClassifier {
    fn stage_of(&self, name: &str) -> Option<usize>;

    /// Stage used for names [`StageClassifier::stage_of`] does not recognise.
    fn fallback_stage(&self) -> usize {
        0
    }
}

impl<F> StageClassifier for F
where
    F: Fn(&str) -> Option<usize>,
{
    fn stage_of(&self, name: &str) -> Option<usize> {
        self(name)
    }
}

/// Case-insensitive substring matching against ordered keyword lists; the first stage with a
/// matching keyword wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordStages {
    stages: Vec<Vec<String>>,
    fallback: usize,
}

impl KeywordStages {
    pub fn new(stages: Vec<Vec<String>>, fallback: usize) -> Self {
        let stages = stages
            .into_iter()
            .map(|kws| kws.into_iter().map(|k| k.to_lowercase()).collect())
            .collect();
        Self { stages, fallback }
    }

    /// Reads `layout.stages` (an array of keyword arrays) and `layout.fallbackStage`.
    pub fn from_config(cfg: &SankeyConfig) -> Option<Self> {
        let stages = cfg.get("layout.stages")?.as_array()?;
        let stages: Vec<Vec<String>> = stages
            .iter()
            .map(|s| {
                s.as_array()
                    .map(|kws| {
                        kws.iter()
                            .filter_map(|k| k.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();
        if stages.is_empty() {
            return None;
        }
        let fallback = cfg.get_usize("layout.fallbackStage").unwrap_or(0);
        Some(Self::new(stages, fallback))
    }
}

impl StageClassifier for KeywordStages {
    fn stage_of(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.stages
            .iter()
            .position(|kws| kws.iter().any(|k| !k.is_empty() && name.contains(k.as_str())))
    }

    fn fallback_stage(&self) -> usize {
        self.fallback
    }
}

#[derive(Clone, Default)]
pub enum ColumnStrategy {
    /// Longest path from any source over the surviving links.
    #[default]
    LongestPath,
    Stages(Arc<dyn StageClassifier + Send + Sync>),
}

impl std::fmt::Debug for ColumnStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LongestPath => f.write_str("LongestPath"),
            Self::Stages(_) => f.write_str("Stages(..)"),
        }
    }
}

impl ColumnStrategy {
    pub fn stages(classifier: impl StageClassifier + Send + Sync + 'static) -> Self {
        Self::Stages(Arc::new(classifier))
    }

    pub fn from_config(cfg: &SankeyConfig) -> Self {
        match KeywordStages::from_config(cfg) {
            Some(stages) => Self::stages(stages),
            None => Self::LongestPath,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAssignment {
    /// Dense column per node; `None` for nodes the cycle breaker dropped.
    pub columns: Vec<Option<usize>>,
    pub column_count: usize,
}

impl ColumnAssignment {
    pub fn column_of(&self, node: usize) -> Option<usize> {
        self.columns.get(node).copied().flatten()
    }
}

pub fn assign_columns(
    graph: &FlowGraph,
    cycles: &CycleBreak,
    strategy: &ColumnStrategy,
) -> ColumnAssignment {
    let n = graph.nodes.len();
    let keys: Vec<Option<usize>> = match strategy {
        ColumnStrategy::LongestPath => {
            let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
            for l in &cycles.links {
                outgoing[l.source].push(l.target);
            }
            let mut depth = vec![0usize; n];
            for &u in &cycles.order {
                for &v in &outgoing[u] {
                    depth[v] = depth[v].max(depth[u] + 1);
                }
            }
            (0..n)
                .map(|i| cycles.is_valid(i).then_some(depth[i]))
                .collect()
        }
        ColumnStrategy::Stages(classifier) => graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                cycles.is_valid(i).then(|| {
                    classifier
                        .stage_of(&node.name)
                        .unwrap_or_else(|| classifier.fallback_stage())
                })
            })
            .collect(),
    };

    // Renumber the keys densely so stages nobody landed in leave no gap.
    let present: BTreeSet<usize> = keys.iter().flatten().copied().collect();
    let rank = |key: usize| present.range(..key).count();
    ColumnAssignment {
        columns: keys.iter().map(|k| k.map(rank)).collect(),
        column_count: present.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaidOutNode {
    pub name: String,
    pub index: usize,
    pub value: f64,
    pub column: usize,
    /// Centre of the node rectangle.
    pub x: f64,
    pub y: f64,
    pub height: f64,
    pub synthetic: bool,
}

impl LaidOutNode {
    pub fn top(&self) -> f64 {
        self.y - self.height / 2.0
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaidOutLink {
    /// Position of the link in the normalized link list.
    pub link: usize,
    pub source_index: usize,
    pub target_index: usize,
    pub value: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub band_thickness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SankeyLayout {
    pub width: f64,
    pub height: f64,
    pub node_width: f64,
    pub node_padding: f64,
    pub column_count: usize,
    /// Valid nodes in index order.
    pub nodes: Vec<LaidOutNode>,
    /// Surviving links in original order.
    pub links: Vec<LaidOutLink>,
    pub bounds: Option<Bounds>,
}

impl SankeyLayout {
    pub fn node(&self, index: usize) -> Option<&LaidOutNode> {
        self.nodes
            .binary_search_by_key(&index, |n| n.index)
            .ok()
            .map(|pos| &self.nodes[pos])
    }
}

fn f64_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Positions the valid nodes and the surviving links on a `width x height` canvas.
///
/// Node values are the sum of incoming and outgoing surviving flow, so a pass-through node shows
/// total traffic rather than net.
pub fn layout(
    graph: &FlowGraph,
    cycles: &CycleBreak,
    columns: &ColumnAssignment,
    options: &LayoutOptions,
) -> SankeyLayout {
    let o = options.sanitized();
    let n = graph.nodes.len();

    let mut value = vec![0.0_f64; n];
    for l in &cycles.links {
        value[l.source] += l.value;
        value[l.target] += l.value;
    }
    let node_height = |i: usize| (value[i] * o.height_scale).max(o.min_node_height);

    let column_count = columns.column_count;
    let mut stacks: Vec<Vec<usize>> = vec![Vec::new(); column_count];
    for i in 0..n {
        if let Some(c) = columns.column_of(i).filter(|&c| c < column_count) {
            stacks[c].push(i);
        }
    }

    let column_x = |c: usize| {
        if column_count <= 1 {
            o.width / 2.0
        } else {
            let step = (o.width - o.node_width) / (column_count as f64 - 1.0);
            c as f64 * step + o.node_width / 2.0
        }
    };

    let mut x = vec![0.0_f64; n];
    let mut y = vec![0.0_f64; n];
    for (c, stack) in stacks.iter_mut().enumerate() {
        stack.sort_by(|&a, &b| f64_cmp(value[b], value[a]).then_with(|| a.cmp(&b)));

        let total: f64 = stack.iter().map(|&i| node_height(i)).sum::<f64>()
            + o.node_padding * stack.len().saturating_sub(1) as f64;
        let mut top = (o.height - total) / 2.0;
        for &i in stack.iter() {
            let h = node_height(i);
            x[i] = column_x(c);
            y[i] = top + h / 2.0;
            top += h + o.node_padding;
        }
    }

    let nodes: Vec<LaidOutNode> = graph
        .nodes
        .iter()
        .enumerate()
        .filter_map(|(i, node)| {
            let column = columns.column_of(i).filter(|&c| c < column_count)?;
            Some(LaidOutNode {
                name: node.name.clone(),
                index: i,
                value: value[i],
                column,
                x: x[i],
                y: y[i],
                height: node_height(i),
                synthetic: node.synthetic,
            })
        })
        .collect();

    let half = o.node_width / 2.0;
    let links: Vec<LaidOutLink> = cycles
        .links
        .iter()
        .filter(|l| columns.column_of(l.source).is_some() && columns.column_of(l.target).is_some())
        .map(|l| {
            let cap = node_height(l.source).min(node_height(l.target));
            LaidOutLink {
                link: l.link,
                source_index: l.source,
                target_index: l.target,
                value: l.value,
                x1: x[l.source] + half,
                y1: y[l.source],
                x2: x[l.target] - half,
                y2: y[l.target],
                band_thickness: (l.value * o.link_scale).min(cap),
            }
        })
        .collect();

    let bounds = nodes
        .iter()
        .map(|nd| Bounds {
            min_x: nd.x - half,
            min_y: nd.top(),
            max_x: nd.x + half,
            max_y: nd.bottom(),
        })
        .reduce(|a, b| Bounds {
            min_x: a.min_x.min(b.min_x),
            min_y: a.min_y.min(b.min_y),
            max_x: a.max_x.max(b.max_x),
            max_y: a.max_y.max(b.max_y),
        });

    SankeyLayout {
        width: o.width,
        height: o.height,
        node_width: o.node_width,
        node_padding: o.node_padding,
        column_count,
        nodes,
        links,
        bounds,
    }
}

/// [`assign_columns`] followed by [`layout`].
pub fn layout_sankey(
    graph: &FlowGraph,
    cycles: &CycleBreak,
    strategy: &ColumnStrategy,
    options: &LayoutOptions,
) -> SankeyLayout {
    let columns = assign_columns(graph, cycles, strategy);
    layout(graph, cycles, &columns, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::{NormalizeOptions, prepare};

    fn prepared(payload: serde_json::Value) -> (FlowGraph, CycleBreak) {
        prepare(&payload, &NormalizeOptions::default()).unwrap()
    }

    #[test]
    fn two_node_flow_matches_reference_scales() {
        let (g, c) = prepared(json!({
            "nodes": [{"name": "A"}, {"name": "B"}],
            "links": [{"source": "A", "target": "B", "value": 10}],
        }));
        let out = layout_sankey(&g, &c, &ColumnStrategy::LongestPath, &LayoutOptions::default());
        assert_eq!(out.column_count, 2);
        let a = out.node(0).unwrap();
        let b = out.node(1).unwrap();
        assert_eq!(a.value, 10.0);
        assert_eq!(b.value, 10.0);
        assert_eq!(a.height, 10.0);
        assert_eq!(a.x, 15.0);
        assert_eq!(b.x, 785.0);
        assert_eq!(a.y, 250.0);

        let l = &out.links[0];
        assert_eq!(l.band_thickness, (10.0_f64 * 1.2).min(a.height.min(b.height)));
        assert_eq!((l.x1, l.y1, l.x2, l.y2), (30.0, 250.0, 770.0, 250.0));
    }

    #[test]
    fn single_column_is_centred_horizontally() {
        let (g, c) = prepared(json!({"nodes": [{"name": "A"}, {"name": "B"}], "links": []}));
        let out = layout_sankey(&g, &c, &ColumnStrategy::LongestPath, &LayoutOptions::default());
        assert_eq!(out.column_count, 1);
        assert!(out.nodes.iter().all(|n| n.x == 400.0));
        assert!(out.nodes.iter().all(|n| n.height == 10.0));
    }

    #[test]
    fn longest_path_pushes_shortcut_targets_right() {
        let (g, c) = prepared(json!({
            "nodes": [{"name": "A"}, {"name": "B"}, {"name": "C"}],
            "links": [
                {"source": "A", "target": "C", "value": 1},
                {"source": "A", "target": "B", "value": 1},
                {"source": "B", "target": "C", "value": 1},
            ],
        }));
        let cols = assign_columns(&g, &c, &ColumnStrategy::LongestPath);
        assert_eq!(cols.columns, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn stacks_sort_by_value_then_index() {
        let (g, c) = prepared(json!({
            "nodes": [{"name": "S"}, {"name": "small"}, {"name": "big"}, {"name": "tie"}],
            "links": [
                {"source": "S", "target": "small", "value": 2},
                {"source": "S", "target": "big", "value": 9},
                {"source": "S", "target": "tie", "value": 2},
            ],
        }));
        let out = layout_sankey(&g, &c, &ColumnStrategy::LongestPath, &LayoutOptions::default());
        let mut col1: Vec<&LaidOutNode> = out.nodes.iter().filter(|n| n.column == 1).collect();
        col1.sort_by(|a, b| f64_cmp(a.y, b.y));
        let order: Vec<&str> = col1.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["big", "small", "tie"]);
        for pair in col1.windows(2) {
            assert!(pair[1].top() - pair[0].bottom() >= 20.0 - 1e-9);
        }
    }

    #[test]
    fn stage_classifier_groups_and_compacts_columns() {
        let (g, c) = prepared(json!({
            "nodes": [{"name": "Landing"}, {"name": "Checkout"}, {"name": "Blog"}],
            "links": [
                {"source": "Landing", "target": "Checkout", "value": 3},
                {"source": "Blog", "target": "Checkout", "value": 1},
            ],
        }));
        let strategy = ColumnStrategy::stages(|name: &str| match name {
            "Landing" | "Blog" => Some(0),
            "Checkout" => Some(7),
            _ => None,
        });
        let cols = assign_columns(&g, &c, &strategy);
        assert_eq!(cols.columns, vec![Some(0), Some(1), Some(0)]);
        assert_eq!(cols.column_count, 2);
    }

    #[test]
    fn keyword_stages_read_from_config() {
        let cfg = SankeyConfig::with_overrides(&json!({
            "layout": {
                "stages": [["home"], ["login", "search"], ["model"], ["submit"]],
                "fallbackStage": 2,
            },
        }));
        let stages = KeywordStages::from_config(&cfg).unwrap();
        assert_eq!(stages.stage_of("Home"), Some(0));
        assert_eq!(stages.stage_of("Search results"), Some(1));
        assert_eq!(stages.stage_of("Submit"), Some(3));
        assert_eq!(stages.stage_of("pricing"), None);
        assert_eq!(stages.fallback_stage(), 2);
        assert!(matches!(ColumnStrategy::from_config(&cfg), ColumnStrategy::Stages(_)));
        assert!(matches!(
            ColumnStrategy::from_config(&SankeyConfig::defaults()),
            ColumnStrategy::LongestPath
        ));
    }

    #[test]
    fn cyclic_nodes_are_not_laid_out() {
        let (g, c) = prepared(json!({
            "nodes": [{"name": "A"}, {"name": "B"}, {"name": "C"}, {"name": "D"}],
            "links": [
                {"source": "A", "target": "B", "value": 1},
                {"source": "B", "target": "A", "value": 1},
                {"source": "C", "target": "D", "value": 4},
            ],
        }));
        let out = layout_sankey(&g, &c, &ColumnStrategy::LongestPath, &LayoutOptions::default());
        let names: Vec<&str> = out.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["C", "D"]);
        assert_eq!(out.links.len(), 1);
    }

    #[test]
    fn options_are_sanitized() {
        let o = LayoutOptions::default().with_size(f64::NAN, -5.0);
        assert_eq!((o.width, o.height), (0.0, 0.0));
        let cfg = SankeyConfig::with_overrides(&json!({"layout": {"nodeWidth": 12}}));
        assert_eq!(LayoutOptions::from_config(&cfg).node_width, 12.0);
    }

    #[test]
    fn zero_padding_and_zero_min_height_keep_stacks_apart() {
        let cfg = SankeyConfig::with_overrides(&json!({
            "layout": {"nodePadding": 0, "minNodeHeight": 0},
        }));
        let o = LayoutOptions::from_config(&cfg);
        assert_eq!(o.node_padding, 0.0);
        assert_eq!(o.min_node_height, 10.0);

        let (g, c) = prepared(json!({"nodes": [{"name": "A"}, {"name": "B"}], "links": []}));
        let out = layout_sankey(&g, &c, &ColumnStrategy::LongestPath, &o);
        let mut ys: Vec<f64> = out.nodes.iter().map(|n| n.y).collect();
        ys.sort_by(f64::total_cmp);
        assert!(ys[0] < ys[1], "{ys:?}");
    }
}
