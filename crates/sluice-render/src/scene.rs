//! Drawable primitives derived from a [`SankeyLayout`].

use crate::layout::SankeyLayout;
use serde::{Deserialize, Serialize};
use sluice_core::SankeyConfig;
use sluice_core::config::DEFAULT_PALETTE;

/// Why nothing was drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyReason {
    NoData,
    InvalidPayload,
    NoValidLinks,
}

impl EmptyReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::NoData => "no-data",
            Self::InvalidPayload => "invalid-payload",
            Self::NoValidLinks => "no-valid-links",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::NoData => "No flow data",
            Self::InvalidPayload => "Invalid flow data",
            Self::NoValidLinks => "No valid flow data",
        }
    }
}

impl std::fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One cubic Bézier segment: `M from C c1 c2 to`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubicPath {
    pub from: Point,
    pub c1: Point,
    pub c2: Point,
    pub to: Point,
}

impl CubicPath {
    /// Horizontal S-curve with both control points at the midpoint x.
    pub fn horizontal(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let mid = (x1 + x2) / 2.0;
        Self {
            from: Point { x: x1, y: y1 },
            c1: Point { x: mid, y: y1 },
            c2: Point { x: mid, y: y2 },
            to: Point { x: x2, y: y2 },
        }
    }
}

/// Resting/emphasized visual state of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emphasis {
    pub resting_opacity: f64,
    pub emphasized_opacity: f64,
    pub resting_scale: f64,
    pub emphasized_scale: f64,
    pub hovered: bool,
}

impl Emphasis {
    pub fn new(resting_opacity: f64, emphasized_opacity: f64) -> Self {
        Self {
            resting_opacity,
            emphasized_opacity,
            resting_scale: 1.0,
            emphasized_scale: 1.0,
            hovered: false,
        }
    }

    pub fn with_scale(mut self, emphasized_scale: f64) -> Self {
        self.emphasized_scale = emphasized_scale;
        self
    }

    pub fn opacity(&self) -> f64 {
        if self.hovered {
            self.emphasized_opacity
        } else {
            self.resting_opacity
        }
    }

    pub fn scale(&self) -> f64 {
        if self.hovered {
            self.emphasized_scale
        } else {
            self.resting_scale
        }
    }

    pub fn enter(&mut self) {
        self.hovered = true;
    }

    pub fn leave(&mut self) {
        self.hovered = false;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePrimitive {
    pub name: String,
    pub index: usize,
    pub value: f64,
    pub column: usize,
    /// Top-left corner.
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub corner_radius: f64,
    pub fill: String,
    pub emphasis: Emphasis,
}

impl NodePrimitive {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    pub fn hover_enter(&mut self) {
        self.emphasis.enter();
    }

    pub fn hover_leave(&mut self) {
        self.emphasis.leave();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPrimitive {
    pub source: String,
    pub target: String,
    pub source_index: usize,
    pub target_index: usize,
    pub value: f64,
    pub path: CubicPath,
    pub stroke: String,
    pub stroke_width: f64,
    pub emphasis: Emphasis,
}

impl LinkPrimitive {
    pub fn hover_enter(&mut self) {
        self.emphasis.enter();
    }

    pub fn hover_leave(&mut self) {
        self.emphasis.leave();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Primitive {
    Link(LinkPrimitive),
    Node(NodePrimitive),
}

impl Primitive {
    pub fn emphasis(&self) -> &Emphasis {
        match self {
            Self::Link(l) => &l.emphasis,
            Self::Node(n) => &n.emphasis,
        }
    }

    pub fn hover_enter(&mut self) {
        match self {
            Self::Link(l) => l.hover_enter(),
            Self::Node(n) => n.hover_enter(),
        }
    }

    pub fn hover_leave(&mut self) {
        match self {
            Self::Link(l) => l.hover_leave(),
            Self::Node(n) => n.hover_leave(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scene {
    /// Links first, then nodes, so nodes paint over band ends.
    Drawn {
        width: f64,
        height: f64,
        primitives: Vec<Primitive>,
    },
    Empty {
        reason: EmptyReason,
    },
}

impl Scene {
    pub fn empty(reason: EmptyReason) -> Self {
        Self::Empty { reason }
    }

    pub fn empty_reason(&self) -> Option<EmptyReason> {
        match self {
            Self::Empty { reason } => Some(*reason),
            Self::Drawn { .. } => None,
        }
    }

    pub fn primitives(&self) -> &[Primitive] {
        match self {
            Self::Drawn { primitives, .. } => primitives,
            Self::Empty { .. } => &[],
        }
    }

    pub fn primitives_mut(&mut self) -> &mut [Primitive] {
        match self {
            Self::Drawn { primitives, .. } => primitives,
            Self::Empty { .. } => &mut [],
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodePrimitive> {
        self.primitives().iter().filter_map(|p| match p {
            Primitive::Node(n) => Some(n),
            Primitive::Link(_) => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkPrimitive> {
        self.primitives().iter().filter_map(|p| match p {
            Primitive::Link(l) => Some(l),
            Primitive::Node(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneStyle {
    pub palette: Vec<String>,
    pub corner_radius: f64,
    pub node_opacity: f64,
    pub node_hover_opacity: f64,
    pub node_hover_scale: f64,
    pub link_opacity: f64,
    pub link_hover_opacity: f64,
}

impl Default for SceneStyle {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            corner_radius: 4.0,
            node_opacity: 0.9,
            node_hover_opacity: 1.0,
            node_hover_scale: 1.05,
            link_opacity: 0.4,
            link_hover_opacity: 0.7,
        }
    }
}

impl SceneStyle {
    pub fn from_config(cfg: &SankeyConfig) -> Self {
        let d = Self::default();
        let palette = cfg
            .get_str_list("style.palette")
            .filter(|p| !p.is_empty())
            .unwrap_or(d.palette);
        Self {
            palette,
            corner_radius: cfg
                .get_f64("style.nodeCornerRadius")
                .unwrap_or(d.corner_radius),
            node_opacity: cfg.get_f64("style.nodeOpacity").unwrap_or(d.node_opacity),
            node_hover_opacity: cfg
                .get_f64("style.nodeHoverOpacity")
                .unwrap_or(d.node_hover_opacity),
            node_hover_scale: cfg
                .get_f64("style.nodeHoverScale")
                .unwrap_or(d.node_hover_scale),
            link_opacity: cfg.get_f64("style.linkOpacity").unwrap_or(d.link_opacity),
            link_hover_opacity: cfg
                .get_f64("style.linkHoverOpacity")
                .unwrap_or(d.link_hover_opacity),
        }
    }

    /// Fill for the node at `index`; cycles through the palette.
    pub fn color_of(&self, index: usize) -> &str {
        if self.palette.is_empty() {
            return DEFAULT_PALETTE[index % DEFAULT_PALETTE.len()];
        }
        &self.palette[index % self.palette.len()]
    }
}

/// Builds the primitive list for a laid-out graph.
///
/// A layout without links yields [`EmptyReason::NoValidLinks`]. Telling an empty graph apart from
/// one whose links were all removed needs the graph itself; see [`crate::render_pipeline`].
pub fn render_scene(layout: &SankeyLayout, style: &SceneStyle) -> Scene {
    if layout.links.is_empty() {
        return Scene::empty(EmptyReason::NoValidLinks);
    }

    let mut primitives = Vec::with_capacity(layout.links.len() + layout.nodes.len());
    for l in &layout.links {
        let (Some(source), Some(target)) = (layout.node(l.source_index), layout.node(l.target_index))
        else {
            continue;
        };
        primitives.push(Primitive::Link(LinkPrimitive {
            source: source.name.clone(),
            target: target.name.clone(),
            source_index: l.source_index,
            target_index: l.target_index,
            value: l.value,
            path: CubicPath::horizontal(l.x1, l.y1, l.x2, l.y2),
            stroke: style.color_of(l.source_index).to_string(),
            stroke_width: l.band_thickness,
            emphasis: Emphasis::new(style.link_opacity, style.link_hover_opacity),
        }));
    }

    for n in &layout.nodes {
        primitives.push(Primitive::Node(NodePrimitive {
            name: n.name.clone(),
            index: n.index,
            value: n.value,
            column: n.column,
            x: n.x - layout.node_width / 2.0,
            y: n.top(),
            width: layout.node_width,
            height: n.height,
            corner_radius: style.corner_radius,
            fill: style.color_of(n.index).to_string(),
            emphasis: Emphasis::new(style.node_opacity, style.node_hover_opacity)
                .with_scale(style.node_hover_scale),
        }));
    }

    Scene::Drawn {
        width: layout.width,
        height: layout.height,
        primitives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColumnStrategy, LayoutOptions, layout_sankey};
    use serde_json::json;
    use sluice_core::{NormalizeOptions, prepare};

    fn scene_for(payload: serde_json::Value) -> Scene {
        let (g, c) = prepare(&payload, &NormalizeOptions::default()).unwrap();
        let layout = layout_sankey(&g, &c, &ColumnStrategy::LongestPath, &LayoutOptions::default());
        render_scene(&layout, &SceneStyle::default())
    }

    #[test]
    fn links_precede_nodes_and_use_source_color() {
        let scene = scene_for(json!({
            "nodes": [{"name": "A"}, {"name": "B"}],
            "links": [{"source": "A", "target": "B", "value": 10}],
        }));
        let kinds: Vec<&str> = scene
            .primitives()
            .iter()
            .map(|p| match p {
                Primitive::Link(_) => "link",
                Primitive::Node(_) => "node",
            })
            .collect();
        assert_eq!(kinds, vec!["link", "node", "node"]);

        let link = scene.links().next().unwrap();
        assert_eq!(link.stroke, DEFAULT_PALETTE[0]);
        assert_eq!(link.path.c1.x, 400.0);
        assert_eq!(link.path.c2.x, 400.0);
        assert_eq!(link.emphasis.opacity(), 0.4);

        let b = scene.nodes().find(|n| n.name == "B").unwrap();
        assert_eq!(b.fill, DEFAULT_PALETTE[1]);
        assert_eq!((b.x, b.width), (770.0, 30.0));
        assert_eq!(b.center().y, 250.0);
    }

    #[test]
    fn hover_is_reversible() {
        let mut scene = scene_for(json!({
            "nodes": [{"name": "A"}, {"name": "B"}],
            "links": [{"source": "A", "target": "B", "value": 10}],
        }));
        let before = scene.clone();
        for p in scene.primitives_mut() {
            p.hover_enter();
        }
        let link = scene.links().next().unwrap();
        assert_eq!(link.emphasis.opacity(), 0.7);
        let node = scene.nodes().next().unwrap();
        assert_eq!(node.emphasis.opacity(), 1.0);
        assert_eq!(node.emphasis.scale(), 1.05);

        for p in scene.primitives_mut() {
            p.hover_leave();
        }
        assert_eq!(scene, before);
    }

    #[test]
    fn layouts_without_links_have_no_valid_links() {
        let scene = scene_for(json!({
            "nodes": [{"name": "A"}, {"name": "B"}],
            "links": [
                {"source": "A", "target": "B", "value": 1},
                {"source": "B", "target": "A", "value": 1},
            ],
        }));
        assert_eq!(scene.empty_reason(), Some(EmptyReason::NoValidLinks));
        assert!(scene.primitives().is_empty());

        let scene = scene_for(json!({"nodes": [{"name": "A"}], "links": []}));
        assert_eq!(scene.empty_reason(), Some(EmptyReason::NoValidLinks));
    }

    #[test]
    fn palette_wraps_and_scene_serializes_tagged() {
        let style = SceneStyle {
            palette: vec!["#111".into(), "#222".into()],
            ..Default::default()
        };
        assert_eq!(style.color_of(2), "#111");
        let v = serde_json::to_value(Scene::empty(EmptyReason::NoValidLinks)).unwrap();
        assert_eq!(v, json!({"kind": "empty", "reason": "no-valid-links"}));
    }
}
