#![forbid(unsafe_code)]

//! Headless Sankey layout and rendering.
//!
//! `payload -> normalize -> break cycles -> assign columns -> layout -> scene -> SVG`.
//! Every failure after parsing ends up as a [`Scene::Empty`] with a reason code, so hosts never
//! need error handling to stay correct.

pub mod layout;
pub mod scene;
pub mod svg;

pub use layout::{
    ColumnAssignment, ColumnStrategy, KeywordStages, LaidOutLink, LaidOutNode, LayoutOptions,
    SankeyLayout, StageClassifier, assign_columns, layout, layout_sankey,
};
pub use scene::{
    CubicPath, EmptyReason, Emphasis, LinkPrimitive, NodePrimitive, Primitive, Scene, SceneStyle,
    render_scene,
};
pub use svg::{SvgRenderOptions, render_scene_svg};

use serde_json::Value;
use sluice_core::{CycleBreak, FlowGraph, NormalizeOptions, SankeyConfig};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] sluice_core::Error),
    #[error("payload JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("graph has no nodes")]
    EmptyGraph,
    #[error("no links survive cycle breaking and endpoint filtering")]
    NoSurvivingLinks,
}

impl Error {
    pub fn empty_reason(&self) -> EmptyReason {
        match self {
            Self::Core(_) | Self::Json(_) => EmptyReason::InvalidPayload,
            Self::EmptyGraph => EmptyReason::NoData,
            Self::NoSurvivingLinks => EmptyReason::NoValidLinks,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything a payload-to-scene render reads, resolved from a [`SankeyConfig`].
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub normalize: NormalizeOptions,
    pub columns: ColumnStrategy,
    pub layout: LayoutOptions,
    pub style: SceneStyle,
}

impl RenderOptions {
    pub fn from_config(cfg: &SankeyConfig) -> Self {
        Self {
            normalize: NormalizeOptions::from_config(cfg),
            columns: ColumnStrategy::from_config(cfg),
            layout: LayoutOptions::from_config(cfg),
            style: SceneStyle::from_config(cfg),
        }
    }
}

/// A payload that made it through normalization, cycle breaking and column assignment.
///
/// Only positioning depends on the canvas size, so this is what a resizable host keeps around.
#[derive(Debug, Clone)]
pub struct PreparedGraph {
    pub graph: FlowGraph,
    pub cycles: CycleBreak,
    pub columns: ColumnAssignment,
}

impl PreparedGraph {
    pub fn from_payload(payload: &Value, options: &RenderOptions) -> Result<Self> {
        let (graph, cycles) = sluice_core::prepare(payload, &options.normalize)?;
        if graph.is_empty() {
            return Err(Error::EmptyGraph);
        }
        if cycles.links.is_empty() {
            return Err(Error::NoSurvivingLinks);
        }
        let columns = assign_columns(&graph, &cycles, &options.columns);
        tracing::debug!(
            nodes = graph.nodes.len(),
            valid = cycles.valid_count(),
            links = cycles.links.len(),
            columns = columns.column_count,
            "prepared sankey graph"
        );
        Ok(Self {
            graph,
            cycles,
            columns,
        })
    }

    pub fn from_json_str(text: &str, options: &RenderOptions) -> Result<Self> {
        let payload: Value = serde_json::from_str(text)?;
        Self::from_payload(&payload, options)
    }

    pub fn layout(&self, options: &LayoutOptions) -> SankeyLayout {
        layout(&self.graph, &self.cycles, &self.columns, options)
    }

    pub fn scene(&self, options: &LayoutOptions, style: &SceneStyle) -> Scene {
        render_scene(&self.layout(options), style)
    }
}

/// Logs the failure and turns it into the matching empty scene.
pub fn empty_scene_for(err: &Error) -> Scene {
    match err {
        Error::Core(_) | Error::Json(_) => tracing::warn!(error = %err, "invalid sankey payload"),
        _ => tracing::debug!(error = %err, "nothing to draw"),
    }
    Scene::empty(err.empty_reason())
}

/// Runs the whole pipeline. Never fails: problems come back as [`Scene::Empty`].
pub fn render_pipeline(payload: &Value, options: &RenderOptions) -> Scene {
    match PreparedGraph::from_payload(payload, options) {
        Ok(prepared) => prepared.scene(&options.layout, &options.style),
        Err(err) => empty_scene_for(&err),
    }
}

/// [`render_pipeline`] followed by [`render_scene_svg`].
pub fn render_pipeline_svg(
    payload: &Value,
    options: &RenderOptions,
    svg_options: &SvgRenderOptions,
) -> String {
    render_scene_svg(&render_pipeline(payload, options), svg_options)
}
