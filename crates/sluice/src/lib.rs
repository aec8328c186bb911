#![forbid(unsafe_code)]

//! `sluice` renders Sankey flow charts headlessly.
//!
//! A payload of named nodes and weighted links goes through normalization, cycle breaking,
//! column assignment and layout, and comes out as a [`render::Scene`], an SVG string or a PNG.
//!
//! # Features
//!
//! - `render` (default): layout, scene and SVG output (`sluice::render`, `sluice::chart`)
//! - `raster`: PNG output via pure-Rust SVG rasterization

pub use sluice_core::*;

#[cfg(feature = "render")]
pub mod chart;

#[cfg(feature = "render")]
pub mod render {
    pub use sluice_render::layout::{Bounds, ColumnAssignment, LaidOutLink, LaidOutNode};
    pub use sluice_render::scene::Point;
    pub use sluice_render::svg::{escape_xml, fmt};
    pub use sluice_render::{
        ColumnStrategy, CubicPath, EmptyReason, Emphasis, KeywordStages, LayoutOptions,
        LinkPrimitive, NodePrimitive, PreparedGraph, Primitive, RenderOptions, SankeyLayout, Scene,
        SceneStyle, StageClassifier, SvgRenderOptions, assign_columns, empty_scene_for, layout,
        layout_sankey, render_pipeline, render_pipeline_svg, render_scene, render_scene_svg,
    };

    #[cfg(feature = "raster")]
    pub mod raster;

    use serde_json::Value;
    use sluice_core::SankeyConfig;

    #[derive(Debug, thiserror::Error)]
    pub enum HeadlessError {
        #[error(transparent)]
        Config(#[from] sluice_core::Error),
        #[error(transparent)]
        Render(#[from] sluice_render::Error),
    }

    pub type Result<T> = std::result::Result<T, HeadlessError>;

    /// Converts an arbitrary string into a conservative SVG `id` token, so several charts can be
    /// inlined in one document without their scoped CSS colliding.
    pub fn sanitize_svg_id(raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return "sankey-untitled".to_string();
        }

        let mut out = String::with_capacity(raw.len() + 7);
        for ch in raw.chars() {
            let ok = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_';
            out.push(if ok { ch } else { '-' });
        }
        if !out.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            out.insert_str(0, "sankey-");
        }
        while out.contains("--") {
            out = out.replace("--", "-");
        }
        let out = out.trim_matches('-');
        if out.is_empty() || out == "sankey" {
            return "sankey-untitled".to_string();
        }
        out.to_string()
    }

    /// Bundles render and SVG options so one-shot renders take a single argument.
    #[derive(Debug, Clone, Default)]
    pub struct HeadlessRenderer {
        pub options: RenderOptions,
        pub svg: SvgRenderOptions,
    }

    impl HeadlessRenderer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn from_config(cfg: &SankeyConfig) -> Self {
            Self {
                options: RenderOptions::from_config(cfg),
                svg: SvgRenderOptions::from_config(cfg),
            }
        }

        /// Loads a JSON or YAML config document (YAML is a superset, so both parse).
        pub fn from_config_str(text: &str) -> Result<Self> {
            let cfg = SankeyConfig::from_yaml_str(text)?;
            Ok(Self::from_config(&cfg))
        }

        pub fn with_size(mut self, width: f64, height: f64) -> Self {
            self.options.layout = self.options.layout.with_size(width, height);
            self.svg.width = self.options.layout.width;
            self.svg.height = self.options.layout.height;
            self
        }

        /// Strict variant of [`HeadlessRenderer::render_scene`] that reports why nothing would be
        /// drawn.
        pub fn prepare(&self, payload: &Value) -> Result<PreparedGraph> {
            Ok(PreparedGraph::from_payload(payload, &self.options)?)
        }

        pub fn layout(&self, payload: &Value) -> Result<SankeyLayout> {
            Ok(self.prepare(payload)?.layout(&self.options.layout))
        }

        pub fn render_scene(&self, payload: &Value) -> Scene {
            render_pipeline(payload, &self.options)
        }

        pub fn render_svg(&self, payload: &Value) -> String {
            render_scene_svg(&self.render_scene(payload), &self.svg)
        }

        pub fn render_svg_with_diagram_id(&self, payload: &Value, diagram_id: &str) -> String {
            let mut svg = self.svg.clone();
            svg.diagram_id = Some(sanitize_svg_id(diagram_id));
            render_scene_svg(&self.render_scene(payload), &svg)
        }

        #[cfg(feature = "raster")]
        pub fn render_png(
            &self,
            payload: &Value,
            raster: &raster::RasterOptions,
        ) -> raster::Result<Vec<u8>> {
            raster::svg_to_png(&self.render_svg(payload), raster)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sanitize_svg_id_keeps_ids_safe() {
            assert_eq!(sanitize_svg_id("  "), "sankey-untitled");
            assert_eq!(sanitize_svg_id("weekly funnel"), "weekly-funnel");
            assert_eq!(sanitize_svg_id("2024/q1"), "sankey-2024-q1");
            assert_eq!(sanitize_svg_id("--"), "sankey-untitled");
        }

        #[test]
        fn config_str_accepts_json_and_yaml() {
            let json = HeadlessRenderer::from_config_str(r#"{"layout": {"width": 640}}"#).unwrap();
            assert_eq!(json.options.layout.width, 640.0);
            let yaml = HeadlessRenderer::from_config_str("svg:\n  prefix: \"$\"\n").unwrap();
            assert_eq!(yaml.svg.prefix, "$");
            assert!(matches!(
                HeadlessRenderer::from_config_str("- 1\n- 2\n"),
                Err(HeadlessError::Config(_))
            ));
        }

        #[test]
        fn prepare_reports_empty_graph() {
            let err = HeadlessRenderer::new()
                .prepare(&serde_json::json!({"nodes": [], "links": []}))
                .unwrap_err();
            assert!(matches!(
                err,
                HeadlessError::Render(sluice_render::Error::EmptyGraph)
            ));
        }
    }
}
