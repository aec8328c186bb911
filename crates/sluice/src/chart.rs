//! Retained-mode chart for hosts that resize and dispose.

use serde_json::Value;
use sluice_core::SankeyConfig;
use sluice_render::{
    EmptyReason, PreparedGraph, RenderOptions, Scene, SvgRenderOptions, empty_scene_for,
    render_scene_svg,
};

#[derive(Debug, Clone)]
struct Retained {
    /// `None` when the last payload produced an empty scene.
    prepared: Option<PreparedGraph>,
    scene: Scene,
}

/// A Sankey chart bound to one host surface.
///
/// `set_data` does all the size-independent work once; `resize` only re-runs positioning on the
/// cached graph.
#[derive(Debug, Clone, Default)]
pub struct SankeyChart {
    options: RenderOptions,
    svg: SvgRenderOptions,
    retained: Option<Retained>,
}

impl SankeyChart {
    pub fn new(options: RenderOptions, svg: SvgRenderOptions) -> Self {
        let mut chart = Self {
            options,
            svg,
            retained: None,
        };
        chart.sync_svg_size();
        chart
    }

    pub fn from_config(cfg: &SankeyConfig) -> Self {
        Self::new(
            RenderOptions::from_config(cfg),
            SvgRenderOptions::from_config(cfg),
        )
    }

    /// Replaces whatever the chart showed before.
    pub fn set_data(&mut self, payload: &Value) {
        let retained = match PreparedGraph::from_payload(payload, &self.options) {
            Ok(prepared) => {
                let scene = prepared.scene(&self.options.layout, &self.options.style);
                Retained {
                    prepared: Some(prepared),
                    scene,
                }
            }
            Err(err) => Retained {
                prepared: None,
                scene: empty_scene_for(&err),
            },
        };
        self.retained = Some(retained);
    }

    /// Re-lays out the cached graph at a new size. Ignored before `set_data` and after `dispose`.
    pub fn resize(&mut self, width: f64, height: f64) {
        let Some(retained) = self.retained.as_mut() else {
            tracing::debug!("resize ignored: chart has no data");
            return;
        };
        self.options.layout = self.options.layout.with_size(width, height);
        self.svg.width = self.options.layout.width;
        self.svg.height = self.options.layout.height;
        if let Some(prepared) = &retained.prepared {
            retained.scene = prepared.scene(&self.options.layout, &self.options.style);
        }
    }

    /// Drops the cached graph and scene.
    pub fn dispose(&mut self) {
        self.retained = None;
    }

    pub fn has_data(&self) -> bool {
        self.retained.is_some()
    }

    pub fn size(&self) -> (f64, f64) {
        (self.options.layout.width, self.options.layout.height)
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.retained.as_ref().map(|r| &r.scene)
    }

    pub fn empty_reason(&self) -> Option<EmptyReason> {
        self.scene().and_then(Scene::empty_reason)
    }

    pub fn svg(&self) -> Option<String> {
        self.scene().map(|scene| render_scene_svg(scene, &self.svg))
    }

    /// Emphasizes the primitive at `index` in scene order. Returns `false` if there is none.
    pub fn hover_enter(&mut self, index: usize) -> bool {
        let Some(p) = self.primitive_mut(index) else {
            return false;
        };
        p.hover_enter();
        true
    }

    pub fn hover_leave(&mut self, index: usize) -> bool {
        let Some(p) = self.primitive_mut(index) else {
            return false;
        };
        p.hover_leave();
        true
    }

    fn primitive_mut(&mut self, index: usize) -> Option<&mut sluice_render::Primitive> {
        self.retained
            .as_mut()?
            .scene
            .primitives_mut()
            .get_mut(index)
    }

    fn sync_svg_size(&mut self) {
        self.svg.width = self.options.layout.width;
        self.svg.height = self.options.layout.height;
    }
}
