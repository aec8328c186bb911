//! SVG serialization of a [`Scene`].

use crate::scene::{Emphasis, LinkPrimitive, NodePrimitive, Scene};
use sluice_core::SankeyConfig;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub struct SvgRenderOptions {
    /// `id` of the root `<svg>`; CSS rules are scoped to it.
    pub diagram_id: Option<String>,
    pub show_values: bool,
    pub prefix: String,
    pub suffix: String,
    pub label_font_size: f64,
    pub background: String,
    /// Canvas size used for the empty-scene placeholder.
    pub width: f64,
    pub height: f64,
}

impl Default for SvgRenderOptions {
    fn default() -> Self {
        Self {
            diagram_id: None,
            show_values: true,
            prefix: String::new(),
            suffix: String::new(),
            label_font_size: 13.0,
            background: "white".to_string(),
            width: 800.0,
            height: 500.0,
        }
    }
}

impl SvgRenderOptions {
    pub fn from_config(cfg: &SankeyConfig) -> Self {
        let d = Self::default();
        Self {
            diagram_id: cfg.get_str("svg.diagramId").map(str::to_string),
            show_values: cfg.get_bool("svg.showValues").unwrap_or(d.show_values),
            prefix: cfg.get_str("svg.prefix").map(str::to_string).unwrap_or(d.prefix),
            suffix: cfg.get_str("svg.suffix").map(str::to_string).unwrap_or(d.suffix),
            label_font_size: cfg
                .get_f64("svg.labelFontSize")
                .unwrap_or(d.label_font_size),
            background: cfg
                .get_str("svg.background")
                .map(str::to_string)
                .unwrap_or(d.background),
            width: cfg.get_f64("layout.width").unwrap_or(d.width).max(0.0),
            height: cfg.get_f64("layout.height").unwrap_or(d.height).max(0.0),
        }
    }
}

pub fn render_scene_svg(scene: &Scene, options: &SvgRenderOptions) -> String {
    let diagram_id = escape_xml(options.diagram_id.as_deref().unwrap_or("sankey"));
    match scene {
        Scene::Empty { reason } => {
            let (w, h) = (options.width.max(1.0), options.height.max(1.0));
            let mut out = String::new();
            open_svg(&mut out, &diagram_id, w, h, &options.background);
            let _ = write!(
                &mut out,
                r##"<g class="placeholder" data-reason="{code}"><text x="{x}" y="{y}" text-anchor="middle" dominant-baseline="middle" fill="#999" font-size="{fs}">{msg}</text></g></svg>"##,
                code = reason.code(),
                x = fmt(w / 2.0),
                y = fmt(h / 2.0),
                fs = fmt(options.label_font_size),
                msg = escape_xml(reason.message()),
            );
            out
        }
        Scene::Drawn { width, height, .. } => {
            let (w, h) = (width.max(1.0), height.max(1.0));
            let mut out = String::new();
            open_svg(&mut out, &diagram_id, w, h, &options.background);

            let link_hover = scene.links().next().map(|l| l.emphasis);
            let node_hover = scene.nodes().next().map(|n| n.emphasis);
            let _ = write!(
                &mut out,
                "<style>{}</style>",
                hover_css(&diagram_id, link_hover, node_hover)
            );

            out.push_str(r#"<g class="links" fill="none">"#);
            for l in scene.links() {
                write_link(&mut out, l);
            }
            out.push_str("</g>");

            out.push_str(r#"<g class="nodes">"#);
            for n in scene.nodes() {
                write_node(&mut out, n);
            }
            out.push_str("</g>");

            let _ = write!(
                &mut out,
                r#"<g class="node-labels" font-size="{}">"#,
                fmt(options.label_font_size)
            );
            for n in scene.nodes() {
                write_label(&mut out, n, w, options);
            }
            out.push_str("</g>");

            out.push_str("</svg>");
            out
        }
    }
}

fn open_svg(out: &mut String, id: &str, w: f64, h: f64, background: &str) {
    let _ = write!(
        out,
        r#"<svg id="{id}" width="100%" xmlns="http://www.w3.org/2000/svg" style="max-width: {w}px; background-color: {bg};" viewBox="0 0 {w} {h}">"#,
        w = fmt(w),
        h = fmt(h),
        bg = escape_xml(background),
    );
}

fn hover_css(id: &str, link: Option<Emphasis>, node: Option<Emphasis>) -> String {
    let mut css = String::new();
    if let Some(e) = link {
        let _ = write!(
            &mut css,
            "#{id} .link{{transition:stroke-opacity .2s;}}#{id} .link:hover{{stroke-opacity:{};}}",
            fmt(e.emphasized_opacity)
        );
    }
    if let Some(e) = node {
        let _ = write!(
            &mut css,
            "#{id} .node{{transform-box:fill-box;transform-origin:center;transition:transform .2s;}}#{id} .node:hover{{fill-opacity:{};transform:scale({});}}",
            fmt(e.emphasized_opacity),
            fmt(e.emphasized_scale)
        );
    }
    css
}

fn write_link(out: &mut String, l: &LinkPrimitive) {
    let p = &l.path;
    let d = format!(
        "M{},{}C{},{},{},{},{},{}",
        fmt(p.from.x),
        fmt(p.from.y),
        fmt(p.c1.x),
        fmt(p.c1.y),
        fmt(p.c2.x),
        fmt(p.c2.y),
        fmt(p.to.x),
        fmt(p.to.y),
    );
    let _ = write!(
        out,
        r#"<path class="link" d="{d}" stroke="{stroke}" stroke-width="{sw}" stroke-opacity="{op}" data-source="{s}" data-target="{t}"/>"#,
        d = d,
        stroke = escape_xml(&l.stroke),
        sw = fmt(l.stroke_width.max(1.0)),
        op = fmt(l.emphasis.opacity()),
        s = escape_xml(&l.source),
        t = escape_xml(&l.target),
    );
}

fn write_node(out: &mut String, n: &NodePrimitive) {
    let scale = n.emphasis.scale();
    let transform = if (scale - 1.0).abs() > 1e-9 {
        let c = n.center();
        format!(
            r#" transform="translate({cx},{cy}) scale({s}) translate({ncx},{ncy})""#,
            cx = fmt(c.x),
            cy = fmt(c.y),
            s = fmt(scale),
            ncx = fmt(-c.x),
            ncy = fmt(-c.y),
        )
    } else {
        String::new()
    };
    let _ = write!(
        out,
        r#"<rect class="node" x="{x}" y="{y}" width="{w}" height="{h}" rx="{rx}" fill="{fill}" fill-opacity="{op}" data-name="{name}"{transform}/>"#,
        x = fmt(n.x),
        y = fmt(n.y),
        w = fmt(n.width),
        h = fmt(n.height),
        rx = fmt(n.corner_radius),
        fill = escape_xml(&n.fill),
        op = fmt(n.emphasis.opacity()),
        name = escape_xml(&n.name),
        transform = transform,
    );
}

fn write_label(out: &mut String, n: &NodePrimitive, canvas_width: f64, options: &SvgRenderOptions) {
    let c = n.center();
    let (x, anchor) = if c.x < canvas_width / 2.0 {
        (n.x + n.width + 6.0, "start")
    } else {
        (n.x - 6.0, "end")
    };
    let _ = write!(
        out,
        r#"<text x="{x}" y="{y}" dy="0.35em" text-anchor="{anchor}">{name}"#,
        x = fmt(x),
        y = fmt(c.y),
        name = escape_xml(&n.name),
    );
    if options.show_values {
        let v = (n.value * 100.0).round() / 100.0;
        let _ = write!(
            out,
            r#"<tspan class="value" dx="4">{}</tspan>"#,
            escape_xml(&format!("{}{}{}", options.prefix, fmt(v), options.suffix)),
        );
    }
    out.push_str("</text>");
}

/// Number formatting for SVG attributes: drops `-0` and sub-micro float noise.
pub fn fmt(v: f64) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    let mut v = if v.abs() < 1e-9 { 0.0 } else { v };
    let nearest = v.round();
    if (v - nearest).abs() < 1e-6 {
        v = nearest;
    }
    if v == -0.0 {
        v = 0.0;
    }
    format!("{v}")
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::EmptyReason;

    #[test]
    fn fmt_strips_noise() {
        assert_eq!(fmt(-0.0), "0");
        assert_eq!(fmt(12.0000000001), "12");
        assert_eq!(fmt(f64::NAN), "0");
        assert_eq!(fmt(0.4), "0.4");
    }

    #[test]
    fn escape_xml_covers_markup() {
        assert_eq!(escape_xml(r#"<a & "b">'"#), "&lt;a &amp; &quot;b&quot;&gt;&#39;");
    }

    #[test]
    fn empty_scene_renders_placeholder() {
        let svg = render_scene_svg(
            &Scene::empty(EmptyReason::NoData),
            &SvgRenderOptions::default(),
        );
        assert!(svg.contains(r#"data-reason="no-data""#));
        assert!(svg.contains("No flow data"));
        assert!(svg.contains(r#"viewBox="0 0 800 500""#));
        assert!(!svg.contains("<path"));
    }
}
