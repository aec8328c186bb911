use serde::Serialize;
use serde_json::Value;
use sluice::flow::{FlowOptions, PageView, build_page_flow};
use sluice::render::raster::{RasterError, RasterOptions};
use sluice::render::{HeadlessError, HeadlessRenderer, Scene, empty_scene_for, render_scene_svg};
use sluice::{NormalizeOptions, SankeyConfig, normalize};
use std::io::Read;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Core(sluice::Error),
    Headless(HeadlessError),
    Raster(RasterError),
    Json(serde_json::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Core(err) => write!(f, "{err}"),
            CliError::Headless(err) => write!(f, "{err}"),
            CliError::Raster(err) => write!(f, "{err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<sluice::Error> for CliError {
    fn from(value: sluice::Error) -> Self {
        Self::Core(value)
    }
}

impl From<HeadlessError> for CliError {
    fn from(value: HeadlessError) -> Self {
        Self::Headless(value)
    }
}

impl From<RasterError> for CliError {
    fn from(value: RasterError) -> Self {
        Self::Raster(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    Normalize,
    Layout,
    #[default]
    Scene,
    Render,
    Flow,
}

#[derive(Debug, Clone, Copy, Default)]
enum RenderFormat {
    #[default]
    Svg,
    Png,
}

impl FromStr for RenderFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    config: Option<String>,
    pretty: bool,
    render_format: RenderFormat,
    render_scale: f32,
    background: Option<String>,
    width: Option<f64>,
    height: Option<f64>,
    diagram_id: Option<String>,
    out: Option<String>,
}

fn usage() -> &'static str {
    "sluice-cli\n\
\n\
USAGE:\n\
  sluice-cli normalize [--config <path>] [--pretty] [<path>|-]\n\
  sluice-cli layout [--config <path>] [--width <w>] [--height <h>] [--pretty] [<path>|-]\n\
  sluice-cli [scene] [--config <path>] [--width <w>] [--height <h>] [--pretty] [<path>|-]\n\
  sluice-cli render [--format svg|png] [--scale <n>] [--background <css-color>] [--config <path>] [--width <w>] [--height <h>] [--id <diagram-id>] [--out <path>] [<path>|-]\n\
  sluice-cli flow [--config <path>] [--pretty] [<path>|-]\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', input is read from stdin.\n\
  - Input is a {nodes, links, entry_pages?} payload; for `flow` it is an array of\n\
    {session_id, page_url, timestamp} page views and the output is a payload.\n\
  - --config accepts JSON or YAML; files ending in .json are parsed as JSON.\n\
  - scene and render never fail on bad payloads; they emit an empty scene with a reason.\n\
  - render prints SVG to stdout by default; use --out to write a file.\n\
  - PNG output defaults to writing next to the input file (or ./out.png for stdin).\n\
  - Logging is controlled by SLUICE_LOG (EnvFilter syntax) and SLUICE_LOG_FORMAT=json|compact.\n\
"
}

fn next_f64<'a>(it: &mut impl Iterator<Item = &'a String>) -> Result<f64, CliError> {
    let Some(raw) = it.next() else {
        return Err(CliError::Usage(usage()));
    };
    let v = raw.parse::<f64>().map_err(|_| CliError::Usage(usage()))?;
    if !(v.is_finite() && v >= 0.0) {
        return Err(CliError::Usage(usage()));
    }
    Ok(v)
}

fn next_string<'a>(it: &mut impl Iterator<Item = &'a String>) -> Result<String, CliError> {
    it.next().cloned().ok_or(CliError::Usage(usage()))
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args {
        render_scale: 1.0,
        ..Default::default()
    };

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "normalize" => args.command = Command::Normalize,
            "layout" => args.command = Command::Layout,
            "scene" => args.command = Command::Scene,
            "render" => args.command = Command::Render,
            "flow" => args.command = Command::Flow,
            "--pretty" => args.pretty = true,
            "--config" => args.config = Some(next_string(&mut it)?),
            "--format" => {
                args.render_format = next_string(&mut it)?
                    .parse::<RenderFormat>()
                    .map_err(|_| CliError::Usage(usage()))?;
            }
            "--scale" => {
                args.render_scale = next_string(&mut it)?
                    .parse::<f32>()
                    .map_err(|_| CliError::Usage(usage()))?;
                if !(args.render_scale.is_finite() && args.render_scale > 0.0) {
                    return Err(CliError::Usage(usage()));
                }
            }
            "--background" => {
                let bg = next_string(&mut it)?;
                if !bg.trim().is_empty() {
                    args.background = Some(bg.trim().to_string());
                }
            }
            "--width" => args.width = Some(next_f64(&mut it)?),
            "--height" => args.height = Some(next_f64(&mut it)?),
            "--id" => args.diagram_id = Some(next_string(&mut it)?),
            "--out" => args.out = Some(next_string(&mut it)?),
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            other if other.starts_with('-') && other != "-" => {
                return Err(CliError::Usage(usage()));
            }
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    Ok(args)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SLUICE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if std::env::var("DEBUG").is_ok() {
            "sluice=debug,sluice_core=debug,sluice_render=debug,info"
        } else {
            "warn"
        })
    });

    let format = std::env::var("SLUICE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn load_config(path: Option<&str>) -> Result<SankeyConfig, CliError> {
    let Some(path) = path else {
        return Ok(SankeyConfig::defaults());
    };
    let text = std::fs::read_to_string(path)?;
    let cfg = if path.ends_with(".json") {
        SankeyConfig::from_json_str(&text)?
    } else {
        SankeyConfig::from_yaml_str(&text)?
    };
    Ok(cfg)
}

fn write_json(value: &impl Serialize, pretty: bool) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(std::io::stdout().lock(), value)?;
    } else {
        serde_json::to_writer(std::io::stdout().lock(), value)?;
    }
    Ok(())
}

fn write_text(text: &str, out: Option<&str>) -> Result<(), CliError> {
    match out {
        None => {
            print!("{text}");
            Ok(())
        }
        Some(path) => {
            std::fs::write(path, text)?;
            Ok(())
        }
    }
}

fn default_raster_out_path(input: Option<&str>, ext: &str) -> std::path::PathBuf {
    match input {
        Some(path) if path != "-" => std::path::PathBuf::from(path).with_extension(ext),
        _ => std::path::PathBuf::from(format!("out.{ext}")),
    }
}

/// Parses a payload for commands that must not fail on bad input.
fn lenient_scene(text: &str, renderer: &HeadlessRenderer) -> Scene {
    match serde_json::from_str::<Value>(text) {
        Ok(payload) => renderer.render_scene(&payload),
        Err(err) => empty_scene_for(&sluice_render::Error::Json(err)),
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let cfg = load_config(args.config.as_deref())?;
    let text = read_input(args.input.as_deref())?;

    let mut renderer = HeadlessRenderer::from_config(&cfg);
    let width = args.width.unwrap_or(renderer.options.layout.width);
    let height = args.height.unwrap_or(renderer.options.layout.height);
    renderer = renderer.with_size(width, height);
    tracing::debug!(command = ?args.command, width, height, "running");

    match args.command {
        Command::Normalize => {
            let payload: Value = serde_json::from_str(&text)?;
            let graph = normalize(&payload, &NormalizeOptions::from_config(&cfg))?;
            write_json(&graph, args.pretty)
        }
        Command::Layout => {
            let payload: Value = serde_json::from_str(&text)?;
            let layout = renderer.layout(&payload)?;
            write_json(&layout, args.pretty)
        }
        Command::Scene => write_json(&lenient_scene(&text, &renderer), args.pretty),
        Command::Flow => {
            let views: Vec<PageView> = serde_json::from_str(&text)?;
            let payload = build_page_flow(&views, &FlowOptions::from_config(&cfg));
            write_json(&payload, args.pretty)
        }
        Command::Render => {
            let scene = lenient_scene(&text, &renderer);
            let mut svg_options = renderer.svg.clone();
            if let Some(id) = args.diagram_id.as_deref() {
                svg_options.diagram_id = Some(sluice::render::sanitize_svg_id(id));
            }
            let svg = render_scene_svg(&scene, &svg_options);

            match args.render_format {
                RenderFormat::Svg => write_text(&svg, args.out.as_deref()),
                RenderFormat::Png => {
                    let raster = RasterOptions {
                        scale: args.render_scale,
                        background: Some(
                            args.background
                                .clone()
                                .unwrap_or_else(|| renderer.svg.background.clone()),
                        ),
                    };
                    let bytes = sluice::render::raster::svg_to_png(&svg, &raster)?;
                    let out = args
                        .out
                        .as_deref()
                        .map(std::path::PathBuf::from)
                        .unwrap_or_else(|| {
                            default_raster_out_path(args.input.as_deref(), "png")
                        });
                    std::fs::write(&out, bytes)?;
                    Ok(())
                }
            }
        }
    }
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    init_tracing();

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
