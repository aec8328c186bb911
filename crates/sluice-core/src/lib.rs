#![forbid(unsafe_code)]

//! Sankey flow graph model (headless).
//!
//! The pipeline front half lives here:
//! - [`normalize`]: validate a raw `{nodes, links, entry_pages?}` payload into a [`FlowGraph`]
//! - [`break_cycles`]: drop everything Kahn's algorithm cannot order
//! - [`flow`]: aggregate per-session page views into a payload
//!
//! Layout and geometry live in `sluice-render`.

pub mod config;
pub mod cycles;
pub mod error;
pub mod flow;
pub mod model;
pub mod normalize;

pub use config::SankeyConfig;
pub use cycles::{CycleBreak, ResolvedLink, break_cycles, topological_order};
pub use error::{Error, Result};
pub use model::{FlowGraph, FlowLink, FlowNode, Payload, PayloadLink, PayloadNode};
pub use normalize::{NormalizeOptions, normalize};

/// Normalizes `payload` and breaks cycles in one step.
pub fn prepare(
    payload: &serde_json::Value,
    options: &NormalizeOptions,
) -> Result<(FlowGraph, CycleBreak)> {
    let graph = normalize(payload, options)?;
    let cycles = break_cycles(&graph);
    Ok((graph, cycles))
}
