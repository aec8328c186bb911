//! Payload validation and entry-node synthesis.

use crate::config::{SankeyConfig, kind};
use crate::model::{FlowGraph, FlowLink, FlowNode};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    /// Synthesize the shared entry node from `entry_pages`.
    pub synthesize_entry: bool,
    pub entry_label: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            synthesize_entry: true,
            entry_label: "Entry".to_string(),
        }
    }
}

impl NormalizeOptions {
    pub fn from_config(cfg: &SankeyConfig) -> Self {
        let defaults = Self::default();
        Self {
            synthesize_entry: cfg
                .get_bool("entry.enabled")
                .unwrap_or(defaults.synthesize_entry),
            entry_label: cfg
                .get_str("entry.label")
                .map(str::to_string)
                .unwrap_or(defaults.entry_label),
        }
    }
}

/// Validates a raw payload and produces fresh node/link collections.
///
/// When `entry_pages` has at least one positive arrival count a single shared entry node is
/// appended after the payload nodes, with one link from it to every such page. If a payload node
/// or link endpoint already uses the entry label, the entry node gets a `label (n)` name instead.
/// Links to pages
/// missing from `nodes` are kept here and dropped later like any other dangling link.
///
/// Duplicate node names are merged with last-write-wins semantics: the surviving entry is the
/// last occurrence and indices are reassigned densely.
pub fn normalize(payload: &Value, options: &NormalizeOptions) -> Result<FlowGraph> {
    let Some(obj) = payload.as_object() else {
        return Err(Error::invalid_payload(format!(
            "expected an object, found {}",
            kind(payload)
        )));
    };

    let raw_nodes = array_field(obj, "nodes")?;
    let raw_links = array_field(obj, "links")?;
    let entry_pages = entry_pages(obj)?;

    let mut names: Vec<(String, bool)> = Vec::with_capacity(raw_nodes.len() + 1);
    for (i, n) in raw_nodes.iter().enumerate() {
        let name = n
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_payload(format!("nodes[{i}] has no string `name`")))?;
        names.push((name.to_string(), false));
    }

    let mut links: Vec<FlowLink> = Vec::with_capacity(raw_links.len() + entry_pages.len());
    for (i, l) in raw_links.iter().enumerate() {
        let source = link_endpoint(l, i, "source")?;
        let target = link_endpoint(l, i, "target")?;
        let value = l
            .get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::invalid_payload(format!("links[{i}] has no numeric `value`")))?;
        if !(value.is_finite() && value > 0.0) {
            tracing::debug!(index = i, source, target, value, "dropping non-positive link");
            continue;
        }
        links.push(FlowLink {
            source: source.to_string(),
            target: target.to_string(),
            value,
            synthetic: false,
        });
    }

    let arrivals: Vec<(&str, f64)> = entry_pages
        .into_iter()
        .filter(|(_, count)| count.is_finite() && *count > 0.0)
        .collect();
    if options.synthesize_entry && !arrivals.is_empty() {
        let label = free_entry_label(&options.entry_label, &names, &links);
        for (page, count) in arrivals {
            links.push(FlowLink {
                source: label.clone(),
                target: page.to_string(),
                value: count,
                synthetic: true,
            });
        }
        names.push((label, true));
    }

    Ok(FlowGraph {
        nodes: merge_duplicate_names(names),
        links,
    })
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Vec<Value>> {
    match obj.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(Error::invalid_payload(format!(
            "`{key}` must be an array, found {}",
            kind(other)
        ))),
        None => Err(Error::invalid_payload(format!("missing `{key}`"))),
    }
}

fn link_endpoint<'a>(link: &'a Value, i: usize, key: &str) -> Result<&'a str> {
    link.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_payload(format!("links[{i}] has no string `{key}`")))
}

fn entry_pages(obj: &Map<String, Value>) -> Result<Vec<(&str, f64)>> {
    let pages = match obj.get("entry_pages") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(pages)) => pages,
        Some(other) => {
            return Err(Error::invalid_payload(format!(
                "`entry_pages` must be an object, found {}",
                kind(other)
            )));
        }
    };
    pages
        .iter()
        .map(|(page, count)| {
            count
                .as_f64()
                .map(|c| (page.as_str(), c))
                .ok_or_else(|| {
                    Error::invalid_payload(format!("entry_pages[{page:?}] must be a number"))
                })
        })
        .collect()
}

/// Returns `label`, or `label (2)`, `label (3)`, ... if a payload node or link endpoint already
/// uses it.
fn free_entry_label(label: &str, names: &[(String, bool)], links: &[FlowLink]) -> String {
    let taken = |candidate: &str| {
        names.iter().any(|(name, _)| name == candidate)
            || links
                .iter()
                .any(|l| l.source == candidate || l.target == candidate)
    };
    if !taken(label) {
        return label.to_string();
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{label} ({n})");
        if !taken(&candidate) {
            tracing::debug!(label, renamed = %candidate, "entry label collides with a page");
            return candidate;
        }
        n += 1;
    }
}

fn merge_duplicate_names(names: Vec<(String, bool)>) -> Vec<FlowNode> {
    let mut last: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, (name, _)) in names.iter().enumerate() {
        last.insert(name.as_str(), i);
    }
    let keep: Vec<bool> = names
        .iter()
        .enumerate()
        .map(|(i, (name, _))| last.get(name.as_str()) == Some(&i))
        .collect();
    drop(last);

    let merged = keep.iter().filter(|k| !**k).count();
    if merged > 0 {
        tracing::debug!(merged, "merged duplicate node names");
    }

    names
        .into_iter()
        .zip(keep)
        .filter_map(|(entry, keep)| keep.then_some(entry))
        .enumerate()
        .map(|(index, (name, synthetic))| FlowNode {
            name,
            index,
            synthetic,
        })
        .collect()
}
