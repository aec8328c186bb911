//! Page-flow aggregation: turns per-session page views into a Sankey payload.

use crate::config::SankeyConfig;
use crate::model::{Payload, PayloadLink, PayloadNode};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageView {
    pub session_id: String,
    pub page_url: String,
    /// Any monotonic timestamp; only the ordering within a session matters.
    pub timestamp: i64,
}

/// Maps raw page URLs to stable node names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUrlNormalizer {
    pub root_label: String,
    pub unknown_label: String,
    /// Single-segment path to display label, e.g. `login -> Login`.
    pub aliases: IndexMap<String, String>,
}

impl Default for PageUrlNormalizer {
    fn default() -> Self {
        Self::from_config(&SankeyConfig::defaults())
    }
}

impl PageUrlNormalizer {
    pub fn from_config(cfg: &SankeyConfig) -> Self {
        let aliases = cfg
            .get("flow.aliases")
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            root_label: cfg.get_str("flow.rootLabel").unwrap_or("Home").to_string(),
            unknown_label: cfg
                .get_str("flow.unknownLabel")
                .unwrap_or("Unknown")
                .to_string(),
            aliases,
        }
    }

    /// Normalizes `raw` to a node name.
    ///
    /// - scheme, host, query and fragment are ignored; relative paths are accepted
    /// - numeric path segments collapse to `:id`
    /// - `/` maps to the root label
    /// - a single segment goes through the alias table, otherwise is kept verbatim
    /// - deeper paths keep their first three segments joined by `" > "`
    pub fn normalize(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return self.unknown_label.clone();
        }
        let Some(url) = parse_page_url(raw) else {
            return self.unknown_label.clone();
        };

        let path = collapse_numeric_segments(url.path());
        if path.is_empty() || path == "/" {
            return self.root_label.clone();
        }

        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [single] => self
                .aliases
                .get(*single)
                .cloned()
                .unwrap_or_else(|| (*single).to_string()),
            _ => parts.iter().take(3).copied().collect::<Vec<_>>().join(" > "),
        }
    }
}

fn parse_page_url(raw: &str) -> Option<Url> {
    static BASE: OnceLock<Option<Url>> = OnceLock::new();
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = BASE
                .get_or_init(|| Url::parse("http://localhost/").ok())
                .as_ref()?;
            base.join(raw).ok()
        }
        Err(_) => None,
    }
}

fn collapse_numeric_segments(path: &str) -> String {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    static INNER: OnceLock<Regex> = OnceLock::new();
    let trailing =
        TRAILING.get_or_init(|| Regex::new(r"/\d+$").expect("trailing id regex must compile"));
    let inner = INNER.get_or_init(|| Regex::new(r"/\d+/").expect("inner id regex must compile"));
    let path = trailing.replace_all(path, "/:id");
    inner.replace_all(&path, "/:id/").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOptions {
    /// Maximum transitions taken from the start of each session.
    pub max_hops: usize,
    pub normalizer: PageUrlNormalizer,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::from_config(&SankeyConfig::defaults())
    }
}

impl FlowOptions {
    pub fn from_config(cfg: &SankeyConfig) -> Self {
        Self {
            max_hops: cfg.get_usize("flow.maxHops").unwrap_or(3),
            normalizer: PageUrlNormalizer::from_config(cfg),
        }
    }
}

/// Aggregates page views into `{nodes, links, entry_pages}`.
///
/// Sessions keep their first-seen order and are sorted by timestamp internally. Each session
/// contributes at most `max_hops` transitions; transitions that stay on the same normalized page
/// are skipped. Nodes are sorted by name, links keep first-seen order, and `entry_pages` counts
/// the first page of every session.
pub fn build_page_flow(views: &[PageView], options: &FlowOptions) -> Payload {
    let mut sessions: IndexMap<&str, Vec<&PageView>> = IndexMap::new();
    for v in views {
        sessions.entry(v.session_id.as_str()).or_default().push(v);
    }

    let mut counts: IndexMap<(String, String), u64> = IndexMap::new();
    let mut entry_pages: IndexMap<String, u64> = IndexMap::new();
    for session in sessions.values_mut() {
        session.sort_by_key(|v| v.timestamp);
        let pages: Vec<String> = session
            .iter()
            .map(|v| options.normalizer.normalize(&v.page_url))
            .collect();

        if let Some(first) = pages.first() {
            *entry_pages.entry(first.clone()).or_default() += 1;
        }

        for pair in pages.windows(2).take(options.max_hops) {
            let [from, to] = pair else { continue };
            if from == to {
                continue;
            }
            *counts.entry((from.clone(), to.clone())).or_default() += 1;
        }
    }

    let names: BTreeSet<&str> = counts
        .keys()
        .flat_map(|(s, t)| [s.as_str(), t.as_str()])
        .collect();

    Payload {
        nodes: names
            .into_iter()
            .map(|name| PayloadNode {
                name: name.to_string(),
            })
            .collect(),
        links: counts
            .iter()
            .map(|((source, target), count)| PayloadLink {
                source: source.clone(),
                target: target.clone(),
                value: *count as f64,
            })
            .collect(),
        entry_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(session: &str, url: &str, ts: i64) -> PageView {
        PageView {
            session_id: session.to_string(),
            page_url: url.to_string(),
            timestamp: ts,
        }
    }

    #[test]
    fn page_urls_normalize_to_stable_names() {
        let n = PageUrlNormalizer::default();
        assert_eq!(n.normalize("https://example.com/"), "Home");
        assert_eq!(n.normalize("https://example.com"), "Home");
        assert_eq!(n.normalize("/login?next=/x"), "Login");
        assert_eq!(n.normalize("/pricing"), "pricing");
        assert_eq!(n.normalize("/models/42"), "models > :id");
        assert_eq!(n.normalize("/a/1/b/2/c"), "a > :id > b");
        assert_eq!(n.normalize(""), "Unknown");
        assert_eq!(n.normalize("http://[::1"), "Unknown");
    }

    #[test]
    fn build_page_flow_counts_transitions_and_entries() {
        let views = vec![
            view("s1", "/", 1),
            view("s1", "/search", 2),
            view("s1", "/models/7", 3),
            view("s2", "/search", 5),
            view("s2", "/models/9", 6),
            view("s2", "/models/9", 7),
            view("s1", "/submit", 4),
        ];
        let payload = build_page_flow(&views, &FlowOptions::default());

        let names: Vec<&str> = payload.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Home", "Search", "Submit", "models > :id"]);

        let links: Vec<(&str, &str, f64)> = payload
            .links
            .iter()
            .map(|l| (l.source.as_str(), l.target.as_str(), l.value))
            .collect();
        assert_eq!(
            links,
            vec![
                ("Home", "Search", 1.0),
                ("Search", "models > :id", 2.0),
                ("models > :id", "Submit", 1.0),
            ]
        );
        assert_eq!(payload.entry_pages.get("Home"), Some(&1));
        assert_eq!(payload.entry_pages.get("Search"), Some(&1));
    }

    #[test]
    fn build_page_flow_caps_hops_per_session() {
        let views: Vec<PageView> = ["/a", "/b", "/c", "/d", "/e"]
            .iter()
            .enumerate()
            .map(|(i, u)| view("s", u, i as i64))
            .collect();
        let opts = FlowOptions {
            max_hops: 2,
            ..Default::default()
        };
        let payload = build_page_flow(&views, &opts);
        assert_eq!(payload.links.len(), 2);
        assert_eq!(payload.links[1].target, "c");
    }

    #[test]
    fn single_view_sessions_only_count_as_entries() {
        let payload = build_page_flow(&[view("s", "/", 0)], &FlowOptions::default());
        assert!(payload.nodes.is_empty());
        assert!(payload.links.is_empty());
        assert_eq!(payload.entry_pages.get("Home"), Some(&1));
    }
}
