//! Property and fulltext extraction from node variants.

use crate::content::Node;
use crate::index::FulltextFragments;
use crate::node_types::{FulltextExtractor, NodeTypeRegistry, PropertySearchSettings};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// Stored properties and fulltext fragments of one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedNode {
    pub properties: serde_json::Map<String, Value>,
    pub fulltext: FulltextFragments,
}

/// Turns a node into the payload written to the index.
pub trait PropertyExtractor: Send + Sync {
    fn extract(&self, node: &Node) -> ExtractedNode;
}

/// Extraction driven by node type search settings.
///
/// Every property is stored unless its type disables `search.indexing` for
/// it. Properties with a `fulltext_extractor` also feed the fulltext buckets,
/// unless the node type disables fulltext. Nodes of unknown types keep all
/// properties and produce no fulltext.
pub struct ConfiguredExtractor {
    node_types: Arc<NodeTypeRegistry>,
}

impl ConfiguredExtractor {
    pub fn new(node_types: Arc<NodeTypeRegistry>) -> Self {
        Self { node_types }
    }
}

impl PropertyExtractor for ConfiguredExtractor {
    fn extract(&self, node: &Node) -> ExtractedNode {
        let definition = self.node_types.get(&node.node_type);
        if definition.is_none() {
            tracing::debug!(node_type = %node.node_type, "indexing node of unregistered type");
        }
        let fulltext_enabled = definition.is_some_and(|d| d.search.fulltext.enable);
        let defaults = PropertySearchSettings::default();

        let mut extracted = ExtractedNode::default();
        for (name, value) in &node.properties {
            let settings = definition
                .and_then(|d| d.properties.get(name))
                .map(|property| &property.search)
                .unwrap_or(&defaults);

            if settings.indexing {
                extracted.properties.insert(name.clone(), value.clone());
            }

            if !fulltext_enabled {
                continue;
            }
            if let Some(extractor) = settings.fulltext_extractor {
                for (bucket, text) in extractor.apply(value) {
                    push_text(&mut extracted.fulltext, &bucket, &text);
                }
            }
        }

        extracted
            .properties
            .insert("__identifier".into(), Value::String(node.identity.clone()));
        extracted
            .properties
            .insert("__type".into(), Value::String(node.node_type.clone()));
        extracted
            .properties
            .insert("__dimensionshash".into(), Value::String(node.dimensions_hash()));

        extracted
    }
}

/// Flatten a property value into text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null | Value::Object(_) => String::new(),
    }
}

fn push_text(fragments: &mut FulltextFragments, bucket: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    let content = fragments.entry(bucket.to_string()).or_default();
    if !content.is_empty() {
        content.push(' ');
    }
    content.push_str(text);
}

fn heading_regex() -> &'static Regex {
    static HEADING_REGEX: OnceLock<Regex> = OnceLock::new();
    HEADING_REGEX.get_or_init(|| {
        Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").expect("valid heading pattern")
    })
}

fn tag_regex() -> &'static Regex {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_REGEX.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"))
}

/// Strip markup, decode the common entities, and collapse whitespace.
fn plain_text(markup: &str) -> String {
    let stripped = tag_regex().replace_all(markup, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Route headings into `h1`..`h6` and everything else into `text`.
fn extract_html(markup: &str, fragments: &mut FulltextFragments) {
    for captures in heading_regex().captures_iter(markup) {
        let bucket = format!("h{}", &captures[1]);
        push_text(fragments, &bucket, &plain_text(&captures[2]));
    }
    let body = heading_regex().replace_all(markup, " ");
    push_text(fragments, "text", &plain_text(&body));
}

impl FulltextExtractor {
    /// Extract `value` the way this extractor would for a property.
    pub fn apply(&self, value: &Value) -> FulltextFragments {
        let mut fragments = FulltextFragments::new();
        let text = value_text(value);
        match self.bucket() {
            Some(bucket) => push_text(&mut fragments, bucket, &plain_text(&text)),
            None => extract_html(&text, &mut fragments),
        }
        fragments
    }
}
