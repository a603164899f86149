//! Dictionary-supplied structured content, parsed into a closed set of node kinds.
//!
//! Parsing never fails: unknown tags become [`ContentNode::Generic`], attributes of
//! unexpected shape are dropped, and a string that does not decode into a tree is
//! kept as [`StructuredContent::Raw`].

use std::collections::BTreeMap;

use serde_json::{
    Map,
    Value,
};

use crate::core::utils::is_safe_name;

pub const DEFAULT_TAG: &str = "span";

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Flag(bool),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub style: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
    pub other: BTreeMap<String, AttrValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Attributes,
    pub children: Vec<ContentNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageNode {
    pub path: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub size_units: Option<String>,
    pub vertical_align: Option<String>,
    pub attrs: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkNode {
    pub href: String,
    pub attrs: Attributes,
    pub children: Vec<ContentNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Table,
    Head,
    Body,
    Foot,
    Row,
    Cell,
    HeaderCell,
}

impl TableKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "table" => Some(TableKind::Table),
            "thead" => Some(TableKind::Head),
            "tbody" => Some(TableKind::Body),
            "tfoot" => Some(TableKind::Foot),
            "tr" => Some(TableKind::Row),
            "td" => Some(TableKind::Cell),
            "th" => Some(TableKind::HeaderCell),
            _ => None,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            TableKind::Table => "jr-table",
            TableKind::Head => "jr-thead",
            TableKind::Body => "jr-tbody",
            TableKind::Foot => "jr-tfoot",
            TableKind::Row => "jr-tr",
            TableKind::Cell => "jr-td",
            TableKind::HeaderCell => "jr-th",
        }
    }

    /// Layout applied to the flex container standing in for the table element.
    pub fn layout(&self) -> &'static str {
        match self {
            TableKind::Table | TableKind::Head | TableKind::Body | TableKind::Foot => {
                "display: flex; flex-direction: column"
            }
            TableKind::Row => "display: flex; flex-direction: row",
            TableKind::Cell => "flex: 1",
            TableKind::HeaderCell => "flex: 1; font-weight: bold",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode {
    Text(String),
    Fragment(Vec<ContentNode>),
    Image(ImageNode),
    Link(LinkNode),
    ListItem(Element),
    TableGroup(TableKind, Element),
    LineBreak(Attributes),
    Generic(Element),
}

/// Result of interpreting a structured definition's `content` field.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredContent {
    Tree(ContentNode),
    Raw(String),
}

impl StructuredContent {
    pub fn parse(content: &Value) -> Self {
        match content {
            Value::String(raw) => match serde_json::from_str::<Value>(raw.trim()) {
                Ok(decoded @ (Value::Object(_) | Value::Array(_))) => {
                    StructuredContent::Tree(ContentNode::from_value(&decoded))
                }
                _ => StructuredContent::Raw(raw.clone()),
            },
            other => StructuredContent::Tree(ContentNode::from_value(other)),
        }
    }
}

impl ContentNode {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => ContentNode::Fragment(Vec::new()),
            Value::String(s) => ContentNode::Text(s.clone()),
            Value::Bool(b) => ContentNode::Text(b.to_string()),
            Value::Number(n) => ContentNode::Text(n.to_string()),
            Value::Array(items) => {
                ContentNode::Fragment(items.iter().map(ContentNode::from_value).collect())
            }
            Value::Object(map) => Self::from_object(map),
        }
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        let tag = map.get("tag").and_then(Value::as_str).map(str::to_ascii_lowercase);

        // Yomitan wraps trees as {"type": "structured-content", "content": ...} and
        // stores standalone pictures as {"type": "image", "path": ...}
        if tag.is_none() {
            match map.get("type").and_then(Value::as_str) {
                Some("structured-content") => {
                    return map.get("content").map(Self::from_value).unwrap_or_default();
                }
                Some("image") => return ContentNode::Image(ImageNode::from_object(map)),
                Some("text") => {
                    let text = map.get("text").and_then(Value::as_str).unwrap_or_default();
                    return ContentNode::Text(text.to_string());
                }
                _ => {}
            }
        }

        let tag = tag.unwrap_or_else(|| DEFAULT_TAG.to_string());
        let children = children_of(map);

        match tag.as_str() {
            "img" => ContentNode::Image(ImageNode::from_object(map)),
            "a" => match map.get("href").and_then(Value::as_str).filter(|h| !h.trim().is_empty()) {
                Some(href) => ContentNode::Link(LinkNode {
                    href: href.to_string(),
                    attrs: Attributes::from_object(map, &["href"]),
                    children,
                }),
                None => ContentNode::Generic(Element {
                    tag: DEFAULT_TAG.to_string(),
                    attrs: Attributes::from_object(map, &[]),
                    children,
                }),
            },
            "li" => ContentNode::ListItem(Element {
                tag,
                attrs: Attributes::from_object(map, &[]),
                children,
            }),
            "br" => ContentNode::LineBreak(Attributes::from_object(map, &[])),
            _ => {
                let attrs = Attributes::from_object(map, &[]);
                match TableKind::from_tag(&tag) {
                    Some(kind) => ContentNode::TableGroup(kind, Element { tag, attrs, children }),
                    None => {
                        let tag = if is_safe_name(&tag) { tag } else { DEFAULT_TAG.to_string() };
                        ContentNode::Generic(Element { tag, attrs, children })
                    }
                }
            }
        }
    }
}

impl Default for ContentNode {
    fn default() -> Self {
        ContentNode::Fragment(Vec::new())
    }
}

fn children_of(map: &Map<String, Value>) -> Vec<ContentNode> {
    match map.get("content") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(ContentNode::from_value).collect(),
        Some(other) => vec![ContentNode::from_value(other)],
    }
}

const RESERVED_KEYS: [&str; 4] = ["tag", "content", "style", "data"];

impl Attributes {
    fn from_object(map: &Map<String, Value>, skip: &[&str]) -> Self {
        let mut attrs = Attributes::default();

        if let Some(Value::Object(style)) = map.get("style") {
            attrs.style = style
                .iter()
                .filter_map(|(k, v)| scalar_text(v).map(|text| (k.clone(), text)))
                .collect();
        }

        if let Some(Value::Object(data)) = map.get("data") {
            attrs.data = data
                .iter()
                .filter_map(|(k, v)| scalar_text(v).map(|text| (k.clone(), text)))
                .collect();
        }

        for (key, value) in map {
            if RESERVED_KEYS.contains(&key.as_str()) || skip.contains(&key.as_str()) {
                continue;
            }
            let attr = match value {
                Value::Bool(b) => AttrValue::Flag(*b),
                Value::String(s) => AttrValue::Text(s.clone()),
                Value::Number(n) => AttrValue::Text(n.to_string()),
                _ => continue,
            };
            attrs.other.insert(key.clone(), attr);
        }

        attrs
    }

    pub fn is_empty(&self) -> bool {
        self.style.is_empty() && self.data.is_empty() && self.other.is_empty()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

const IMAGE_KEYS: [&str; 6] = ["path", "width", "height", "sizeUnits", "verticalAlign", "type"];

impl ImageNode {
    fn from_object(map: &Map<String, Value>) -> Self {
        ImageNode {
            path: map
                .get("path")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            width: map.get("width").and_then(Value::as_f64),
            height: map.get("height").and_then(Value::as_f64),
            size_units: map.get("sizeUnits").and_then(Value::as_str).map(str::to_string),
            vertical_align: map.get("verticalAlign").and_then(Value::as_str).map(str::to_string),
            attrs: Attributes::from_object(map, &IMAGE_KEYS),
        }
    }
}
