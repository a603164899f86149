use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use super::{
    content::{
        AttrValue,
        Attributes,
        ContentNode,
        Element,
        ImageNode,
        StructuredContent,
        TableKind,
    },
    placeholder::{
        PlaceholderRegistry,
        RenderScope,
    },
};
use crate::core::{
    utils::{
        camel_to_kebab,
        escape_html,
        is_safe_name,
        wrap_japanese_chars,
    },
    Definition,
    DefinitionKind,
};

const VOID_TAGS: [&str; 4] = ["br", "hr", "wbr", "img"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

/// A media asset referenced from rendered text, derived fresh per render.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaReference {
    pub kind: MediaKind,
    pub source_path: String,
    pub namespace: String,
    pub index: usize,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Wrap Japanese characters of simple definitions for click-to-lookup
    pub wrap_japanese: bool,
    pub lookup_class: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { wrap_japanese: true, lookup_class: "jreader-lookup".to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub html: String,
    pub media: Vec<MediaReference>,
}

/// Renders the main definition (`Main`) or the whole glossary (`Full`) as an ordered list.
///
/// Never fails: malformed content degrades to visible text, missing attribution to
/// "unknown", and attributes of unexpected shape are left out.
pub fn render_definitions(
    definitions: &[Definition],
    scope: RenderScope,
    options: &RenderOptions,
) -> Rendered {
    let selected = match scope {
        RenderScope::Main => &definitions[..definitions.len().min(1)],
        RenderScope::Full => definitions,
    };
    if selected.is_empty() {
        return Rendered::default();
    }

    let mut renderer = HtmlRenderer::new(scope, options);
    let mut html = String::new();
    let scope_name = match scope {
        RenderScope::Main => "main",
        RenderScope::Full => "full",
    };
    let _ = write!(html, "<div class=\"jreader-definitions\" data-scope=\"{}\"><ol>", scope_name);
    for definition in selected {
        renderer.render_definition(definition, &mut html);
    }
    html.push_str("</ol></div>");

    Rendered { html, media: renderer.media }
}

struct HtmlRenderer<'a> {
    options: &'a RenderOptions,
    registry: PlaceholderRegistry,
    media: Vec<MediaReference>,
    namespace: String,
}

impl<'a> HtmlRenderer<'a> {
    fn new(scope: RenderScope, options: &'a RenderOptions) -> Self {
        Self {
            options,
            registry: PlaceholderRegistry::new(scope),
            media: Vec::new(),
            namespace: String::new(),
        }
    }

    fn render_definition(&mut self, definition: &Definition, out: &mut String) {
        let title = escape_html(definition.display_title());
        self.namespace = definition.namespace().to_string();

        let _ = write!(out, "<li data-dictionary=\"{}\"><i>({})</i> ", title, title);
        match definition.kind {
            DefinitionKind::Simple => {
                let text = match &definition.content {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                let escaped = escape_html(&text);
                if self.options.wrap_japanese {
                    out.push_str(&wrap_japanese_chars(&escaped, &self.options.lookup_class));
                } else {
                    out.push_str(&escaped);
                }
            }
            DefinitionKind::Structured => match StructuredContent::parse(&definition.content) {
                StructuredContent::Tree(node) => self.render_node(&node, out),
                StructuredContent::Raw(raw) => out.push_str(&escape_html(&raw)),
            },
        }
        out.push_str("</li>");
    }

    fn render_node(&mut self, node: &ContentNode, out: &mut String) {
        match node {
            ContentNode::Text(text) => out.push_str(&escape_html(text)),
            ContentNode::Fragment(children) => self.render_children(children, out),
            ContentNode::Generic(element) => self.render_element(element, out),
            ContentNode::ListItem(element) => {
                // Source data uses <li> without a parent list; give each one its own
                out.push_str("<ul class=\"jreader-list\">");
                self.render_element(element, out);
                out.push_str("</ul>");
            }
            ContentNode::TableGroup(kind, element) => self.render_table_group(*kind, element, out),
            ContentNode::LineBreak(attrs) => {
                let _ = write!(out, "<br{}>", attributes_html(attrs, None, None));
            }
            ContentNode::Link(link) => {
                let _ = write!(
                    out,
                    "<a href=\"{}\"{}>",
                    escape_html(&link.href),
                    attributes_html(&link.attrs, None, None)
                );
                self.render_children(&link.children, out);
                out.push_str("</a>");
            }
            ContentNode::Image(image) => self.render_image(image, out),
        }
    }

    fn render_children(&mut self, children: &[ContentNode], out: &mut String) {
        for child in children {
            self.render_node(child, out);
        }
    }

    fn render_element(&mut self, element: &Element, out: &mut String) {
        let tag = element.tag.as_str();
        let _ = write!(out, "<{}{}>", tag, attributes_html(&element.attrs, None, None));
        if VOID_TAGS.contains(&tag) {
            return;
        }
        self.render_children(&element.children, out);
        let _ = write!(out, "</{}>", tag);
    }

    /// Table markup from dictionaries is often malformed, so rows and cells become
    /// flex containers instead of real table elements.
    fn render_table_group(&mut self, kind: TableKind, element: &Element, out: &mut String) {
        let _ = write!(
            out,
            "<div{}>",
            attributes_html(&element.attrs, Some(kind.class_name()), Some(kind.layout()))
        );
        self.render_children(&element.children, out);
        out.push_str("</div>");
    }

    fn render_image(&mut self, image: &ImageNode, out: &mut String) {
        let mut layout = Vec::new();
        let mut sizing = String::new();
        let em_units = image.size_units.as_deref() == Some("em");

        for (name, value) in [("width", image.width), ("height", image.height)] {
            let Some(value) = value.filter(|v| v.is_finite() && *v > 0.0) else {
                continue;
            };
            if em_units {
                layout.push(format!("{}: {}em", name, value));
            } else {
                let _ = write!(sizing, " {}=\"{}\"", name, value);
            }
        }
        if let Some(align) = &image.vertical_align {
            layout.push(format!("vertical-align: {}", align));
        }
        let layout = layout.join("; ");
        let layout = (!layout.is_empty()).then_some(layout.as_str());

        out.push_str("<img");
        if let Some(path) = &image.path {
            let (index, token) = self.registry.next(&self.namespace);
            let _ = write!(out, " src=\"{}\"", token);
            self.media.push(MediaReference {
                kind: MediaKind::Image,
                source_path: path.clone(),
                namespace: self.namespace.clone(),
                index,
                token,
            });
        }
        out.push_str(&sizing);
        out.push_str(&attributes_html(&image.attrs, None, layout));
        out.push('>');
    }
}

/// Reproduces every usable attribute: plain attributes, `data-*` keys and the style map.
/// `class` and `layout` are renderer-owned and go in front of the dictionary's own values.
fn attributes_html(attrs: &Attributes, class: Option<&str>, layout: Option<&str>) -> String {
    let mut out = String::new();

    let mut classes: Vec<String> = class.map(|c| vec![c.to_string()]).unwrap_or_default();
    if let Some(AttrValue::Text(own)) = attrs.other.get("class") {
        classes.push(escape_html(own));
    }
    if !classes.is_empty() {
        let _ = write!(out, " class=\"{}\"", classes.join(" "));
    }

    for (name, value) in &attrs.other {
        let lowered = name.to_ascii_lowercase();
        // style and class are merged above; event handlers are never reproduced
        if lowered == "class" || lowered == "style" || lowered.starts_with("on") {
            continue;
        }
        if !is_safe_name(name) {
            continue;
        }
        match value {
            AttrValue::Flag(true) => {
                let _ = write!(out, " {}", lowered);
            }
            AttrValue::Flag(false) => {}
            AttrValue::Text(text) => {
                let _ = write!(out, " {}=\"{}\"", lowered, escape_html(text));
            }
        }
    }

    for (key, value) in &attrs.data {
        if !is_safe_name(key) {
            continue;
        }
        let _ = write!(out, " data-{}=\"{}\"", camel_to_kebab(key), escape_html(value));
    }

    let mut declarations: Vec<String> = layout.map(|l| vec![l.to_string()]).unwrap_or_default();
    declarations.extend(
        attrs
            .style
            .iter()
            .filter(|(property, _)| is_safe_name(property))
            .map(|(property, value)| format!("{}: {}", camel_to_kebab(property), value)),
    );
    if !declarations.is_empty() {
        let _ = write!(out, " style=\"{}\"", escape_html(&declarations.join("; ")));
    }

    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::render::placeholder::image_token;

    fn image_definition(dictionary: &str, path: &str) -> Definition {
        Definition::structured(json!({"tag": "img", "path": path})).with_dictionary(dictionary)
    }

    fn plain() -> RenderOptions {
        RenderOptions { wrap_japanese: false, ..RenderOptions::default() }
    }

    #[test]
    fn test_images_from_different_dictionaries_get_distinct_tokens() {
        let definitions = vec![image_definition("A", "img/1.png"), image_definition("B", "img/1.png")];
        let rendered = render_definitions(&definitions, RenderScope::Full, &plain());

        assert_eq!(rendered.media.len(), 2);
        assert_eq!(rendered.media[0].index, 0);
        assert_eq!(rendered.media[1].index, 0);
        assert_ne!(rendered.media[0].token, rendered.media[1].token);
        assert!(rendered.html.contains(&image_token("A", 0)));
        assert!(rendered.html.contains(&image_token("B", 0)));
    }

    #[test]
    fn test_indices_restart_for_each_render_call() {
        let definitions = vec![
            Definition::structured(json!([
                {"tag": "img", "path": "a.png"},
                {"tag": "img", "path": "b.png"}
            ]))
            .with_dictionary("A"),
            image_definition("A", "c.png"),
        ];

        let main = render_definitions(&definitions, RenderScope::Main, &plain());
        let full = render_definitions(&definitions, RenderScope::Full, &plain());

        let main_indices: Vec<usize> = main.media.iter().map(|m| m.index).collect();
        let full_indices: Vec<usize> = full.media.iter().map(|m| m.index).collect();
        assert_eq!(main_indices, vec![0, 1]);
        assert_eq!(full_indices, vec![0, 1, 2]);
        assert_eq!(main.media[0].token, full.media[0].token);
    }

    #[test]
    fn test_main_scope_renders_first_definition_only() {
        let definitions = vec![
            Definition::simple("first").with_dictionary("A"),
            Definition::simple("second").with_dictionary("B"),
        ];
        let main = render_definitions(&definitions, RenderScope::Main, &plain());
        assert!(main.html.contains("first"));
        assert!(!main.html.contains("second"));

        let full = render_definitions(&definitions, RenderScope::Full, &plain());
        assert_eq!(
            full.html,
            "<div class=\"jreader-definitions\" data-scope=\"full\"><ol>\
             <li data-dictionary=\"A\"><i>(A)</i> first</li>\
             <li data-dictionary=\"B\"><i>(B)</i> second</li>\
             </ol></div>"
        );
    }

    #[test]
    fn test_empty_definitions_render_nothing() {
        let rendered = render_definitions(&[], RenderScope::Full, &plain());
        assert_eq!(rendered, Rendered::default());
    }

    #[test]
    fn test_malformed_serialized_content_is_shown_verbatim() {
        let raw = "{\"tag\": \"div\", \"content\": [\"unterminated\"";
        let definitions = vec![Definition::structured(json!(raw))];
        let rendered = render_definitions(&definitions, RenderScope::Full, &plain());
        assert!(rendered.html.contains(&escape_html(raw)));
        assert!(rendered.html.contains("<i>(unknown)</i>"));
    }

    #[test]
    fn test_simple_definitions_are_escaped_and_wrapped() {
        let definitions = vec![Definition::simple("<b>to eat</b> 食").with_dictionary("JMdict")];
        let rendered = render_definitions(&definitions, RenderScope::Main, &RenderOptions::default());
        assert!(rendered.html.contains("&lt;b&gt;to eat&lt;/b&gt; "));
        assert!(rendered.html.contains("<span class=\"jreader-lookup\">食</span>"));
    }

    #[test]
    fn test_list_items_get_their_own_list() {
        let definitions =
            vec![Definition::structured(json!({"tag": "li", "content": "orphan"})).with_dictionary("A")];
        let rendered = render_definitions(&definitions, RenderScope::Full, &plain());
        assert!(rendered.html.contains("<ul class=\"jreader-list\"><li>orphan</li></ul>"));
    }

    #[test]
    fn test_tables_render_as_flex_containers() {
        let definitions = vec![Definition::structured(json!({
            "tag": "table",
            "content": {"tag": "tr", "content": [{"tag": "td", "content": "x"}]}
        }))];
        let rendered = render_definitions(&definitions, RenderScope::Full, &plain());
        assert!(!rendered.html.contains("<table"));
        assert!(!rendered.html.contains("<tr"));
        assert!(rendered.html.contains(
            "<div class=\"jr-table\" style=\"display: flex; flex-direction: column\">\
             <div class=\"jr-tr\" style=\"display: flex; flex-direction: row\">\
             <div class=\"jr-td\" style=\"flex: 1\">x</div></div></div>"
        ));
    }

    #[test]
    fn test_links_require_href() {
        let definitions = vec![Definition::structured(json!([
            {"tag": "a", "href": "?query=猫", "content": "猫"},
            {"tag": "a", "content": "dangling"}
        ]))];
        let rendered = render_definitions(&definitions, RenderScope::Full, &plain());
        assert!(rendered.html.contains("<a href=\"?query=猫\">猫</a>"));
        assert!(rendered.html.contains("<span>dangling</span>"));
    }

    #[test]
    fn test_generic_attributes_are_reproduced() {
        let definitions = vec![Definition::structured(json!({
            "tag": "details",
            "open": true,
            "hidden": false,
            "title": "a \"quoted\" title",
            "onclick": "alert(1)",
            "data": {"scContent": "example"},
            "style": {"fontWeight": "bold"},
            "content": {"tag": "summary", "content": "more"}
        }))];
        let rendered = render_definitions(&definitions, RenderScope::Full, &plain());
        assert!(rendered.html.contains(
            "<details open title=\"a &quot;quoted&quot; title\" data-sc-content=\"example\" \
             style=\"font-weight: bold\"><summary>more</summary></details>"
        ));
        assert!(!rendered.html.contains("onclick"));
        assert!(!rendered.html.contains("hidden"));
    }

    #[test]
    fn test_image_sizing_and_missing_path() {
        let definitions = vec![Definition::structured(json!([
            {"tag": "img", "path": "gaiji/1.svg", "width": 1.5, "height": 1, "sizeUnits": "em",
             "verticalAlign": "middle", "alt": "x"},
            {"tag": "img", "width": 20}
        ]))
        .with_attribution("Daijirin", "daijirin")];
        let rendered = render_definitions(&definitions, RenderScope::Full, &plain());

        assert_eq!(rendered.media.len(), 1);
        assert_eq!(rendered.media[0].namespace, "daijirin");
        assert_eq!(rendered.media[0].source_path, "gaiji/1.svg");
        assert!(rendered.html.contains(&format!(
            "<img src=\"{}\" alt=\"x\" style=\"width: 1.5em; height: 1em; vertical-align: middle\">",
            image_token("daijirin", 0)
        )));
        assert!(rendered.html.contains("<img width=\"20\">"));
    }

    #[test]
    fn test_title_and_namespace_resolve_independently() {
        let definitions =
            vec![Definition::structured(json!({"tag": "img", "path": "p.png"})).with_attribution("大辞泉", "daijisen")];
        let rendered = render_definitions(&definitions, RenderScope::Main, &plain());
        assert!(rendered.html.contains("<i>(大辞泉)</i>"));
        assert_eq!(rendered.media[0].token, image_token("daijisen", 0));
    }

    #[test]
    fn test_line_breaks_are_void() {
        let definitions = vec![Definition::structured(json!(["a", {"tag": "br"}, "b"]))];
        let rendered = render_definitions(&definitions, RenderScope::Full, &plain());
        assert!(rendered.html.contains("a<br>b"));
    }

    proptest::proptest! {
        #[test]
        fn prop_rendering_never_panics(raw in "\\PC*") {
            let definitions = vec![
                Definition::structured(Value::String(raw.clone())),
                Definition::simple(raw.clone()),
            ];
            let rendered = render_definitions(&definitions, RenderScope::Full, &RenderOptions::default());
            proptest::prop_assert!(rendered.html.starts_with("<div"));
        }
    }
}
