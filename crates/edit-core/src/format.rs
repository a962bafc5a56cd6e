use serde::{Deserialize, Serialize};

use crate::dom::{Attrs, Dom, ElementData, NodeId, Styles};
use crate::error::FormatError;

/// Placeholder substituted by the caller-supplied value (e.g. a colour).
pub const VALUE_SLOT: &str = "{{value}}";

pub const DEFAULT_BLOCK: &str = "p";

const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

fn default_style_tag() -> String {
    "span".to_string()
}

fn default_item_tag() -> String {
    "li".to_string()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn render(template: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => template.replace(VALUE_SLOT, value),
        None => template.to_string(),
    }
}

fn same_value(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Template match: slots accept any value unless one is given.
fn template_matches(template: &str, actual: &str, value: Option<&str>) -> bool {
    if template.contains(VALUE_SLOT) {
        match value {
            Some(value) => same_value(&render(template, Some(value)), actual),
            None => true,
        }
    } else {
        same_value(template, actual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineFormat {
    pub tag: String,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub same_tags: Vec<String>,
    #[serde(default)]
    pub same_styles: Styles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleFormat {
    #[serde(default = "default_style_tag")]
    pub tag: String,
    pub styles: Styles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFormat {
    pub tag: String,
    #[serde(default)]
    pub switchable: Vec<String>,
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub fallback: Option<String>,
}

impl BlockFormat {
    pub fn accepts(&self, tag: &str) -> bool {
        self.tag == tag || self.switchable.iter().any(|t| t == tag)
    }

    pub fn fallback_tag(&self) -> &str {
        self.fallback.as_deref().unwrap_or(DEFAULT_BLOCK)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFormat {
    pub tag: String,
    #[serde(default)]
    pub switchable: Vec<String>,
    #[serde(default = "default_item_tag")]
    pub item: String,
}

impl ListFormat {
    pub fn accepts(&self, tag: &str) -> bool {
        self.tag == tag || self.switchable.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Format {
    Inline(InlineFormat),
    Style(StyleFormat),
    Block(BlockFormat),
    List(ListFormat),
}

impl Format {
    pub fn inline(tag: &str, same_tags: &[&str]) -> Self {
        Format::Inline(InlineFormat {
            tag: tag.to_string(),
            attrs: Attrs::new(),
            same_tags: strings(same_tags),
            same_styles: Styles::new(),
        })
    }

    pub fn style(property: &str, template: &str) -> Self {
        let mut styles = Styles::new();
        styles.insert(property.to_string(), template.to_string());
        Format::Style(StyleFormat {
            tag: default_style_tag(),
            styles,
        })
    }

    pub fn bold() -> Self {
        let mut same_styles = Styles::new();
        same_styles.insert("font-weight".to_string(), "bold".to_string());
        Format::Inline(InlineFormat {
            tag: "strong".to_string(),
            attrs: Attrs::new(),
            same_tags: strings(&["b"]),
            same_styles,
        })
    }

    pub fn italic() -> Self {
        let mut same_styles = Styles::new();
        same_styles.insert("font-style".to_string(), "italic".to_string());
        Format::Inline(InlineFormat {
            tag: "em".to_string(),
            attrs: Attrs::new(),
            same_tags: strings(&["i"]),
            same_styles,
        })
    }

    pub fn underline() -> Self {
        Self::inline("u", &[])
    }

    pub fn strikethrough() -> Self {
        Self::inline("s", &["strike", "del"])
    }

    pub fn code() -> Self {
        Self::inline("code", &[])
    }

    pub fn subscript() -> Self {
        Self::inline("sub", &[])
    }

    pub fn superscript() -> Self {
        Self::inline("sup", &[])
    }

    pub fn link() -> Self {
        let mut attrs = Attrs::new();
        attrs.insert("href".to_string(), VALUE_SLOT.to_string());
        Format::Inline(InlineFormat {
            tag: "a".to_string(),
            attrs,
            same_tags: Vec::new(),
            same_styles: Styles::new(),
        })
    }

    pub fn text_color() -> Self {
        Self::style("color", VALUE_SLOT)
    }

    pub fn background_color() -> Self {
        Self::style("background-color", VALUE_SLOT)
    }

    pub fn font_size() -> Self {
        Self::style("font-size", VALUE_SLOT)
    }

    pub fn heading(level: u8) -> Self {
        let level = level.clamp(1, 6);
        Format::Block(BlockFormat {
            tag: format!("h{level}"),
            switchable: strings(&HEADING_TAGS),
            containers: strings(&["li", "td", "th", "blockquote"]),
            fallback: Some(DEFAULT_BLOCK.to_string()),
        })
    }

    pub fn paragraph() -> Self {
        Format::Block(BlockFormat {
            tag: "p".to_string(),
            switchable: strings(&["div"]),
            containers: strings(&["li", "td", "th", "blockquote"]),
            fallback: Some("div".to_string()),
        })
    }

    pub fn blockquote() -> Self {
        Format::Block(BlockFormat {
            tag: "blockquote".to_string(),
            switchable: Vec::new(),
            containers: strings(&["li", "td", "th"]),
            fallback: Some(DEFAULT_BLOCK.to_string()),
        })
    }

    pub fn code_block() -> Self {
        Format::Block(BlockFormat {
            tag: "pre".to_string(),
            switchable: Vec::new(),
            containers: strings(&["li", "td", "th", "blockquote"]),
            fallback: Some(DEFAULT_BLOCK.to_string()),
        })
    }

    pub fn ordered_list() -> Self {
        Format::List(ListFormat {
            tag: "ol".to_string(),
            switchable: strings(&["ul"]),
            item: default_item_tag(),
        })
    }

    pub fn unordered_list() -> Self {
        Format::List(ListFormat {
            tag: "ul".to_string(),
            switchable: strings(&["ol"]),
            item: default_item_tag(),
        })
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Format::Inline(_) | Format::Style(_))
    }

    pub fn is_templated(&self) -> bool {
        match self {
            Format::Inline(inline) => inline.attrs.values().any(|v| v.contains(VALUE_SLOT)),
            Format::Style(style) => style.styles.values().any(|v| v.contains(VALUE_SLOT)),
            Format::Block(_) | Format::List(_) => false,
        }
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        let tag = match self {
            Format::Inline(inline) => &inline.tag,
            Format::Style(style) => {
                if style.styles.is_empty() {
                    return Err(FormatError::NoStyles);
                }
                &style.tag
            }
            Format::Block(block) => &block.tag,
            Format::List(list) => {
                if list.item.trim().is_empty() {
                    return Err(FormatError::EmptyItemTag);
                }
                &list.tag
            }
        };
        if tag.trim().is_empty() {
            return Err(FormatError::EmptyTag);
        }
        Ok(())
    }

    /// Fresh wrapper element for inline and style formats.
    pub fn build_element(&self, value: Option<&str>) -> ElementData {
        match self {
            Format::Inline(inline) => {
                let mut el = ElementData::new(&inline.tag);
                for (name, template) in &inline.attrs {
                    el.attrs.insert(name.clone(), render(template, value));
                }
                el
            }
            Format::Style(style) => {
                let mut el = ElementData::new(&style.tag);
                for (name, template) in &style.styles {
                    el.styles.insert(name.clone(), render(template, value));
                }
                el
            }
            Format::Block(block) => ElementData::new(&block.tag),
            Format::List(list) => ElementData::new(&list.tag),
        }
    }

    /// Whether `el` carries this inline or style format.
    pub fn matches_element(&self, el: &ElementData, value: Option<&str>) -> bool {
        match self {
            Format::Inline(inline) => {
                if el.tag == inline.tag {
                    return inline.attrs.iter().all(|(name, template)| {
                        el.attrs
                            .get(name)
                            .is_some_and(|actual| template_matches(template, actual, value))
                    });
                }
                inline.same_tags.iter().any(|t| *t == el.tag)
                    || inline.same_styles.iter().any(|(name, expected)| {
                        el.styles
                            .get(name)
                            .is_some_and(|actual| same_value(expected, actual))
                    })
            }
            Format::Style(style) => style.styles.iter().all(|(name, template)| {
                el.styles
                    .get(name)
                    .is_some_and(|actual| template_matches(template, actual, value))
            }),
            Format::Block(block) => el.tag == block.tag,
            Format::List(list) => el.tag == list.tag,
        }
    }
}

/// Nearest ancestor (inclusive) carrying `format`. Lists resolve through their item.
pub fn find_format(dom: &Dom, node: NodeId, format: &Format, value: Option<&str>) -> Option<NodeId> {
    match format {
        Format::Inline(_) | Format::Style(_) | Format::Block(_) => dom.closest(node, |id| {
            dom.element(id)
                .is_some_and(|el| format.matches_element(el, value))
        }),
        Format::List(list) => {
            let item = dom.closest(node, |id| {
                dom.is_tag(id, &list.item)
                    && dom.parent(id).is_some_and(|parent| dom.is_tag(parent, &list.tag))
            })?;
            dom.parent(item)
        }
    }
}

pub fn has_format(dom: &Dom, node: NodeId, format: &Format, value: Option<&str>) -> bool {
    find_format(dom, node, format, value).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_deserialize_from_tagged_json() {
        let format: Format = serde_json::from_value(serde_json::json!({
            "kind": "style",
            "styles": { "color": "{{value}}" }
        }))
        .unwrap();
        assert_eq!(format, Format::text_color());

        let list: Format = serde_json::from_value(serde_json::json!({
            "kind": "list",
            "tag": "ol",
            "switchable": ["ul"]
        }))
        .unwrap();
        assert_eq!(list, Format::ordered_list());
    }

    #[test]
    fn validate_rejects_malformed_descriptors() {
        assert_eq!(Format::inline(" ", &[]).validate(), Err(FormatError::EmptyTag));
        let empty_style = Format::Style(StyleFormat {
            tag: "span".into(),
            styles: Styles::new(),
        });
        assert_eq!(empty_style.validate(), Err(FormatError::NoStyles));
        assert!(Format::heading(2).validate().is_ok());
    }

    #[test]
    fn style_templates_match_by_value() {
        let el = ElementData::new("span").style("color", "Red");
        let format = Format::text_color();
        assert!(format.matches_element(&el, Some("red")));
        assert!(format.matches_element(&el, None));
        assert!(!format.matches_element(&el, Some("blue")));
    }

    #[test]
    fn bold_detects_equivalent_markup() {
        let bold = Format::bold();
        assert!(bold.matches_element(&ElementData::new("b"), None));
        assert!(bold.matches_element(&ElementData::new("span").style("font-weight", "bold"), None));
        assert!(!bold.matches_element(&ElementData::new("em"), None));
    }

    #[test]
    fn find_format_walks_ancestors() {
        let dom = Dom::from_html("<ol><li><strong>x</strong></li></ol>");
        let text = dom.find_text("x").unwrap();
        let list = dom.find_element("ol").unwrap();
        assert_eq!(find_format(&dom, text, &Format::ordered_list(), None), Some(list));
        assert!(has_format(&dom, text, &Format::bold(), None));
        assert!(!has_format(&dom, text, &Format::unordered_list(), None));
    }
}
