use ingest::TextNormalizer;
use ingest::numerals;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

static HEADING_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:ال)?(?:فصل|مادة|باب|قسم|جزء|فرع)\s*").expect("heading word regex")
});

/// Section kinds of the legal-drafting hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Section,
    Part,
    Title,
    Chapter,
    Branch,
    Article,
    /// Any label outside the known vocabulary (annexes, tables, notes).
    Other(String),
}

impl NodeKind {
    /// Resolve a free-form label, collapsing definite-article forms.
    pub fn canonical(label: &str) -> Self {
        let label = label.trim();
        let stripped = label.strip_prefix("ال").unwrap_or(label);

        Self::from_label(stripped)
            .or_else(|| Self::from_label(label))
            .or_else(|| Self::from_label(&label.to_lowercase()))
            .unwrap_or_else(|| NodeKind::Other(label.to_string()))
    }

    fn from_label(label: &str) -> Option<Self> {
        let kind = match label {
            "قسم" | "section" => NodeKind::Section,
            "جزء" | "part" => NodeKind::Part,
            "باب" | "title" => NodeKind::Title,
            "فصل" | "chapter" => NodeKind::Chapter,
            "فرع" | "branch" | "subsection" => NodeKind::Branch,
            "مادة" | "article" => NodeKind::Article,
            _ => return None,
        };
        Some(kind)
    }

    pub fn label(&self) -> &str {
        match self {
            NodeKind::Section => "قسم",
            NodeKind::Part => "جزء",
            NodeKind::Title => "باب",
            NodeKind::Chapter => "فصل",
            NodeKind::Branch => "فرع",
            NodeKind::Article => "مادة",
            NodeKind::Other(label) => label,
        }
    }

    /// Position in the fixed canonical order; `None` for unfamiliar kinds.
    pub fn default_rank(&self) -> Option<u32> {
        match self {
            NodeKind::Section | NodeKind::Part => Some(0),
            NodeKind::Title => Some(1),
            NodeKind::Chapter => Some(2),
            NodeKind::Branch => Some(3),
            NodeKind::Article => Some(4),
            NodeKind::Other(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, NodeKind::Other(_))
    }

    /// Articles are the leaf unit and the only known kind carrying body text.
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Article)
    }

    pub fn keeps_text(&self) -> bool {
        matches!(self, NodeKind::Article | NodeKind::Other(_))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(NodeKind::canonical(&label))
    }
}

/// A node of the document hierarchy in its nested, JSON-facing form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, deserialize_with = "number_from_any")]
    pub number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<StructureNode>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl StructureNode {
    pub fn new(kind: NodeKind, number: impl Into<String>) -> Self {
        Self {
            kind,
            number: number.into(),
            title: String::new(),
            text: String::new(),
            children: Vec::new(),
            placeholder: false,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_children(mut self, children: Vec<StructureNode>) -> Self {
        self.children = children;
        self
    }

    /// Lenient conversion from a service reply element.
    ///
    /// Non-objects and nodes without a number are skipped; numbers may be
    /// strings or JSON numbers; malformed children are dropped individually.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let number = value_to_number(obj.get("number")?)?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .map(NodeKind::canonical)
            .unwrap_or_else(|| NodeKind::Other(String::new()));

        let text_field = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let children = obj
            .get("children")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default();

        Some(Self {
            kind,
            number,
            title: text_field("title"),
            text: text_field("text"),
            children,
            placeholder: false,
        })
    }

    /// Nodes of a reply payload: an array, a single node object, or an object
    /// wrapping the array under `structure`/`result`.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().filter_map(Self::from_value).collect(),
            Value::Object(obj) => {
                for key in ["structure", "result", "articles"] {
                    if let Some(Value::Array(items)) = obj.get(key) {
                        return items.iter().filter_map(Self::from_value).collect();
                    }
                }
                Self::from_value(value).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(StructureNode::count).sum::<usize>()
    }
}

fn value_to_number(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(String::new()),
        other => value_to_number(&other)
            .ok_or_else(|| de::Error::custom("number must be a string or an integer")),
    }
}

/// Canonical identifier: heading word stripped, digit scripts translated,
/// ordinals resolved, first digit run kept. Unrecoverable values pass
/// through trimmed.
pub fn canonical_node_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let rest = HEADING_WORD.replace(trimmed, "");
    let rest = rest.trim();
    numerals::canonical_number(rest).unwrap_or_else(|| rest.to_string())
}

/// Node-level canonicalization applied to every node entering the tree.
#[derive(Default)]
pub struct Canonicalizer {
    cleaner: TextNormalizer,
}

impl Canonicalizer {
    pub fn new(cleaner: TextNormalizer) -> Self {
        Self { cleaner }
    }

    /// Canonicalize kind, number and text of one node (children untouched).
    pub fn apply(&self, kind: &mut NodeKind, number: &mut String, text: &mut String) {
        if let NodeKind::Other(label) = kind {
            let resolved = NodeKind::canonical(label);
            *kind = resolved;
        }
        *number = canonical_node_number(number);

        match kind {
            NodeKind::Article => *text = self.cleaner.clean_body_text(text),
            NodeKind::Other(_) => *text = text.trim().to_string(),
            _ => text.clear(),
        }
    }

    /// Canonicalize a nested node list in place.
    pub fn apply_nodes(&self, nodes: &mut [StructureNode]) {
        for node in nodes {
            self.apply(&mut node.kind, &mut node.number, &mut node.text);
            self.apply_nodes(&mut node.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_collapses_definite_article() {
        assert_eq!(NodeKind::canonical("المادة"), NodeKind::Article);
        assert_eq!(NodeKind::canonical(" مادة "), NodeKind::Article);
        assert_eq!(NodeKind::canonical("الباب"), NodeKind::Title);
        assert_eq!(NodeKind::canonical("Chapter"), NodeKind::Chapter);
        assert_eq!(NodeKind::canonical("ملحق"), NodeKind::Other("ملحق".into()));
    }

    #[test]
    fn test_kind_canonicalization_is_idempotent() {
        for label in ["القسم", "جزء", "الفرع", "ملحق", "الملحق", ""] {
            let once = NodeKind::canonical(label);
            assert_eq!(NodeKind::canonical(once.label()), once);
        }
    }

    #[test]
    fn test_node_numbers() {
        assert_eq!(canonical_node_number("المادة ١٢"), "12");
        assert_eq!(canonical_node_number("الباب الثاني"), "2");
        assert_eq!(canonical_node_number("فصل 07"), "7");
        assert_eq!(canonical_node_number("تمهيدي"), "0");
        assert_eq!(canonical_node_number(" foo "), "foo");
    }

    #[test]
    fn test_number_canonicalization_is_idempotent() {
        for raw in ["المادة ١٢", "الرابعة", "3", "تمهيدي", "مكرر", ""] {
            let once = canonical_node_number(raw);
            assert_eq!(canonical_node_number(&once), once);
        }
    }

    #[test]
    fn test_canonicalizer_clears_ancestor_text() {
        let canon = Canonicalizer::default();
        let mut nodes = vec![
            StructureNode::new(NodeKind::canonical("الباب"), "الأول")
                .with_text("heading text")
                .with_children(vec![
                    StructureNode::new(NodeKind::Article, "٣").with_text("نص Page المادة"),
                ]),
        ];
        canon.apply_nodes(&mut nodes);

        assert_eq!(nodes[0].number, "1");
        assert!(nodes[0].text.is_empty());
        assert_eq!(nodes[0].children[0].number, "3");
        assert_eq!(nodes[0].children[0].text, "نص  المادة");
    }

    #[test]
    fn test_from_value_is_lenient() {
        let value = json!([
            {"type": "المادة", "number": 4, "text": "a", "children": [{"type": "x"}]},
            {"type": "الفصل"},
            "garbage",
            {"type": "الفصل", "number": "2", "title": null}
        ]);
        let nodes = StructureNode::list_from_value(&value);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, NodeKind::Article);
        assert_eq!(nodes[0].number, "4");
        assert!(nodes[0].children.is_empty());
        assert_eq!(nodes[1].kind, NodeKind::Chapter);
    }

    #[test]
    fn test_serializes_kind_as_label() {
        let node = StructureNode::new(NodeKind::Article, "1").with_text("t");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "مادة");
        assert!(value.get("placeholder").is_none());

        let back: StructureNode = serde_json::from_value(json!({"type": "المادة", "number": 9})).unwrap();
        assert_eq!(back.kind, NodeKind::Article);
        assert_eq!(back.number, "9");
    }
}
