use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tree::{NodeId, StructureTree};

/// Content outside the section hierarchy (schedules, forms, appended texts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annex {
    pub annex_title: String,
    pub annex_text: String,
}

/// A table or schedule reported alongside the document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub rows: Vec<TableRow>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub columns: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Table {
    /// At least one non-blank cell.
    pub fn has_content(&self) -> bool {
        self.rows.iter().flat_map(|row| &row.columns).any(|cell| match cell {
            Value::String(s) => !s.trim().is_empty(),
            Value::Null => false,
            _ => true,
        })
    }
}

/// Move `tables_and_schedules` out of the metadata, keeping tables that
/// have content. Entries that are not table objects are dropped.
pub fn take_tables(metadata: &mut Map<String, Value>) -> Vec<Table> {
    let Some(Value::Array(entries)) = metadata.remove("tables_and_schedules") else {
        return Vec::new();
    };

    let total = entries.len();
    let tables: Vec<Table> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<Table>(entry).ok())
        .filter(Table::has_content)
        .collect();
    if tables.len() < total {
        tracing::debug!(dropped = total - tables.len(), "dropped empty tables");
    }
    tables
}

/// Detach every node of an unfamiliar kind and return it as an annex.
///
/// Annexes without any text are dropped.
pub fn collect_annexes(tree: &mut StructureTree) -> Vec<Annex> {
    let mut annexes = Vec::new();
    let root = tree.root();
    collect_under(tree, root, &mut annexes);
    annexes
}

fn collect_under(tree: &mut StructureTree, parent: NodeId, annexes: &mut Vec<Annex>) {
    let ids = tree.children(parent).to_vec();
    let mut kept = Vec::with_capacity(ids.len());

    for id in ids {
        if tree.node(id).kind.is_known() {
            collect_under(tree, id, annexes);
            kept.push(id);
            continue;
        }

        let node = tree.node(id);
        let annex_title = [node.kind.label(), node.number.as_str(), node.title.as_str()]
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let mut texts = Vec::new();
        for part in std::iter::once(id).chain(tree.preorder(id)) {
            let text = tree.node(part).text.trim();
            if !text.is_empty() {
                texts.push(text.to_string());
            }
        }
        let annex_text = texts.join("\n");

        if annex_text.is_empty() {
            tracing::debug!(title = %annex_title, "dropped empty annex");
        } else {
            annexes.push(Annex {
                annex_title,
                annex_text,
            });
        }
    }

    *tree.children_mut(parent) = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, StructureNode};

    #[test]
    fn test_unknown_kinds_become_annexes() {
        let mut tree = StructureTree::from_nodes(vec![
            StructureNode::new(NodeKind::Section, "1").with_children(vec![
                StructureNode::new(NodeKind::Article, "1").with_text("نص"),
                StructureNode::new(NodeKind::Other("جدول".into()), "1").with_text("صف"),
            ]),
            StructureNode::new(NodeKind::Other("ملحق".into()), "2")
                .with_title("نموذج")
                .with_text("مقدمة")
                .with_children(vec![StructureNode::new(NodeKind::Article, "1").with_text("بند")]),
            StructureNode::new(NodeKind::Other("ملاحظة".into()), ""),
        ]);

        let annexes = collect_annexes(&mut tree);
        assert_eq!(
            annexes,
            vec![
                Annex {
                    annex_title: "جدول 1".into(),
                    annex_text: "صف".into()
                },
                Annex {
                    annex_title: "ملحق 2 نموذج".into(),
                    annex_text: "مقدمة\nبند".into()
                },
            ]
        );

        let nodes = tree.to_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].children.len(), 1);
    }

    #[test]
    fn test_blank_tables_are_dropped() {
        let mut metadata: Map<String, Value> = serde_json::from_str(
            r#"{
                "title": "قانون",
                "tables_and_schedules": [
                    {"rows": [{"columns": ["", "  "]}]},
                    {"title": "جدول الرسوم", "rows": [{"columns": ["data", ""]}]},
                    {"rows": []},
                    "not a table"
                ]
            }"#,
        )
        .unwrap();

        let tables = take_tables(&mut metadata);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].extra["title"], "جدول الرسوم");
        assert_eq!(tables[0].rows[0].columns[0], "data");
        assert!(!metadata.contains_key("tables_and_schedules"));
        assert_eq!(metadata["title"], "قانون");
    }

    #[test]
    fn test_numeric_cells_count_as_content() {
        let mut metadata = Map::new();
        metadata.insert(
            "tables_and_schedules".into(),
            serde_json::json!([{"rows": [{"columns": [null, 120]}]}]),
        );
        assert_eq!(take_tables(&mut metadata).len(), 1);
    }
}
