use serde::{Deserialize, Serialize};

use crate::node::{Canonicalizer, NodeKind, StructureNode, canonical_node_number};
use crate::repair::RankMap;
use crate::tree::{NodeData, NodeId, StructureTree};

/// Shortest repeated run (in bytes) treated as chunk overlap when appending.
const MIN_OVERLAP_BYTES: usize = 20;

/// The still-open heading a chunk continues under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub kind: NodeKind,
    pub number: String,
    pub title: String,
}

impl Anchor {
    pub fn new(kind: &str, number: &str, title: &str) -> Self {
        Self {
            kind: NodeKind::canonical(kind),
            number: canonical_node_number(number),
            title: title.trim().to_string(),
        }
    }

    pub fn from_node(node: &NodeData) -> Self {
        Self {
            kind: node.kind.clone(),
            number: node.number.clone(),
            title: node.title.clone(),
        }
    }

    /// Envelope line naming this heading, as sent back in the next prompt.
    pub fn describe(&self) -> String {
        format!(
            "Inherited context: type={}, number={}, title=\"{}\"",
            self.kind, self.number, self.title
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    pub added: usize,
    pub merged: usize,
    pub anchor_created: bool,
}

/// Merge one chunk's nodes into the accumulated tree.
///
/// The chunk continues under `anchor` when given, otherwise at the root.
/// Incoming nodes are placed by rank against the open heading path, so a
/// sibling heading of the anchor closes it. A node matching an existing
/// child of its parent (same kind and number) is merged into it: leaf text
/// is appended with any repeated overlap removed, a missing title is filled
/// and a placeholder becomes real.
pub fn merge_chunk(
    tree: &mut StructureTree,
    anchor: Option<&Anchor>,
    nodes: Vec<StructureNode>,
    canonicalizer: &Canonicalizer,
) -> MergeStats {
    let mut stats = MergeStats::default();
    let ranks = RankMap::canonical();
    let root = tree.root();

    let mut stack: Vec<(NodeId, u32)> = Vec::new();
    if let Some(anchor) = anchor {
        let target = match tree.find(&anchor.kind, &anchor.number) {
            Some(id) => {
                let node = tree.node_mut(id);
                if node.title.is_empty() {
                    node.title = anchor.title.clone();
                }
                id
            }
            None => {
                let mut data = NodeData::new(anchor.kind.clone(), anchor.number.clone());
                data.title = anchor.title.clone();
                let id = tree.alloc(data);
                tree.append_child(root, id);
                stats.anchor_created = true;
                id
            }
        };
        stack = tree
            .path_to(target)
            .into_iter()
            .map(|id| (id, ranks.rank(&tree.node(id).kind)))
            .collect();
    }

    let mut flat = Vec::new();
    flatten(nodes, &mut flat);

    for mut data in flat {
        canonicalizer.apply(&mut data.kind, &mut data.number, &mut data.text);
        let rank = ranks.rank(&data.kind);
        while stack.last().is_some_and(|&(_, top)| top >= rank) {
            stack.pop();
        }
        let parent = stack.last().map_or(root, |&(id, _)| id);

        let id = match tree.find_child(parent, &data.kind, &data.number) {
            Some(existing) => {
                let node = tree.node_mut(existing);
                if node.kind.keeps_text() {
                    append_text(&mut node.text, &data.text);
                }
                if node.title.is_empty() {
                    node.title = data.title;
                }
                if !node.text.is_empty() {
                    node.placeholder = false;
                }
                stats.merged += 1;
                existing
            }
            None => {
                let id = tree.alloc(data);
                tree.append_child(parent, id);
                stats.added += 1;
                id
            }
        };
        stack.push((id, rank));
    }

    tracing::debug!(
        added = stats.added,
        merged = stats.merged,
        anchor = anchor.map(|a| a.describe()).unwrap_or_default(),
        "merged chunk into structure"
    );
    stats
}

fn flatten(nodes: Vec<StructureNode>, out: &mut Vec<NodeData>) {
    for node in nodes {
        out.push(NodeData {
            kind: node.kind,
            number: node.number,
            title: node.title,
            text: node.text,
            placeholder: node.placeholder,
        });
        flatten(node.children, out);
    }
}

/// Append continuation text, dropping a prefix of `new` that repeats the end
/// of `existing` (the overlap window re-sent with the next chunk).
pub fn append_text(existing: &mut String, new: &str) {
    let new = new.trim();
    if new.is_empty() || existing.contains(new) {
        return;
    }
    if existing.is_empty() {
        *existing = new.to_string();
        return;
    }

    let overlap = new
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .rev()
        .filter(|&end| end >= MIN_OVERLAP_BYTES)
        .find(|&end| existing.ends_with(&new[..end]))
        .unwrap_or(0);

    if overlap > 0 {
        existing.push_str(&new[overlap..]);
    } else {
        if !existing.ends_with('\n') {
            existing.push('\n');
        }
        existing.push_str(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(number: &str, text: &str) -> StructureNode {
        StructureNode::new(NodeKind::Article, number).with_text(text)
    }

    fn skeleton() -> StructureTree {
        StructureTree::from_nodes(vec![
            StructureNode::new(NodeKind::Title, "1").with_children(vec![
                StructureNode::new(NodeKind::Chapter, "1"),
            ]),
        ])
    }

    #[test]
    fn test_merges_under_inherited_heading() {
        let mut tree = skeleton();
        let canon = Canonicalizer::default();
        let anchor = Anchor::new("الفصل", "الأول", "");

        let stats = merge_chunk(&mut tree, Some(&anchor), vec![article("1", "نص")], &canon);
        assert_eq!(stats.added, 1);
        assert!(!stats.anchor_created);

        let nodes = tree.to_nodes();
        assert_eq!(nodes[0].children[0].children[0].number, "1");
    }

    #[test]
    fn test_sibling_heading_closes_anchor() {
        let mut tree = skeleton();
        let canon = Canonicalizer::default();
        let anchor = Anchor::new("فصل", "1", "");
        let chunk = vec![
            article("2", "تتمة"),
            StructureNode::new(NodeKind::Chapter, "2"),
            article("3", "نص"),
        ];
        merge_chunk(&mut tree, Some(&anchor), chunk, &canon);

        let title = &tree.to_nodes()[0];
        assert_eq!(title.children.len(), 2);
        assert_eq!(title.children[0].children[0].number, "2");
        assert_eq!(title.children[1].children[0].number, "3");
    }

    #[test]
    fn test_missing_anchor_is_created_at_root() {
        let mut tree = skeleton();
        let anchor = Anchor::new("الباب", "الثاني", "العقوبات");
        let stats = merge_chunk(&mut tree, Some(&anchor), vec![article("9", "نص")], &Canonicalizer::default());

        assert!(stats.anchor_created);
        let nodes = tree.to_nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].number, "2");
        assert_eq!(nodes[1].title, "العقوبات");
        assert_eq!(nodes[1].children[0].number, "9");
    }

    #[test]
    fn test_continued_article_text_is_appended_once() {
        let mut tree = StructureTree::new();
        let canon = Canonicalizer::default();
        merge_chunk(&mut tree, None, vec![article("5", "يعاقب بالحبس من شهر إلى سنة")], &canon);
        merge_chunk(
            &mut tree,
            None,
            vec![article("5", "من شهر إلى سنة وبغرامة")],
            &canon,
        );

        let nodes = tree.to_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text, "يعاقب بالحبس من شهر إلى سنة وبغرامة");
    }

    #[test]
    fn test_placeholder_is_filled() {
        let mut placeholder = StructureNode::new(NodeKind::Article, "2");
        placeholder.placeholder = true;
        let mut tree = StructureTree::from_nodes(vec![placeholder]);
        merge_chunk(&mut tree, None, vec![article("2", "نص المادة")], &Canonicalizer::default());

        let nodes = tree.to_nodes();
        assert!(!nodes[0].placeholder);
        assert_eq!(nodes[0].text, "نص المادة");
    }

    #[test]
    fn test_append_text_joins_distinct_paragraphs() {
        let mut text = "الفقرة الأولى".to_string();
        append_text(&mut text, "الفقرة الثانية");
        assert_eq!(text, "الفقرة الأولى\nالفقرة الثانية");
        append_text(&mut text, "الفقرة الثانية");
        assert_eq!(text, "الفقرة الأولى\nالفقرة الثانية");
    }

    #[test]
    fn test_anchor_describe() {
        let anchor = Anchor::new("الباب", "2", "أحكام");
        assert_eq!(anchor.describe(), "Inherited context: type=باب, number=2, title=\"أحكام\"");
    }
}
