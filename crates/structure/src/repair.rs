use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use ingest::numerals::parse_int;

use crate::dedup::DuplicateResolver;
use crate::node::{Canonicalizer, NodeKind, StructureNode};
use crate::tree::{NodeData, NodeId, StructureTree};

/// Largest numbering gap filled with placeholders; wider jumps are OCR noise.
const MAX_GAP: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairOptions {
    pub collapse_footnote_digits: bool,
    pub fill_gaps: bool,
    pub keep_placeholders: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            collapse_footnote_digits: true,
            fill_gaps: true,
            keep_placeholders: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RepairReport {
    pub cycles_broken: usize,
    pub footnote_numbers_fixed: usize,
    pub preamble_inserted: bool,
    pub siblings_merged: usize,
    pub duplicates_merged: usize,
    pub pruned: usize,
    pub placeholders_added: usize,
    pub placeholders_removed: usize,
}

/// Rank of each section kind; children always rank strictly higher.
#[derive(Debug, Clone)]
pub struct RankMap {
    ranks: HashMap<NodeKind, u32>,
    fallback: u32,
}

impl RankMap {
    /// Fixed canonical order, unless unfamiliar kinds occur; then ranks
    /// follow the order in which kinds are first seen.
    pub fn for_tree(tree: &StructureTree) -> Self {
        let kinds: Vec<NodeKind> = tree
            .preorder(tree.root())
            .into_iter()
            .map(|id| tree.node(id).kind.clone())
            .collect();

        if kinds.iter().all(NodeKind::is_known) {
            return Self::canonical();
        }

        let mut ranks = HashMap::new();
        for kind in kinds {
            let next = ranks.len() as u32;
            ranks.entry(kind).or_insert(next);
        }
        let fallback = ranks.len() as u32;
        Self { ranks, fallback }
    }

    pub fn canonical() -> Self {
        let ranks: HashMap<NodeKind, u32> = [
            NodeKind::Section,
            NodeKind::Part,
            NodeKind::Title,
            NodeKind::Chapter,
            NodeKind::Branch,
            NodeKind::Article,
        ]
        .into_iter()
        .filter_map(|k| k.default_rank().map(|r| (k, r)))
        .collect();
        let fallback = ranks.values().max().map_or(0, |m| m + 1);
        Self { ranks, fallback }
    }

    pub fn rank(&self, kind: &NodeKind) -> u32 {
        self.ranks.get(kind).copied().unwrap_or(self.fallback)
    }
}

/// Turns a flat or partially nested node list into one consistent tree.
#[derive(Default)]
pub struct TreeRepairEngine {
    options: RepairOptions,
    canonicalizer: Canonicalizer,
}

impl TreeRepairEngine {
    pub fn new(options: RepairOptions) -> Self {
        Self {
            options,
            canonicalizer: Canonicalizer::default(),
        }
    }

    pub fn with_canonicalizer(options: RepairOptions, canonicalizer: Canonicalizer) -> Self {
        Self {
            options,
            canonicalizer,
        }
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    /// Canonicalize kind, number and text of every reachable node.
    pub fn canonicalize(&self, tree: &mut StructureTree) {
        for id in tree.preorder(tree.root()) {
            let data = tree.node_mut(id);
            self.canonicalizer
                .apply(&mut data.kind, &mut data.number, &mut data.text);
        }
    }

    pub fn repair_nodes(
        &self,
        nodes: Vec<StructureNode>,
        has_preamble_heading: bool,
    ) -> (Vec<StructureNode>, RepairReport) {
        let mut tree = StructureTree::from_nodes(nodes);
        let report = self.repair(&mut tree, has_preamble_heading);
        (tree.to_nodes(), report)
    }

    pub fn repair(&self, tree: &mut StructureTree, has_preamble_heading: bool) -> RepairReport {
        let mut report = RepairReport {
            cycles_broken: tree.break_cycles(),
            ..RepairReport::default()
        };

        self.canonicalize(tree);
        let ranks = RankMap::for_tree(tree);
        fix_hierarchy(tree, &ranks);

        if self.options.collapse_footnote_digits {
            report.footnote_numbers_fixed = collapse_footnote_digits(tree);
        }
        if has_preamble_heading {
            report.preamble_inserted = ensure_preamble(tree);
        }

        let resolver = DuplicateResolver::default();
        report.siblings_merged = merge_sibling_duplicates(tree);
        report.duplicates_merged = resolver.resolve(tree);
        report.pruned = prune_empty(tree);
        sort_siblings(tree, &ranks);

        if self.options.fill_gaps {
            report.placeholders_added = fill_gaps(tree);
            // A placeholder may stand in for a number that exists elsewhere
            report.duplicates_merged += resolver.resolve(tree);
            sort_siblings(tree, &ranks);
        }
        if !self.options.keep_placeholders {
            report.placeholders_removed = strip_placeholders(tree, has_preamble_heading);
        }

        report.cycles_broken += tree.break_cycles();
        tracing::debug!(?report, nodes = tree.len(), "repaired structure tree");
        report
    }
}

/// Re-parent every node by rank: each node becomes a child of the nearest
/// preceding node (in document order) with a strictly lower rank.
pub fn fix_hierarchy(tree: &mut StructureTree, ranks: &RankMap) {
    let root = tree.root();
    let flat = tree.preorder(root);
    tree.children_mut(root).clear();
    for &id in &flat {
        tree.children_mut(id).clear();
    }

    let mut stack: Vec<(NodeId, u32)> = Vec::new();
    for id in flat {
        let rank = ranks.rank(&tree.node(id).kind);
        while stack.last().is_some_and(|&(_, top)| top >= rank) {
            stack.pop();
        }
        let parent = stack.last().map_or(root, |&(p, _)| p);
        tree.append_child(parent, id);
        stack.push((id, rank));
    }
}

fn sibling_lists(tree: &StructureTree) -> Vec<NodeId> {
    let mut lists = vec![tree.root()];
    lists.extend(tree.preorder(tree.root()));
    lists
}

/// Undo footnote markers glued to heading numbers (`22` after `1`, `17`
/// after `6`, `110` after `9`). A jump is kept when the next sibling of the
/// same kind continues from it.
pub fn collapse_footnote_digits(tree: &mut StructureTree) -> usize {
    let mut fixed = 0;
    for list in sibling_lists(tree) {
        let ids = tree.children(list).to_vec();
        let mut last: HashMap<NodeKind, u64> = HashMap::new();

        for (i, &id) in ids.iter().enumerate() {
            let node = tree.node(id);
            if !node.kind.is_known() {
                continue;
            }
            let Some(mut value) = parse_int(&node.number) else {
                continue;
            };
            let kind = node.kind.clone();

            if let Some(&prev) = last.get(&kind) {
                let expected = prev + 1;
                let expected_str = expected.to_string();
                let number = node.number.as_str();
                let polluted = value != expected
                    && ((number.len() > expected_str.len() && number.ends_with(&expected_str))
                        || number == expected_str.repeat(2));

                if polluted {
                    let continues = ids[i + 1..]
                        .iter()
                        .map(|&next| tree.node(next))
                        .find(|n| n.kind == kind)
                        .and_then(|n| parse_int(&n.number))
                        == Some(value + 1);

                    if !continues {
                        tracing::debug!(kind = %kind, from = %number, to = %expected_str, "collapsed footnote digits");
                        tree.node_mut(id).number = expected_str;
                        value = expected;
                        fixed += 1;
                    }
                }
            }
            last.insert(kind, value);
        }
    }
    fixed
}

/// Insert a Section 0 at the front unless one exists anywhere.
pub fn ensure_preamble(tree: &mut StructureTree) -> bool {
    if tree.find(&NodeKind::Section, "0").is_some() {
        return false;
    }
    let id = tree.alloc(NodeData::placeholder(NodeKind::Section, "0"));
    let root = tree.root();
    tree.children_mut(root).insert(0, id);
    true
}

/// Merge non-leaf siblings sharing kind and number into the first one.
pub fn merge_sibling_duplicates(tree: &mut StructureTree) -> usize {
    let root = tree.root();
    merge_siblings_under(tree, root)
}

fn merge_siblings_under(tree: &mut StructureTree, parent: NodeId) -> usize {
    let ids = tree.take_children(parent);
    let mut kept = Vec::with_capacity(ids.len());
    let mut first_of: HashMap<(NodeKind, String), NodeId> = HashMap::new();
    let mut merged = 0;

    for id in ids {
        let node = tree.node(id);
        if node.kind.is_leaf() {
            kept.push(id);
            continue;
        }
        let key = (node.kind.clone(), node.number.clone());
        match first_of.get(&key) {
            Some(&first) if first == id => {}
            Some(&first) => {
                let donor = tree.node(id).clone();
                let target = tree.node_mut(first);
                if target.title.is_empty() {
                    target.title = donor.title;
                }
                if !donor.text.is_empty() && target.text != donor.text {
                    if !target.text.is_empty() && !target.text.ends_with('\n') {
                        target.text.push('\n');
                    }
                    target.text.push_str(&donor.text);
                }
                target.placeholder = target.placeholder && donor.placeholder;

                let moved = tree.take_children(id);
                tree.children_mut(first).extend(moved.into_iter().filter(|&c| c != first));
                merged += 1;
            }
            None => {
                first_of.insert(key, id);
                kept.push(id);
            }
        }
    }

    *tree.children_mut(parent) = kept.clone();
    for id in kept {
        merged += merge_siblings_under(tree, id);
    }
    merged
}

/// Drop structural noise bottom-up: nodes that are not placeholders, not
/// leaves, and have neither text nor children.
pub fn prune_empty(tree: &mut StructureTree) -> usize {
    let root = tree.root();
    prune_under(tree, root)
}

fn prune_under(tree: &mut StructureTree, parent: NodeId) -> usize {
    let ids = tree.children(parent).to_vec();
    let mut removed = 0;
    for &id in &ids {
        removed += prune_under(tree, id);
    }

    let keep: Vec<NodeId> = ids
        .into_iter()
        .filter(|&id| {
            let node = tree.node(id);
            node.placeholder
                || node.kind.is_leaf()
                || !node.text.is_empty()
                || !tree.children(id).is_empty()
        })
        .collect();
    removed += tree.children(parent).len() - keep.len();
    *tree.children_mut(parent) = keep;
    removed
}

/// Sort every sibling list by rank, then numerically (non-numeric numbers
/// after numeric ones, lexically). Same-kind lists reduce to numeric order.
pub fn sort_siblings(tree: &mut StructureTree, ranks: &RankMap) {
    for list in sibling_lists(tree) {
        let mut ids = tree.children(list).to_vec();
        ids.sort_by_cached_key(|&id| {
            let node = tree.node(id);
            let numeric = parse_int(&node.number);
            (
                ranks.rank(&node.kind),
                numeric.is_none(),
                numeric.unwrap_or(0),
                if numeric.is_none() { node.number.clone() } else { String::new() },
            )
        });
        *tree.children_mut(list) = ids;
    }
}

/// Insert placeholders for missing numbers between adjacent same-kind
/// siblings, and below a non-leaf list's first number down to 1.
/// Articles are numbered document-wide, so their lists get no leading fill.
pub fn fill_gaps(tree: &mut StructureTree) -> usize {
    let mut added = 0;
    for list in sibling_lists(tree) {
        let ids = tree.children(list).to_vec();
        let mut out = Vec::with_capacity(ids.len());
        let mut previous: Option<(NodeKind, u64)> = None;

        for (i, &id) in ids.iter().enumerate() {
            let node = tree.node(id);
            let kind = node.kind.clone();
            let value = parse_int(&node.number).filter(|_| kind.is_known());

            if let Some(value) = value {
                let from = match &previous {
                    Some((prev_kind, prev)) if *prev_kind == kind => Some(prev + 1),
                    _ if i == 0 && !kind.is_leaf() && value > 1 => Some(1),
                    _ => None,
                };
                if let Some(from) = from.filter(|&f| f < value) {
                    if value - from > MAX_GAP {
                        tracing::debug!(kind = %kind, from, to = value, "numbering gap too wide to fill");
                    } else {
                        for missing in from..value {
                            out.push(tree.alloc(NodeData::placeholder(kind.clone(), missing.to_string())));
                            added += 1;
                        }
                    }
                }
            }

            previous = value.map(|v| (kind, v));
            out.push(id);
        }
        *tree.children_mut(list) = out;
    }
    added
}

/// Remove placeholders that never received text or children.
pub fn strip_placeholders(tree: &mut StructureTree, keep_preamble: bool) -> usize {
    let mut removed = 0;
    for list in sibling_lists(tree) {
        let ids = tree.children(list).to_vec();
        let keep: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|&id| {
                let node = tree.node(id);
                let vacant = node.placeholder && node.text.is_empty() && tree.children(id).is_empty();
                let preamble = keep_preamble && node.matches(&NodeKind::Section, "0");
                !vacant || preamble
            })
            .collect();
        removed += ids.len() - keep.len();
        *tree.children_mut(list) = keep;
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(label: &str, number: &str) -> StructureNode {
        StructureNode::new(NodeKind::canonical(label), number)
    }

    fn article(number: &str, text: &str) -> StructureNode {
        node("المادة", number).with_text(text)
    }

    fn numbers(nodes: &[StructureNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.number.as_str()).collect()
    }

    fn collapse(numbers_in: &[&str]) -> Vec<String> {
        let mut tree = StructureTree::from_nodes(
            numbers_in.iter().map(|n| node("فصل", n)).collect(),
        );
        collapse_footnote_digits(&mut tree);
        tree.to_nodes().into_iter().map(|n| n.number).collect()
    }

    #[test]
    fn test_branch_nesting_order() {
        let flat = vec![
            node("القسم", "1"),
            node("الباب", "1"),
            node("الفرع", "1"),
            article("1", "أ"),
            article("2", "ب"),
            node("الفرع", "2"),
            article("3", "ج"),
            node("الفرع", "3"),
            article("4", "د"),
        ];
        let (nodes, _) = TreeRepairEngine::default().repair_nodes(flat, false);

        let title = &nodes[0].children[0];
        assert_eq!(title.kind, NodeKind::Title);
        assert_eq!(numbers(&title.children), ["1", "2", "3"]);
        assert_eq!(numbers(&title.children[0].children), ["1", "2"]);
        assert_eq!(numbers(&title.children[1].children), ["3"]);
        assert_eq!(numbers(&title.children[2].children), ["4"]);
    }

    #[test]
    fn test_children_rank_strictly_higher() {
        // An article wrongly holding a chapter is re-parented
        let nested = vec![node("القسم", "1").with_children(vec![
            article("1", "أ").with_children(vec![
                node("الفصل", "1").with_children(vec![article("2", "ب")]),
            ]),
        ])];
        let engine = TreeRepairEngine::default();
        let (nodes, _) = engine.repair_nodes(nested, false);

        fn check(node: &StructureNode, ranks: &RankMap) {
            for child in &node.children {
                assert!(ranks.rank(&child.kind) > ranks.rank(&node.kind));
                check(child, ranks);
            }
        }
        let ranks = RankMap::canonical();
        nodes.iter().for_each(|n| check(n, &ranks));
        assert_eq!(nodes[0].children.len(), 2);
    }

    #[test]
    fn test_unfamiliar_kinds_rank_by_first_appearance() {
        let tree = StructureTree::from_nodes(vec![
            node("الفصل", "1"),
            node("ملحق", "1"),
            article("1", "س"),
        ]);
        let ranks = RankMap::for_tree(&tree);
        assert!(ranks.rank(&NodeKind::Chapter) < ranks.rank(&NodeKind::Other("ملحق".into())));
        assert!(ranks.rank(&NodeKind::Other("ملحق".into())) < ranks.rank(&NodeKind::Article));
    }

    #[test]
    fn test_fills_article_gaps_without_leading_fill() {
        let flat = vec![article("3", "ج"), article("4", "د"), article("7", "ز")];
        let (nodes, report) = TreeRepairEngine::default().repair_nodes(flat, false);

        assert_eq!(numbers(&nodes), ["3", "4", "5", "6", "7"]);
        assert!(nodes[2].placeholder && nodes[3].placeholder);
        assert!(nodes[2].text.is_empty());
        assert!(!nodes[4].placeholder);
        assert_eq!(report.placeholders_added, 2);
    }

    #[test]
    fn test_fills_leading_heading_numbers() {
        let flat = vec![
            node("الباب", "3"),
            article("1", "أ"),
        ];
        let (nodes, _) = TreeRepairEngine::default().repair_nodes(flat, false);
        assert_eq!(numbers(&nodes), ["1", "2", "3"]);
        assert!(nodes[0].placeholder);
    }

    #[test]
    fn test_collapses_footnote_digits() {
        assert_eq!(collapse(&["1", "22", "3"]), ["1", "2", "3"]);
        assert_eq!(collapse(&["6", "17", "8"]), ["6", "7", "8"]);
        assert_eq!(collapse(&["9", "110", "11"]), ["9", "10", "11"]);
    }

    #[test]
    fn test_keeps_legitimate_numbers() {
        assert_eq!(collapse(&["21", "22"]), ["21", "22"]);
        assert_eq!(collapse(&["16", "17", "18"]), ["16", "17", "18"]);
        // The next sibling continues from the jump
        assert_eq!(collapse(&["6", "17", "18"]), ["6", "17", "18"]);
    }

    #[test]
    fn test_preamble_section_inserted() {
        let flat = vec![node("القسم", "1"), article("1", "أ")];
        let (nodes, report) = TreeRepairEngine::default().repair_nodes(flat, true);
        assert!(report.preamble_inserted);
        assert_eq!(nodes[0].kind, NodeKind::Section);
        assert_eq!(nodes[0].number, "0");
    }

    #[test]
    fn test_existing_preamble_is_kept() {
        let flat = vec![
            node("القسم", "تمهيدي"),
            article("1", "أ"),
            node("القسم", "الأول"),
            article("2", "ب"),
        ];
        let (nodes, report) = TreeRepairEngine::default().repair_nodes(flat, true);
        assert!(!report.preamble_inserted);
        assert_eq!(numbers(&nodes), ["0", "1"]);
        assert_eq!(numbers(&nodes[0].children), ["1"]);
    }

    #[test]
    fn test_prunes_empty_structural_nodes() {
        let nested = vec![
            node("القسم", "1").with_children(vec![article("1", "نص")]),
            node("الفرع", "99"),
            node("القسم", "2").with_children(vec![node("الفصل", "1")]),
        ];
        let (nodes, report) = TreeRepairEngine::default().repair_nodes(nested, false);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].children.len(), 1);
        assert_eq!(report.pruned, 3);
    }

    #[test]
    fn test_empty_article_survives_pruning() {
        let (nodes, _) =
            TreeRepairEngine::default().repair_nodes(vec![node("الفصل", "1").with_children(vec![article("1", "")])], false);
        assert_eq!(nodes[0].children.len(), 1);
    }

    #[test]
    fn test_sibling_headings_merge() {
        let nested = vec![
            node("الباب", "1").with_title("أحكام عامة").with_children(vec![article("1", "أ")]),
            node("الباب", "1").with_children(vec![article("2", "ب")]),
        ];
        let (nodes, report) = TreeRepairEngine::default().repair_nodes(nested, false);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].title, "أحكام عامة");
        assert_eq!(numbers(&nodes[0].children), ["1", "2"]);
        assert_eq!(report.siblings_merged, 1);
    }

    #[test]
    fn test_sorts_numerically_with_lexical_fallback() {
        let mut tree = StructureTree::from_nodes(vec![
            article("10", "ي"),
            article("foo", "س"),
            article("2", "ب"),
        ]);
        sort_siblings(&mut tree, &RankMap::canonical());
        assert_eq!(numbers(&tree.to_nodes()), ["2", "10", "foo"]);
    }

    #[test]
    fn test_strip_placeholders_option() {
        let engine = TreeRepairEngine::new(RepairOptions {
            keep_placeholders: false,
            ..RepairOptions::default()
        });
        let flat = vec![article("1", "أ"), article("4", "د")];
        let (nodes, report) = engine.repair_nodes(flat, true);
        // The preamble marker survives, gap placeholders do not
        assert_eq!(numbers(&nodes), ["0", "1", "4"]);
        assert_eq!(report.placeholders_removed, 2);
    }

    #[test]
    fn test_no_cycles_for_any_permutation() {
        let base = vec![
            node("القسم", "1"),
            node("الباب", "1"),
            node("الفصل", "1"),
            article("1", "أ"),
            article("2", "ب"),
        ];
        let engine = TreeRepairEngine::default();

        let mut indices: Vec<usize> = (0..base.len()).collect();
        let mut permutations = vec![indices.clone()];
        // Heap's algorithm, iterative
        let mut c = vec![0; indices.len()];
        let mut i = 0;
        while i < indices.len() {
            if c[i] < i {
                if i % 2 == 0 {
                    indices.swap(0, i);
                } else {
                    indices.swap(c[i], i);
                }
                permutations.push(indices.clone());
                c[i] += 1;
                i = 0;
            } else {
                c[i] = 0;
                i += 1;
            }
        }
        assert_eq!(permutations.len(), 120);

        for perm in permutations {
            let flat: Vec<StructureNode> = perm.iter().map(|&i| base[i].clone()).collect();
            let mut tree = StructureTree::from_nodes(flat);
            engine.repair(&mut tree, false);

            let reachable = tree.preorder(tree.root());
            let mut references = 0;
            let mut lists = vec![tree.root()];
            lists.extend(reachable.iter().copied());
            for id in lists {
                references += tree.children(id).len();
            }
            // Every reachable node is referenced exactly once
            assert_eq!(references, reachable.len());
            assert_eq!(tree.to_nodes().iter().map(StructureNode::count).sum::<usize>(), reachable.len());
        }
    }

    #[test]
    fn test_repair_is_idempotent() {
        let flat = vec![
            node("القسم", "الأول"),
            node("الفصل", "2"),
            article("1", "أ"),
            article("3", "ج"),
            node("الفصل", "4"),
            article("3", "ج، نسخة أطول"),
            article("5", "هـ"),
        ];
        let engine = TreeRepairEngine::default();
        let (once, _) = engine.repair_nodes(flat, false);
        let (twice, _) = engine.repair_nodes(once.clone(), false);
        assert_eq!(once, twice);
    }
}
