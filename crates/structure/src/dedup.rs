use std::collections::{BTreeMap, HashMap, HashSet};

use ingest::numerals::parse_int;

use crate::node::NodeKind;
use crate::tree::{NodeId, StructureTree};

#[derive(Debug, Clone, Copy)]
struct Occurrence {
    order: usize,
    id: NodeId,
}

/// Collapses repeated leaf units (articles) across the whole tree.
///
/// Articles are numbered document-wide, so an article number seen twice is a
/// duplicate wherever the copies sit. Numbers are visited in ascending order;
/// for each, the earliest occurrence that comes after the occurrence kept for
/// the previous number is kept (or the last one if none does), which keeps
/// the surviving articles in document order. Discarded copies donate longer
/// text, a missing title and their children to the kept node and are swept
/// out after all decisions are made.
#[derive(Debug, Clone)]
pub struct DuplicateResolver {
    kind: NodeKind,
}

impl Default for DuplicateResolver {
    fn default() -> Self {
        Self {
            kind: NodeKind::Article,
        }
    }
}

impl DuplicateResolver {
    pub fn for_kind(kind: NodeKind) -> Self {
        Self { kind }
    }

    /// Returns the number of occurrences merged away.
    pub fn resolve(&self, tree: &mut StructureTree) -> usize {
        let order = tree.preorder(tree.root());
        let mut by_number: HashMap<String, Vec<Occurrence>> = HashMap::new();
        for (position, &id) in order.iter().enumerate() {
            let node = tree.node(id);
            if node.kind == self.kind {
                by_number
                    .entry(node.number.clone())
                    .or_default()
                    .push(Occurrence {
                        order: position,
                        id,
                    });
            }
        }

        // Numeric numbers drive the ordering chain; others keep their first copy
        let mut numeric: BTreeMap<u64, Vec<Occurrence>> = BTreeMap::new();
        let mut non_numeric: Vec<Vec<Occurrence>> = Vec::new();
        for (number, occurrences) in by_number {
            match parse_int(&number) {
                Some(value) => numeric.entry(value).or_default().extend(occurrences),
                None => non_numeric.push(occurrences),
            }
        }

        let mut decisions: Vec<(Occurrence, Vec<Occurrence>)> = Vec::new();
        let mut previous: Option<usize> = None;
        for (_, occurrences) in numeric {
            let candidates = real_candidates(tree, &occurrences);
            let kept = candidates
                .iter()
                .find(|o| previous.is_none_or(|p| o.order > p))
                .or_else(|| candidates.last())
                .copied();
            let Some(kept) = kept else { continue };
            previous = Some(kept.order);

            let discarded: Vec<Occurrence> = occurrences
                .iter()
                .filter(|o| o.id != kept.id)
                .copied()
                .collect();
            if !discarded.is_empty() {
                decisions.push((kept, discarded));
            }
        }
        for occurrences in non_numeric {
            if let Some((first, rest)) = occurrences.split_first() {
                if !rest.is_empty() {
                    decisions.push((*first, rest.to_vec()));
                }
            }
        }

        let mut tombstones = HashSet::new();
        for (kept, discarded) in decisions {
            for dup in discarded {
                self.absorb(tree, kept.id, dup.id);
                tombstones.insert(dup.id);
            }
        }

        let merged = tombstones.len();
        if merged > 0 {
            sweep(tree, &tombstones);
            tracing::debug!(merged, kind = %self.kind, "resolved duplicate nodes");
        }
        merged
    }

    fn absorb(&self, tree: &mut StructureTree, kept: NodeId, dup: NodeId) {
        let parents = tree.parents();
        let mut ancestors = HashSet::new();
        let mut current = kept;
        while let Some(&parent) = parents.get(&current) {
            if !ancestors.insert(parent) {
                break;
            }
            current = parent;
        }

        // The kept copy sits inside the discarded one: lift it into its place
        if ancestors.contains(&dup) {
            if let Some(&kept_parent) = parents.get(&kept) {
                tree.children_mut(kept_parent).retain(|&c| c != kept);
            }
            if let Some(&dup_parent) = parents.get(&dup) {
                for slot in tree.children_mut(dup_parent).iter_mut() {
                    if *slot == dup {
                        *slot = kept;
                    }
                }
            }
        }

        let donor = tree.node(dup).clone();
        let target = tree.node_mut(kept);
        if donor.text.chars().count() > target.text.chars().count() {
            target.text = donor.text;
        }
        if target.title.is_empty() && !donor.title.is_empty() {
            target.title = donor.title;
        }
        if !target.text.is_empty() {
            target.placeholder = false;
        }

        let moved: Vec<NodeId> = tree
            .children(dup)
            .iter()
            .copied()
            .filter(|&c| c != kept && !ancestors.contains(&c))
            .collect();
        tree.children_mut(dup).clear();
        tree.children_mut(kept).extend(moved);
    }
}

/// Real occurrences when there are any; a placeholder never wins over text.
fn real_candidates(tree: &StructureTree, occurrences: &[Occurrence]) -> Vec<Occurrence> {
    let mut sorted = occurrences.to_vec();
    sorted.sort_by_key(|o| o.order);
    let real: Vec<Occurrence> = sorted
        .iter()
        .filter(|o| !tree.node(o.id).placeholder)
        .copied()
        .collect();
    if real.is_empty() { sorted } else { real }
}

/// Remove tombstoned ids from every reachable child list.
pub(crate) fn sweep(tree: &mut StructureTree, tombstones: &HashSet<NodeId>) {
    let mut lists = vec![tree.root()];
    lists.extend(tree.preorder(tree.root()));
    for id in lists {
        tree.children_mut(id).retain(|c| !tombstones.contains(c));
    }
}
