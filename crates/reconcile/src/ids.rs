use ingest::numerals::canonical_num;
use std::collections::{HashMap, HashSet};

use crate::normalizer::governing_instrument;
use crate::schema::{Entity, EntityKind, NerResult};

/// Cross-document id of an instrument: "<KIND>_<NUMBER>".
fn instrument_global_id(entity: &Entity) -> Option<String> {
    let number = governing_instrument(&entity.text)
        .map(|(_, number)| number)
        .or_else(|| canonical_num(&entity.text));
    match number {
        Some(number) => Some(format!("{}_{}", entity.kind.tag(), number)),
        None if entity.kind == EntityKind::Constitution => Some(entity.kind.tag().to_string()),
        None => None,
    }
}

/// Assign `global_id` to instruments and articles.
///
/// An article governed by an instrument (through a relation in either
/// direction, or else by an instrument cited in its own text) becomes
/// "<INSTRUMENT_ID>_ART_<N>"; an ungoverned one becomes "ART_<N>".
/// Returns the number of ids assigned.
pub fn assign_global_ids(result: &mut NerResult) -> usize {
    let mut instruments: HashMap<String, String> = HashMap::new();
    for entity in result.entities.iter_mut() {
        if entity.kind.is_instrument() {
            entity.global_id = instrument_global_id(entity);
            if let Some(global) = &entity.global_id {
                instruments.entry(entity.id.clone()).or_insert_with(|| global.clone());
            }
        }
    }

    let mut assigned = instruments.len();
    for entity in result.entities.iter_mut() {
        if entity.kind != EntityKind::Article {
            continue;
        }
        let Some(number) = entity.normalized.clone().filter(|n| !n.is_empty()) else {
            continue;
        };

        let related = result.relations.iter().find_map(|r| {
            if r.source == entity.id {
                instruments.get(&r.target)
            } else if r.target == entity.id {
                instruments.get(&r.source)
            } else {
                None
            }
        });
        let governing = related.cloned().or_else(|| {
            governing_instrument(&entity.text).map(|(kind, n)| format!("{}_{}", kind.tag(), n))
        });

        entity.global_id = Some(match governing {
            Some(instrument) => format!("{instrument}_ART_{number}"),
            None => format!("ART_{number}"),
        });
        assigned += 1;
    }
    assigned
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StabilizeReport {
    /// Relations to unknown entities and exact repeats.
    pub relations_dropped: usize,
    /// Entities whose incoming id was already taken by an earlier entity.
    pub id_collisions: usize,
}

/// Renumber entities 1..N in text order and relations 1..M, rewriting
/// relation endpoints. Relations to unknown entities and exact repeats are
/// dropped. When two entities arrive with the same id, relations resolve to
/// the first of them in text order.
pub fn stabilize_ids(result: &mut NerResult) -> StabilizeReport {
    let mut report = StabilizeReport::default();
    result.entities.sort_by_key(|e| (e.start, e.end));

    let mut mapping: HashMap<String, String> = HashMap::new();
    for (i, entity) in result.entities.iter_mut().enumerate() {
        let new_id = (i + 1).to_string();
        let old_id = std::mem::take(&mut entity.id);
        match mapping.get(&old_id) {
            Some(first) => {
                tracing::warn!(
                    id = %old_id,
                    kept = %first,
                    entity = %new_id,
                    text = %entity.text,
                    "duplicate entity id, relations point to the first entity"
                );
                report.id_collisions += 1;
            }
            None => {
                mapping.insert(old_id, new_id.clone());
            }
        }
        entity.id = new_id;
    }

    let before = result.relations.len();
    let mut seen = HashSet::new();
    let relations = std::mem::take(&mut result.relations);
    for mut relation in relations {
        let (Some(source), Some(target)) = (mapping.get(&relation.source), mapping.get(&relation.target))
        else {
            continue;
        };
        if !seen.insert((relation.kind.clone(), source.clone(), target.clone())) {
            continue;
        }
        relation.source = source.clone();
        relation.target = target.clone();
        relation.id = (result.relations.len() + 1).to_string();
        result.relations.push(relation);
    }
    report.relations_dropped = before - result.relations.len();
    report
}
