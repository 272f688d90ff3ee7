use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::offsets::CharText;
use crate::schema::{Entity, EntityKind, NerResult};

#[derive(Error, Debug, PartialEq)]
pub enum EditError {
    #[error("invalid range {start}..{end} for a text of {len} characters")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("entity {0} not found")]
    UnknownEntity(String),
}

/// Corrections fed back from an annotation editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    Add {
        start: usize,
        end: usize,
        kind: EntityKind,
        #[serde(default)]
        normalized: Option<String>,
    },
    Delete {
        id: String,
    },
    Update {
        id: String,
        #[serde(default)]
        kind: Option<EntityKind>,
        #[serde(default)]
        normalized: Option<String>,
        #[serde(default)]
        start: Option<usize>,
        #[serde(default)]
        end: Option<usize>,
    },
    ReplaceRange {
        start: usize,
        end: usize,
        replacement: String,
    },
}

impl EditOp {
    /// Apply the edit to `text` and `result` in place.
    ///
    /// A replacement shifts the entities after it, truncates an entity that
    /// straddles its start and drops the ones it overwrites.
    pub fn apply(self, text: &mut String, result: &mut NerResult) -> Result<(), EditError> {
        match self {
            EditOp::Add {
                start,
                end,
                kind,
                normalized,
            } => {
                let doc = CharText::new(text);
                let span = doc
                    .slice(start, end)
                    .filter(|_| start < end)
                    .ok_or(EditError::InvalidRange {
                        start,
                        end,
                        len: doc.len(),
                    })?;
                let mut entity = Entity::new(next_id(result), kind, span, start, end);
                entity.normalized = normalized;
                result.entities.push(entity);
            }
            EditOp::Delete { id } => {
                let before = result.entities.len();
                result.entities.retain(|e| e.id != id);
                if result.entities.len() == before {
                    return Err(EditError::UnknownEntity(id));
                }
            }
            EditOp::Update {
                id,
                kind,
                normalized,
                start,
                end,
            } => {
                let doc = CharText::new(text);
                let entity = result
                    .entities
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| EditError::UnknownEntity(id.clone()))?;

                if let Some(kind) = kind {
                    entity.kind = kind;
                    entity.global_id = None;
                }
                if start.is_some() || end.is_some() {
                    let (s, e) = (start.unwrap_or(entity.start), end.unwrap_or(entity.end));
                    let span = doc.slice(s, e).filter(|_| s < e).ok_or(EditError::InvalidRange {
                        start: s,
                        end: e,
                        len: doc.len(),
                    })?;
                    entity.text = span.to_string();
                    entity.start = s;
                    entity.end = e;
                }
                if normalized.is_some() {
                    entity.normalized = normalized;
                }
            }
            EditOp::ReplaceRange {
                start,
                end,
                replacement,
            } => {
                let doc = CharText::new(text);
                let (Some(head), Some(tail)) = (doc.slice(0, start), doc.slice(end, doc.len())) else {
                    return Err(EditError::InvalidRange {
                        start,
                        end,
                        len: doc.len(),
                    });
                };
                if start > end {
                    return Err(EditError::InvalidRange {
                        start,
                        end,
                        len: doc.len(),
                    });
                }
                let edited = format!("{head}{replacement}{tail}");
                let inserted = replacement.chars().count();

                let updated = CharText::new(&edited);
                result.entities.retain_mut(|e| {
                    if e.end <= start {
                        true
                    } else if e.start >= end {
                        e.start = e.start - end + start + inserted;
                        e.end = e.end - end + start + inserted;
                        true
                    } else if e.start < start {
                        e.end = start;
                        e.text = updated.slice(e.start, e.end).unwrap_or_default().to_string();
                        true
                    } else {
                        false
                    }
                });
                *text = edited;
            }
        }
        Ok(())
    }
}

/// One past the largest numeric suffix among entity ids.
fn next_id(result: &NerResult) -> String {
    let max = result
        .entities
        .iter()
        .filter_map(|e| {
            let digits: String = e
                .id
                .chars()
                .rev()
                .take_while(char::is_ascii_digit)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            digits.parse::<u64>().ok()
        })
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}
