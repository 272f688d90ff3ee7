use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Entity categories of the legal NER vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Person,
    Article,
    Chapter,
    Section,
    Law,
    Decree,
    Dahir,
    Decision,
    Constitution,
    Date,
    InternalRef,
    Court,
    Organization,
    Location,
    Other(String),
}

impl EntityKind {
    /// Resolve a free-form tag ("law", "internal-reference", "ORG").
    pub fn canonical(tag: &str) -> Self {
        let key = tag.trim().to_uppercase().replace(['-', ' '], "_");
        match key.as_str() {
            "PERSON" | "PER" => EntityKind::Person,
            "ARTICLE" => EntityKind::Article,
            "CHAPTER" => EntityKind::Chapter,
            "SECTION" => EntityKind::Section,
            "LAW" => EntityKind::Law,
            "DECREE" => EntityKind::Decree,
            "DAHIR" => EntityKind::Dahir,
            "DECISION" => EntityKind::Decision,
            "CONSTITUTION" => EntityKind::Constitution,
            "DATE" => EntityKind::Date,
            "INTERNAL_REF" | "INTERNAL_REFERENCE" | "REFERENCE" => EntityKind::InternalRef,
            "COURT" => EntityKind::Court,
            "ORGANIZATION" | "ORGANISATION" | "ORG" => EntityKind::Organization,
            "LOCATION" | "LOC" => EntityKind::Location,
            _ => EntityKind::Other(tag.trim().to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            EntityKind::Person => "PERSON",
            EntityKind::Article => "ARTICLE",
            EntityKind::Chapter => "CHAPTER",
            EntityKind::Section => "SECTION",
            EntityKind::Law => "LAW",
            EntityKind::Decree => "DECREE",
            EntityKind::Dahir => "DAHIR",
            EntityKind::Decision => "DECISION",
            EntityKind::Constitution => "CONSTITUTION",
            EntityKind::Date => "DATE",
            EntityKind::InternalRef => "INTERNAL_REF",
            EntityKind::Court => "COURT",
            EntityKind::Organization => "ORGANIZATION",
            EntityKind::Location => "LOCATION",
            EntityKind::Other(tag) => tag,
        }
    }

    /// Laws, decrees, dahirs, decisions and the constitution: entities an
    /// article citation can be governed by.
    pub fn is_instrument(&self) -> bool {
        matches!(
            self,
            EntityKind::Law
                | EntityKind::Decree
                | EntityKind::Dahir
                | EntityKind::Decision
                | EntityKind::Constitution
        )
    }

    /// Citations of a structural unit of a text.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EntityKind::Article | EntityKind::Chapter | EntityKind::Section
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for EntityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(EntityKind::canonical(&tag))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RelationKind {
    #[default]
    RefersTo,
    JumpsTo,
    Other(String),
}

impl RelationKind {
    pub fn canonical(label: &str) -> Self {
        match label.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "refers_to" => RelationKind::RefersTo,
            "jumps_to" => RelationKind::JumpsTo,
            _ => RelationKind::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RelationKind::RefersTo => "refers_to",
            RelationKind::JumpsTo => "jumps_to",
            RelationKind::Other(label) => label,
        }
    }
}

impl Serialize for RelationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for RelationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(RelationKind::canonical(&label))
    }
}

/// A recognized mention. Offsets are character positions in the final text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default, deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "start_char", default, deserialize_with = "offset_from_any")]
    pub start: usize,
    #[serde(rename = "end_char", default, deserialize_with = "offset_from_any")]
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_id: Option<String>,
    /// Produced by reference expansion rather than by the extractor.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        kind: EntityKind,
        text: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
            start,
            end,
            normalized: None,
            global_id: None,
            synthetic: false,
        }
    }

    pub fn span(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    pub fn within(&self, start: usize, end: usize) -> bool {
        self.start >= start && self.end <= end
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// A directed, typed edge between two entity ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "relation_id", default, deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: RelationKind,
    #[serde(rename = "source_id", deserialize_with = "id_from_any")]
    pub source: String,
    #[serde(rename = "target_id", deserialize_with = "id_from_any")]
    pub target: String,
}

impl Relation {
    pub fn new(
        id: impl Into<String>,
        kind: RelationKind,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Entities and relations of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NerResult {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl NerResult {
    /// Lenient conversion from an extractor reply; malformed items are skipped
    /// one by one instead of failing the whole payload.
    pub fn from_value(value: &Value) -> Self {
        let items = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        let raw_entities = items("entities");
        let raw_relations = items("relations");
        let entities: Vec<Entity> = raw_entities
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        let relations: Vec<Relation> = raw_relations
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();

        let skipped = raw_entities.len() - entities.len() + raw_relations.len() - relations.len();
        if skipped > 0 {
            tracing::debug!(skipped, "skipped malformed entity/relation items");
        }

        Self {
            entities,
            relations,
        }
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

fn id_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn offset_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let offset = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    Ok(offset as usize)
}
