//! Defensive parsing of generation-service replies.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use structure::{Anchor, StructureNode};

use crate::error::ExtractError;

const ENVELOPE_PREFIX: &str = "Inherited context:";

static ENVELOPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^Inherited context:\s*type=([^,]+),\s*number=([^,]+),\s*title="([^"]*)""#)
        .expect("envelope regex")
});

static OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("opening fence regex"));

static CLOSING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```\s*$").expect("closing fence regex"));

/// A parsed Pass 2 reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReply {
    /// Heading the chunk continues under, when the reply named one.
    pub anchor: Option<Anchor>,
    pub nodes: Vec<StructureNode>,
}

pub fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    let text = OPENING_FENCE.replace(text, "");
    let text = CLOSING_FENCE.replace(&text, "");
    text.trim().to_string()
}

/// Split a leading "Inherited context: ..." line from the payload.
///
/// A marker line that does not name a type, number and title is dropped
/// without producing an anchor.
pub fn split_inherited(reply: &str) -> (Option<Anchor>, &str) {
    let text = reply.trim_start();
    if !text.starts_with(ENVELOPE_PREFIX) {
        return (None, reply);
    }

    let (line, rest) = text.split_once('\n').unwrap_or((text, ""));
    let anchor = ENVELOPE
        .captures(line.trim())
        .map(|caps| Anchor::new(caps[1].trim(), caps[2].trim(), caps[3].trim()));
    (anchor, rest.trim_start())
}

/// Parse `text` as JSON, falling back to its outermost object or array span
/// when it is wrapped in prose.
pub fn recover_json(text: &str) -> Option<Value> {
    let text = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str(&text) {
        return Some(value);
    }

    let mut spans: Vec<(usize, usize)> = [('{', '}'), ('[', ']')]
        .iter()
        .filter_map(|&(open, close)| {
            let start = text.find(open)?;
            let end = text.rfind(close)?;
            (end > start).then_some((start, end))
        })
        .collect();
    spans.sort();

    spans
        .into_iter()
        .find_map(|(start, end)| serde_json::from_str(&text[start..=end]).ok())
}

/// Metadata and skeleton nodes of a Pass 1 reply.
pub fn parse_skeleton_reply(
    reply: &str,
) -> Result<(Map<String, Value>, Vec<StructureNode>), ExtractError> {
    let Some(Value::Object(mut obj)) = recover_json(reply) else {
        return Err(ExtractError::Pass1Malformed);
    };
    let nodes = obj
        .remove("structure")
        .map(|value| StructureNode::list_from_value(&value))
        .unwrap_or_default();
    Ok((obj, nodes))
}

/// Nodes of a Pass 2 reply: a bare array, a single node object, or either
/// behind an inherited-context line.
pub fn parse_chunk_reply(reply: &str) -> Result<ChunkReply, ExtractError> {
    let stripped = strip_code_fences(reply);
    let (anchor, payload) = split_inherited(&stripped);
    let payload = strip_code_fences(payload);

    match recover_json(&payload) {
        Some(value @ (Value::Array(_) | Value::Object(_))) => Ok(ChunkReply {
            anchor,
            nodes: StructureNode::list_from_value(&value),
        }),
        _ => Err(ExtractError::MalformedReply(excerpt(&payload))),
    }
}

/// Nodes returned by a repair call: `{"result": [...]}` or a bare array.
pub fn parse_repair_reply(reply: &str) -> Option<Vec<StructureNode>> {
    match recover_json(reply)? {
        items @ Value::Array(_) => Some(StructureNode::list_from_value(&items)),
        Value::Object(mut obj) => match obj.remove("result")? {
            items @ Value::Array(_) => Some(StructureNode::list_from_value(&items)),
            _ => None,
        },
        _ => None,
    }
}

/// Entities and relations object of an entity-extraction reply.
pub fn parse_entity_reply(reply: &str) -> Option<Value> {
    recover_json(reply).filter(Value::is_object)
}

fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 120;
    let mut out: String = text.chars().take(MAX_CHARS).collect();
    if text.chars().nth(MAX_CHARS).is_some() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use structure::NodeKind;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```JSON [2] ```  "), "[2]");
        assert_eq!(strip_code_fences("[3]"), "[3]");
    }

    #[test]
    fn test_split_inherited_envelope() {
        let reply = "Inherited context: type=الباب, number=الثاني, title=\"العقوبات\"\n[]";
        let (anchor, rest) = split_inherited(reply);
        let anchor = anchor.unwrap();
        assert_eq!(anchor.kind, NodeKind::Title);
        assert_eq!(anchor.number, "2");
        assert_eq!(anchor.title, "العقوبات");
        assert_eq!(rest, "[]");

        let (anchor, rest) = split_inherited("[{\"number\": 1}]");
        assert!(anchor.is_none());
        assert_eq!(rest, "[{\"number\": 1}]");
    }

    #[test]
    fn test_unparseable_envelope_line_is_dropped() {
        let (anchor, rest) = split_inherited("Inherited context: none\n[]");
        assert!(anchor.is_none());
        assert_eq!(rest, "[]");
    }

    #[test]
    fn test_recover_json_from_noise() {
        let value = recover_json("noise before {\"entities\": []} noise after").unwrap();
        assert_eq!(value, serde_json::json!({"entities": []}));

        let value = recover_json("Here you go: [{\"a\": 1}] done").unwrap();
        assert!(value.is_array());

        assert!(recover_json("[{\"type\": \"مادة\", \"number\": ").is_none());
    }

    #[test]
    fn test_parse_chunk_reply_variants() {
        let reply = "```json\n{\"type\": \"مادة\", \"number\": \"4\", \"text\": \"نص\"}\n```";
        let parsed = parse_chunk_reply(reply).unwrap();
        assert!(parsed.anchor.is_none());
        assert_eq!(parsed.nodes.len(), 1);

        let reply = "Inherited context: type=فصل, number=3, title=\"\"\n```json\n[{\"type\": \"مادة\", \"number\": 9}]\n```";
        let parsed = parse_chunk_reply(reply).unwrap();
        assert_eq!(parsed.anchor.unwrap().kind, NodeKind::Chapter);
        assert_eq!(parsed.nodes[0].number, "9");

        let err = parse_chunk_reply("[{\"type\": \"مادة\", \"number\": \"5\", \"text\": \"يعاقب").unwrap_err();
        assert!(err.is_repairable());
        assert!(parse_chunk_reply("\"just a string\"").is_err());
    }

    #[test]
    fn test_parse_repair_reply() {
        let nodes = parse_repair_reply("{\"result\": [{\"type\": \"مادة\", \"number\": \"5\"}]}").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(parse_repair_reply("{\"result\": []}"), Some(Vec::new()));
        assert!(parse_repair_reply("{\"other\": 1}").is_none());
    }

    #[test]
    fn test_parse_skeleton_reply() {
        let (metadata, nodes) = parse_skeleton_reply(
            "{\"title\": \"قانون\", \"number\": \"37.22\", \"structure\": [{\"type\": \"باب\", \"number\": \"1\"}]}",
        )
        .unwrap();
        assert_eq!(metadata["number"], "37.22");
        assert!(!metadata.contains_key("structure"));
        assert_eq!(nodes[0].kind, NodeKind::Title);

        assert!(matches!(parse_skeleton_reply("[]"), Err(ExtractError::Pass1Malformed)));
    }
}
