use structure::Anchor;

use crate::llm::Message;

pub const STRUCTURE_SYSTEM: &str = "You are an expert in Moroccan legislation text structuring.";
pub const REPAIR_SYSTEM: &str = "You fix malformed JSON arrays from Moroccan legislation extraction.";
pub const NER_SYSTEM: &str = "You extract named entities from Moroccan legal text.";

const FIRST_CHUNK_END: &str = "<--- END ARABIC FIRST CHUNK.";
const NEXT_CHUNK_END: &str = "<--- END ARABIC SECOND CHUNK.";

const PASS1_INSTRUCTIONS: &str = r#"You receive the beginning of an Arabic legal text (law, decree or dahir) taken from an OCR scan.

TASK:
1. Read the document metadata from the header.
2. Build the skeleton of its hierarchy: every heading you can see (قسم, جزء, باب, فصل, فرع) and every article (مادة).
3. Output ONLY one JSON object, nothing else.

SCHEMA:
{
  "title": "full title of the text",
  "type": "law|decree|dahir|decision",
  "number": "official number, e.g. 37.22",
  "date": "promulgation date as written",
  "structure": [
    {"type": "باب", "number": "1", "title": "heading title", "text": "", "children": [
      {"type": "مادة", "number": "1", "title": "", "text": "article body", "children": []}
    ]}
  ],
  "tables_and_schedules": [
    {"title": "table title", "rows": [{"columns": ["cell", "cell"]}]}
  ]
}

RULES:
- "number" holds digits only; write ordinal words (الأول, الثاني ...) as digits
- Only articles carry "text"; headings keep "text" empty
- Copy article text exactly as it appears, without translating it
- Content outside the hierarchy (annexes, tables, forms) gets its own label as "type"
- No markdown, no explanations

TEXT:"#;

const PASS2_INSTRUCTIONS: &str = r#"You continue the structuring of an Arabic legal text. You receive the next slice of the document. It may start with the last lines of the previous slice; do not repeat content that belongs to them.

TASK:
1. Extract every heading and article found in this slice as a JSON array of nodes:
   {"type": "مادة", "number": "12", "title": "", "text": "article body", "children": []}
2. If the slice starts in the middle of a heading that is still open (its title appeared in an earlier slice), write first a single line
   Inherited context: type=<heading type>, number=<heading number>, title="<heading title>"
   and then the JSON array on the following lines.
3. Otherwise output only the JSON array.

RULES:
- "number" holds digits only; write ordinal words as digits
- Only articles carry "text"; an article cut at the end of the slice keeps the text seen so far
- Copy text exactly, without translating it
- No markdown, no explanations

TEXT:"#;

const NER_INSTRUCTIONS: &str = r#"Extract the named entities of the following Moroccan legal text and the relations between them.

SCHEMA:
{
  "entities": [
    {"id": "E1", "type": "PERSON|ARTICLE|CHAPTER|SECTION|LAW|DECREE|DAHIR|DECISION|CONSTITUTION|DATE|INTERNAL_REF|COURT|ORGANIZATION|LOCATION", "text": "exact mention", "start_char": 0, "end_char": 0}
  ],
  "relations": [
    {"relation_id": "R1", "type": "refers_to", "source_id": "E1", "target_id": "E2"}
  ]
}

RULES:
- "text" must be copied exactly from the input; offsets count characters from the start of the input
- Link an article to the law, decree or dahir it belongs to with "refers_to"
- A mention of several articles ("المواد من 5 إلى 9") is one INTERNAL_REF entity
- Output ONLY the JSON object

TEXT:"#;

/// Skeleton extraction over the head of the document.
pub fn pass1_messages(chunk: &str) -> Vec<Message> {
    vec![
        Message::system(STRUCTURE_SYSTEM),
        Message::user(format!("{}\n{}\n{}", PASS1_INSTRUCTIONS, chunk, FIRST_CHUNK_END)),
    ]
}

/// Continuation extraction: the open heading marker and the previous
/// chunk's tail come before the chunk text.
pub fn pass2_messages(inherited: Option<&Anchor>, tail: &str, chunk: &str) -> Vec<Message> {
    let context = inherited
        .map(|anchor| format!("{}\n", anchor.describe()))
        .unwrap_or_default();
    vec![
        Message::system(STRUCTURE_SYSTEM),
        Message::user(format!(
            "{}\n{}{}{}\n{}",
            PASS2_INSTRUCTIONS, context, tail, chunk, NEXT_CHUNK_END
        )),
    ]
}

pub fn repair_messages(raw_reply: &str) -> Vec<Message> {
    vec![
        Message::system(REPAIR_SYSTEM),
        Message::user(format!(
            "Return a JSON object {{\"result\": [...]}}. If the array can't be recovered, use an empty array.\n{}",
            raw_reply
        )),
    ]
}

pub fn ner_messages(text: &str) -> Vec<Message> {
    vec![
        Message::system(NER_SYSTEM),
        Message::user(format!("{}\n{}", NER_INSTRUCTIONS, text)),
    ]
}
