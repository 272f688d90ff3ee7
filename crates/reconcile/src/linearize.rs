use serde_json::Value;

/// Every string leaf of a JSON document, in document order, one per line.
///
/// Numbers, booleans and nulls are left out; this is the text entity
/// extraction runs over for an already structured document.
pub fn json_to_text(value: &Value) -> String {
    let mut lines = Vec::new();
    collect(value, &mut lines);
    lines.join("\n")
}

fn collect<'a>(value: &'a Value, lines: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() {
                lines.push(s);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect(item, lines)),
        Value::Object(map) => map.values().for_each(|item| collect(item, lines)),
        _ => {}
    }
}
