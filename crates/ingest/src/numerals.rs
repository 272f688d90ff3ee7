//! Digit-script and ordinal helpers shared by heading and citation canonicalization.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("digit run regex"));

static SEPARATED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:[./]+[0-9]+)*").expect("separated number regex"));

const UNITS_MASCULINE: [&str; 10] = [
    "الاول", "الثاني", "الثالث", "الرابع", "الخامس", "السادس", "السابع", "الثامن", "التاسع", "العاشر",
];

const UNITS_FEMININE: [&str; 10] = [
    "الاولى", "الثانية", "الثالثة", "الرابعة", "الخامسة", "السادسة", "السابعة", "الثامنة", "التاسعة",
    "العاشرة",
];

/// Ordinal words -> value, keyed on the alef-folded form.
static ORDINALS: Lazy<HashMap<String, u32>> = Lazy::new(|| {
    let mut map = HashMap::new();

    for (i, (m, f)) in UNITS_MASCULINE.iter().zip(UNITS_FEMININE.iter()).enumerate() {
        let value = i as u32 + 1;
        map.insert(m.to_string(), value);
        map.insert(f.to_string(), value);
        // Indefinite forms appear in headings like "باب ثان"
        map.insert(m.trim_start_matches("ال").to_string(), value);
        map.insert(f.trim_start_matches("ال").to_string(), value);
    }

    // 11..19 are written as "<unit> عشر" / "<unit> عشرة"
    map.insert("الحادي عشر".to_string(), 11);
    map.insert("الحادية عشرة".to_string(), 11);
    for i in 1..9 {
        let value = i as u32 + 11;
        map.insert(format!("{} عشر", UNITS_MASCULINE[i]), value);
        map.insert(format!("{} عشرة", UNITS_FEMININE[i]), value);
    }

    map.insert("العشرون".to_string(), 20);
    map.insert("العشرين".to_string(), 20);

    map.insert("تمهيدي".to_string(), 0);
    map.insert("تمهيدية".to_string(), 0);
    map.insert("التمهيدي".to_string(), 0);
    map.insert("التمهيدية".to_string(), 0);

    map
});

/// Map Arabic-Indic and extended (Persian) digits to ASCII.
pub fn translate_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            _ => c,
        })
        .collect()
}

/// Fold hamza-carrying alef variants and collapse whitespace.
pub fn fold_alef(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| match c {
            'أ' | 'إ' | 'آ' | 'ٱ' => 'ا',
            _ => c,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Value of an ordinal word ("الأولى", "الحادي عشر", "تمهيدي").
pub fn ordinal_value(text: &str) -> Option<u32> {
    ORDINALS.get(&fold_alef(text.trim())).copied()
}

/// Canonical digit string for a heading or reference identifier.
///
/// Digit scripts are translated, ordinal words resolved, and the first digit
/// run is re-rendered without leading zeros. Returns `None` when nothing
/// numeric can be recovered.
pub fn canonical_number(raw: &str) -> Option<String> {
    let translated = translate_digits(raw.trim());
    if let Some(value) = ordinal_value(&translated) {
        return Some(value.to_string());
    }

    if let Some(m) = DIGIT_RUN.find(&translated) {
        return Some(strip_leading_zeros(m.as_str()));
    }

    // Ordinal embedded in a longer phrase, e.g. "الباب الثاني"
    let words: Vec<&str> = translated.split_whitespace().collect();
    for width in (1..=2).rev() {
        for window in words.windows(width) {
            if let Some(value) = ordinal_value(&window.join(" ")) {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Canonical instrument number keeping its separators ("1.06.169", "29.11").
pub fn canonical_num(value: &str) -> Option<String> {
    let translated = translate_digits(value);
    let m = SEPARATED_NUMBER.find(&translated)?;

    let mut out = String::new();
    let mut pending_sep: Option<char> = None;
    for c in m.as_str().chars() {
        if c.is_ascii_digit() {
            if let Some(sep) = pending_sep.take() {
                out.push(sep);
            }
            out.push(c);
        } else if pending_sep.is_none() {
            pending_sep = Some(c);
        }
    }
    Some(out)
}

/// All digit runs of a mention, in order ("المواد 5 و 9" -> ["5", "9"]).
pub fn digit_runs(text: &str) -> Vec<String> {
    let translated = translate_digits(text);
    DIGIT_RUN
        .find_iter(&translated)
        .map(|m| strip_leading_zeros(m.as_str()))
        .collect()
}

/// Integer value of an already-canonical number.
pub fn parse_int(number: &str) -> Option<u64> {
    let trimmed = number.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

fn strip_leading_zeros(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_digits() {
        assert_eq!(translate_digits("المادة ١٢"), "المادة 12");
        assert_eq!(translate_digits("۳۴"), "34");
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(ordinal_value("الأولى"), Some(1));
        assert_eq!(ordinal_value("الحادي عشر"), Some(11));
        assert_eq!(ordinal_value("الثالثة عشرة"), Some(13));
        assert_eq!(ordinal_value("تمهيدي"), Some(0));
        assert_eq!(ordinal_value("مجهول"), None);
    }

    #[test]
    fn test_canonical_number() {
        assert_eq!(canonical_number("٠٧").as_deref(), Some("7"));
        assert_eq!(canonical_number("الثاني").as_deref(), Some("2"));
        assert_eq!(canonical_number("الباب الثاني عشر").as_deref(), Some("12"));
        assert_eq!(canonical_number("5 مكرر").as_deref(), Some("5"));
        assert_eq!(canonical_number("الفريدة"), None);
    }

    #[test]
    fn test_canonical_number_is_idempotent() {
        for raw in ["٠٧", "الرابعة", "12", "تمهيدي"] {
            let once = canonical_number(raw).unwrap();
            assert_eq!(canonical_number(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_canonical_num_keeps_separators() {
        assert_eq!(canonical_num("رقم ١.٠٦.١٦٩").as_deref(), Some("1.06.169"));
        assert_eq!(canonical_num("القانون 29.11").as_deref(), Some("29.11"));
        assert_eq!(canonical_num("بدون رقم"), None);
    }

    #[test]
    fn test_digit_runs() {
        assert_eq!(digit_runs("المواد 5 و 09"), vec!["5", "9"]);
        assert!(digit_runs("لا شيء").is_empty());
    }
}
