//! Person names: honorifics dropped, feminine forms folded onto their
//! masculine base, definite article stripped, then transliterated.

use ingest::numerals::fold_alef;
use once_cell::sync::Lazy;
use std::collections::HashMap;

const HONORIFICS: &[&str] = &[
    "السيد", "السيدة", "الاستاذ", "الاستاذة", "الدكتور", "الدكتورة", "ذ.", "د.",
];

/// Feminine words whose masculine base is not a plain suffix strip.
static FEMININE_BASE: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("زوجة", "زوج"),
        ("ارملة", "ارمل"),
        ("مطلقة", "مطلق"),
        ("المدعية", "المدعي"),
        ("المدعى عليها", "المدعى عليه"),
        ("المشتكية", "المشتكي"),
        ("الطاعنة", "الطاعن"),
        ("المطلوبة", "المطلوب"),
    ])
});

fn transliterate_char(c: char) -> &'static str {
    match c {
        'ا' | 'أ' | 'إ' | 'آ' | 'ى' | 'ة' => "a",
        'ب' => "b",
        'ت' => "t",
        'ث' => "th",
        'ج' => "j",
        'ح' | 'ه' => "h",
        'خ' => "kh",
        'د' | 'ض' => "d",
        'ذ' => "dh",
        'ر' => "r",
        'ز' | 'ظ' => "z",
        'س' | 'ص' => "s",
        'ش' => "sh",
        'ط' => "t",
        'ع' => "a",
        'غ' => "gh",
        'ف' => "f",
        'ق' => "q",
        'ك' => "k",
        'ل' => "l",
        'م' => "m",
        'ن' => "n",
        'و' => "w",
        'ي' => "y",
        'ء' | 'ؤ' | 'ئ' => "'",
        _ => "",
    }
}

fn is_diacritic(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{0652}' | '\u{0640}')
}

/// Masculine base of a single name word.
fn masculine(word: &str) -> String {
    if let Some(base) = FEMININE_BASE.get(word) {
        return base.to_string();
    }
    // Nisba adjectives: العلوية -> العلوي
    match word.strip_suffix("ية") {
        Some(stem) if stem.chars().count() >= 2 => format!("{stem}ي"),
        _ => word.to_string(),
    }
}

fn strip_article(word: &str) -> &str {
    match word.strip_prefix("ال") {
        Some(rest) if rest.chars().count() >= 2 => rest,
        _ => word,
    }
}

fn transliterate_word(word: &str) -> String {
    let mut out = String::new();
    for c in word.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push_str(transliterate_char(c));
        }
    }
    let mut chars = out.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => out,
    }
}

/// Canonical Latin form of a person mention ("السيدة فاطمة العلوية" ->
/// "Fatma Alwy").
pub fn normalize_person(text: &str) -> Option<String> {
    let cleaned: String = text.chars().filter(|c| !is_diacritic(*c)).collect();
    let mut phrase = fold_alef(&cleaned);
    for (feminine, base) in FEMININE_BASE.iter() {
        if feminine.contains(' ') && phrase.contains(feminine) {
            phrase = phrase.replace(feminine, base);
        }
    }

    let words: Vec<String> = phrase
        .split_whitespace()
        .filter(|w| !HONORIFICS.contains(w))
        .map(masculine)
        .map(|w| transliterate_word(strip_article(&w)))
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}
