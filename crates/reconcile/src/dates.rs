//! Date mentions to ISO form.
//!
//! Gregorian dates come out as `YYYY-MM-DD`. Hijri dates, which chrono has no
//! calendar for, come out as `AH:YYYY-MM-DD` in the Hijri calendar. When a
//! mention carries both (the usual "27 من شعبان 1432 (29 يوليو 2011)"), the
//! Gregorian one wins.

use chrono::NaiveDate;
use ingest::numerals::{fold_alef, translate_digits};
use once_cell::sync::Lazy;
use regex::Regex;

/// Gregorian month names, alef-folded: Moroccan, Egyptian and Levantine
/// spellings plus French transliterations.
const GREGORIAN_MONTHS: &[(&str, u32)] = &[
    ("يناير", 1),
    ("كانون الثاني", 1),
    ("فبراير", 2),
    ("شباط", 2),
    ("مارس", 3),
    ("اذار", 3),
    ("ابريل", 4),
    ("نيسان", 4),
    ("ماي", 5),
    ("مايو", 5),
    ("ايار", 5),
    ("يونيو", 6),
    ("يونيه", 6),
    ("حزيران", 6),
    ("يوليوز", 7),
    ("يوليو", 7),
    ("يوليه", 7),
    ("تموز", 7),
    ("غشت", 8),
    ("اغسطس", 8),
    ("اب", 8),
    ("شتنبر", 9),
    ("سبتمبر", 9),
    ("ايلول", 9),
    ("اكتوبر", 10),
    ("تشرين الاول", 10),
    ("نونبر", 11),
    ("نوفمبر", 11),
    ("تشرين الثاني", 11),
    ("دجنبر", 12),
    ("ديسمبر", 12),
    ("كانون الاول", 12),
];

const HIJRI_MONTHS: &[(&str, u32)] = &[
    ("محرم", 1),
    ("صفر", 2),
    ("ربيع الاول", 3),
    ("ربيع الثاني", 4),
    ("ربيع الاخر", 4),
    ("جمادى الاولى", 5),
    ("جمادى الاول", 5),
    ("جمادى الثانية", 6),
    ("جمادى الاخرة", 6),
    ("رجب", 7),
    ("شعبان", 8),
    ("رمضان", 9),
    ("شوال", 10),
    ("ذو القعدة", 11),
    ("ذي القعدة", 11),
    ("ذو الحجة", 12),
    ("ذي الحجة", 12),
];

fn month_regex(months: &[(&str, u32)]) -> Regex {
    let mut names: Vec<&str> = months.iter().map(|(name, _)| *name).collect();
    // Longest first so "يوليوز" is tried before "يوليو"
    names.sort_by_key(|name| std::cmp::Reverse(name.chars().count()));
    let alternation = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(
        r"(?:^|[^\p{{L}}0-9])([0-9]{{1,2}}|فاتح)\s*(?:من\s+)?(?:شهر\s+)?({alternation})\s*(?:سنة\s+|عام\s+)?([0-9]{{4}})"
    );
    Regex::new(&pattern).expect("month date regex")
}

static GREGORIAN: Lazy<Regex> = Lazy::new(|| month_regex(GREGORIAN_MONTHS));
static HIJRI: Lazy<Regex> = Lazy::new(|| month_regex(HIJRI_MONTHS));

static NUMERIC_YMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{4})[-/.]([0-9]{1,2})[-/.]([0-9]{1,2})").expect("ymd regex")
});

static NUMERIC_DMY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{1,2})[-/.]([0-9]{1,2})[-/.]([0-9]{4})").expect("dmy regex")
});

fn month_number(months: &[(&str, u32)], name: &str) -> Option<u32> {
    months.iter().find(|(m, _)| *m == name).map(|(_, n)| *n)
}

fn day_number(raw: &str) -> Option<u32> {
    if raw == "فاتح" {
        Some(1)
    } else {
        raw.parse().ok()
    }
}

/// ISO form of the first recognizable date in `text`.
pub fn normalize_date(text: &str) -> Option<String> {
    let folded = fold_alef(&translate_digits(text));

    if let Some(date) = numeric_date(&folded) {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    for caps in GREGORIAN.captures_iter(&folded) {
        let day = day_number(&caps[1]);
        let month = month_number(GREGORIAN_MONTHS, &caps[2]);
        let year = caps[3].parse::<i32>().ok();
        if let (Some(day), Some(month), Some(year)) = (day, month, year) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date.format("%Y-%m-%d").to_string());
            }
        }
    }

    for caps in HIJRI.captures_iter(&folded) {
        let day = day_number(&caps[1]).filter(|d| (1..=30).contains(d));
        let month = month_number(HIJRI_MONTHS, &caps[2]);
        if let (Some(day), Some(month)) = (day, month) {
            return Some(format!("AH:{}-{month:02}-{day:02}", &caps[3]));
        }
    }

    None
}

fn numeric_date(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = NUMERIC_YMD.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
        if date.is_some() {
            return date;
        }
    }
    let caps = NUMERIC_DMY.captures(text)?;
    NaiveDate::from_ymd_opt(
        caps[3].parse().ok()?,
        caps[2].parse().ok()?,
        caps[1].parse().ok()?,
    )
}
