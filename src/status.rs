//! Booking status keywords and participant counters.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::models::SlotStatus;
use crate::text::{collapse_whitespace, element_text, normalize};

/// Keywords in priority order: the first one contained in the normalized
/// text decides. Longer phrases come before the shorter phrases they
/// contain, so "zamkniete zapisy" is never read as "zapisy".
pub const STATUS_KEYWORDS: &[(&str, SlotStatus)] = &[
    ("termin rejestracji minal", SlotStatus::Closed),
    ("zamkniete zapisy", SlotStatus::Closed),
    ("za wczesnie", SlotStatus::Closed),
    ("odwolane zajecia", SlotStatus::Cancelled),
    ("odwolane", SlotStatus::Cancelled),
    ("odwolana", SlotStatus::Cancelled),
    ("odwolany", SlotStatus::Cancelled),
    ("lista rezerwowa", SlotStatus::Waitlist),
    ("brak miejsc", SlotStatus::Full),
    ("zarezerwuj", SlotStatus::Open),
    ("rezerwuj", SlotStatus::Open),
    ("zapisz sie", SlotStatus::Open),
    ("zapisy", SlotStatus::Open),
];

static CAPACITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*/\s*(\d+)").expect("regex compiles"));
static COUNTER_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#".users, span[data-icon-alt*="uczest" i]"#).expect("selector parses")
});

/// One case-insensitive pattern per keyword that also accepts the Polish
/// diacritic spellings of its letters.
static KEYWORD_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    STATUS_KEYWORDS
        .iter()
        .map(|(keyword, _)| {
            let pattern: String = keyword.chars().map(letter_class).collect();
            Regex::new(&format!(r"(?i)\b{pattern}\b")).expect("regex compiles")
        })
        .collect()
});

fn letter_class(c: char) -> String {
    match c {
        'a' => "[aą]".into(),
        'c' => "[cć]".into(),
        'e' => "[eę]".into(),
        'l' => "[lł]".into(),
        'n' => "[nń]".into(),
        'o' => "[oó]".into(),
        's' => "[sś]".into(),
        'z' => "[zźż]".into(),
        ' ' => r"\s+".into(),
        other => regex::escape(&other.to_string()),
    }
}

pub fn classify_status(text: &str) -> Option<SlotStatus> {
    let normalized = normalize(text);
    STATUS_KEYWORDS
        .iter()
        .find(|(keyword, _)| normalized.contains(keyword))
        .map(|(_, status)| *status)
}

/// Removes status keywords from display text.
pub fn strip_status_keywords(text: &str) -> String {
    let stripped = KEYWORD_RES
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, " ").into_owned());
    collapse_whitespace(&stripped)
}

/// `(used, total)` from the first `N / M` pair in a counter element.
pub fn parse_capacity(item: ElementRef<'_>) -> Option<(u32, u32)> {
    let counter = item.select(&COUNTER_SEL).next()?;
    let text = element_text(counter);
    let caps = CAPACITY_RE.captures(&text)?;
    let used = caps[1].parse().ok()?;
    let total = caps[2].parse().ok()?;
    Some((used, total))
}
