use scraper::ElementRef;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, strip diacritics and collapse whitespace.
///
/// Characters without an ASCII decomposition are dropped, except `ł` which
/// NFKD leaves intact and is common in Polish names.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .replace('ł', "l")
        .nfkd()
        .filter(char::is_ascii)
        .collect();
    collapse_whitespace(&folded)
}

/// Letters and digits of the normalized text, everything else removed.
pub fn compact(text: &str) -> String {
    normalize(text)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element: each text node trimmed, empty ones skipped,
/// joined with single spaces.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `jan-kowalski_jr` -> `Jan Kowalski Jr`
pub fn slug_to_name(value: &str) -> String {
    let cleaned = value.replace(['_', '-'], " ");
    let words: Vec<String> = cleaned
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        return value.to_string();
    }
    words.join(" ")
}
