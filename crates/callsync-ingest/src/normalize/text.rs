//! Script normalization for mixed Arabic/Latin text

use unicode_normalization::UnicodeNormalization;

/// Fold a CRM text value to trimmed ASCII.
///
/// Arabic-Indic digits (both the standard and the extended Persian block)
/// become ASCII digits, the rest of the Arabic block is dropped, and what
/// remains is NFKD-decomposed with every non-ASCII code point removed, which
/// strips diacritics. `None` yields an empty string.
pub fn normalize_script(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };

    let folded: String = text
        .chars()
        .filter_map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from_digit(c as u32 - 0x0660, 10),
            '\u{06F0}'..='\u{06F9}' => char::from_digit(c as u32 - 0x06F0, 10),
            '\u{0600}'..='\u{06FF}' => None,
            _ => Some(c),
        })
        .collect();

    folded
        .nfkd()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .trim()
        .to_string()
}
