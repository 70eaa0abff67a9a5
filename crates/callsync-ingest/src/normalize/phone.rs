//! Phone number extraction

use super::text::normalize_script;

/// Number of trailing digits kept; drops country prefixes of any length
const PHONE_DIGITS: usize = 10;

/// Separator between a number and a trailing label in long titles
const LABEL_SEPARATOR: &str = " - ";

/// Titles shorter than this keep text after the label separator
const LABEL_MIN_LEN: usize = 20;

/// Last ten digits of the first number in `text`, if it has at least ten.
///
/// Only the part before the first comma is considered; failing that, a long
/// text (more than 20 characters) is cut at the first `" - "`.
pub fn extract_last_10_digits(text: Option<&str>) -> Option<String> {
    let text = text.filter(|t| !t.is_empty())?;
    let text = normalize_script(Some(text));

    let candidate = match text.split_once(',') {
        Some((head, _)) => head,
        None if text.chars().count() > LABEL_MIN_LEN => text
            .split_once(LABEL_SEPARATOR)
            .map_or(text.as_str(), |(head, _)| head),
        None => text.as_str(),
    };

    let digits: String = candidate.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= PHONE_DIGITS).then(|| digits[digits.len() - PHONE_DIGITS..].to_string())
}

/// Phone from the dedicated field, falling back to the title
pub fn best_phone(phone: Option<&str>, title: Option<&str>) -> Option<String> {
    extract_last_10_digits(phone).or_else(|| extract_last_10_digits(title))
}
