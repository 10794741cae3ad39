//! Display labels from field names.

/// Derive a human-readable label from a field name.
///
/// Words are split on whitespace and at lower-to-upper case boundaries
/// (`firstName` → `first`, `Name`). Each word gets an upper-case first
/// letter; words with no lower-case letters are kept verbatim, so acronyms
/// survive (`HTTPStatus` stays `HTTPStatus`, `userID` becomes `User ID`).
///
/// ```
/// use bound_core::title_case_label;
///
/// assert_eq!(title_case_label("firstName"), "First Name");
/// assert_eq!(title_case_label("HTTPStatus"), "HTTPStatus");
/// ```
#[must_use]
pub fn title_case_label(field: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for chunk in field.split_whitespace() {
        let mut current = String::new();
        let mut prev_lower = false;
        for ch in chunk.chars() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
            current.push(ch);
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
        .iter()
        .map(|word| capitalize(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    if !word.chars().any(char::is_lowercase) {
        return word.to_owned();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_is_split() {
        assert_eq!(title_case_label("firstName"), "First Name");
        assert_eq!(title_case_label("dateOfBirth"), "Date Of Birth");
    }

    #[test]
    fn acronyms_are_preserved() {
        assert_eq!(title_case_label("HTTPStatus"), "HTTPStatus");
        assert_eq!(title_case_label("XML"), "XML");
        assert_eq!(title_case_label("userID"), "User ID");
    }

    #[test]
    fn whitespace_separates_words() {
        assert_eq!(title_case_label("chart  values"), "Chart Values");
    }

    #[test]
    fn single_and_empty() {
        assert_eq!(title_case_label("values"), "Values");
        assert_eq!(title_case_label(""), "");
    }

    #[test]
    fn digits_end_a_lower_run() {
        assert_eq!(title_case_label("chart2Height"), "Chart2 Height");
    }
}
