use serde::{Deserialize, Deserializer};

/// Normalizes free text by stripping surrounding whitespace and
/// composing it into Unicode Normalization Form C.
///
/// ```
/// use radio::normalization::normalize_text;
/// assert_eq!(normalize_text(" Take Five\u{301} "), "Take Fiv\u{e9}");
/// ```
pub fn normalize_text(text: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    text.as_ref().trim().nfc().collect()
}

/// Deserializes an optional `String` after running it through
/// `normalize_text`. Blank strings become `None`.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let o: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(o.map(normalize_text).filter(|s| !s.is_empty()))
}

/// Turns a user-supplied file name into something safe to use as the
/// last segment of a blob name. Directory components are dropped, and
/// every run of characters outside `[A-Za-z0-9._-]` becomes one `-`.
///
/// ```
/// use radio::normalization::sanitize_file_name;
/// assert_eq!(sanitize_file_name("../Take Five (live).mp3"), "Take-Five-live-.mp3");
/// ```
pub fn sanitize_file_name(name: impl AsRef<str>) -> String {
    let name = name.as_ref();
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);

    let mut sanitized = String::with_capacity(base.len());
    let mut replaced = false;

    for c in base.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
            sanitized.push(c);
            replaced = false;
        } else if !replaced {
            sanitized.push('-');
            replaced = true;
        }
    }

    sanitized.trim_start_matches('.').to_owned()
}

/// Sanitizes every segment of a `/`-separated blob key, dropping the
/// ones that end up empty so keys can't climb out of their folder.
///
/// ```
/// use radio::normalization::sanitize_blob_key;
/// assert_eq!(
///     sanitize_blob_key("jazz-recordings/../1-Take Five.mp3"),
///     "jazz-recordings/1-Take-Five.mp3"
/// );
/// ```
pub fn sanitize_blob_key(key: impl AsRef<str>) -> String {
    key.as_ref()
        .split(|c| c == '/' || c == '\\')
        .map(sanitize_file_name)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Derives a title from a file name by dropping its extension.
///
/// ```
/// use radio::normalization::title_from_file_name;
/// assert_eq!(title_from_file_name("So What.flac"), "So What");
/// assert_eq!(title_from_file_name("README"), "README");
/// ```
pub fn title_from_file_name(name: impl AsRef<str>) -> String {
    let name = name.as_ref();
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);

    let stem = match base.rfind('.') {
        Some(index) if index > 0 => &base[..index],
        _ => base,
    };

    normalize_text(stem)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use unicode_normalization::is_nfc;

    use super::{normalize_text, sanitize_blob_key, sanitize_file_name};

    fn count_whitespace(s: impl AsRef<str>) -> usize {
        s.as_ref().chars().filter(|c| c.is_whitespace()).count()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 2000, ..ProptestConfig::default()
        })]

        #[test]
        fn normalization_works(string in "(\\S.*\\S|\\S+)", space_before in "\\s*", space_after in "\\s*") {
            let normalized = normalize_text(format!("{}{}{}", space_before, string, space_after));

            prop_assert!(is_nfc(&normalized), "{:?} (normalized form of {:?}) is in NFC", normalized, string);

            prop_assert!(!normalized.starts_with(char::is_whitespace) && !normalized.ends_with(char::is_whitespace), "{:?} (normalized form of {:?}) has no leading or trailing whitespace", normalized, string);

            let trimmed = normalized.trim();

            prop_assert_eq!(count_whitespace(&normalized), count_whitespace(&trimmed), "{:?} (normalized form of {:?}) preserves inner whitespace", normalized, string);
        }

        #[test]
        fn sanitized_names_are_safe(name in ".*") {
            let sanitized = sanitize_file_name(&name);

            prop_assert!(sanitized.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'), "{:?} (sanitized form of {:?}) only has safe characters", sanitized, name);
            prop_assert!(!sanitized.starts_with('.'), "{:?} (sanitized form of {:?}) is not hidden", sanitized, name);
        }

        #[test]
        fn blob_keys_stay_relative(key in ".*") {
            let sanitized = sanitize_blob_key(&key);

            prop_assert!(!sanitized.starts_with('/'), "{:?} (sanitized form of {:?}) is relative", sanitized, key);
            prop_assert!(sanitized.is_empty() || sanitized.split('/').all(|segment| !segment.is_empty() && !segment.starts_with('.')), "{:?} (sanitized form of {:?}) has no empty or dot segments", sanitized, key);
        }
    }
}
