//! Street name normalization.
//!
//! Two configurable token lists drive the rewrite: tokens in the drop list are
//! removed from the name ("улица Ленина" -> "Ленина"), tokens in the reorder
//! list are moved to the end ("переулок Ленина" -> "Ленина переулок"). The
//! first matching drop token wins; the reorder list is consulted only when no
//! drop token matched.

use crate::config::IndexerSettings;

#[derive(Debug, Clone)]
pub struct StreetNameNormalizer {
    enabled: bool,
    drop: Vec<String>,
    reorder: Vec<String>,
}

impl StreetNameNormalizer {
    pub fn new(enabled: bool, drop: Vec<String>, reorder: Vec<String>) -> Self {
        Self {
            enabled,
            drop,
            reorder,
        }
    }

    pub fn from_settings(settings: &IndexerSettings) -> Self {
        Self::new(
            settings.normalize_streets,
            settings.drop_suffixes.clone(),
            settings.reorder_suffixes.clone(),
        )
    }

    pub fn normalize(&self, name: &str) -> String {
        let name = name.trim();
        if !self.enabled {
            return name.to_string();
        }

        for token in &self.drop {
            if let Some((start, end)) = find_token(name, token) {
                return cut_token(name, start, end);
            }
        }
        for token in &self.reorder {
            if let Some((start, end)) = find_token(name, token) {
                return move_token_to_end(name, start, end);
            }
        }
        name.to_string()
    }
}

/// Byte range of the first exact occurrence of `token` that is not glued to a
/// preceding letter or digit.
fn find_token(name: &str, token: &str) -> Option<(usize, usize)> {
    if token.is_empty() {
        return None;
    }
    let mut prev: Option<char> = None;
    for (start, c) in name.char_indices() {
        if prev.map_or(true, |p| !p.is_alphanumeric()) {
            if let Some(end) = match_at(name, start, token) {
                return Some((start, end));
            }
        }
        prev = Some(c);
    }
    None
}

fn match_at(name: &str, start: usize, token: &str) -> Option<usize> {
    name[start..]
        .starts_with(token)
        .then(|| start + token.len())
}

/// Remove `name[start..end]` together with one adjacent separator, preferring
/// the one that follows.
fn remove_with_separator(name: &str, start: usize, end: usize) -> String {
    let after = name[end..].chars().next();
    if after.is_some_and(char::is_whitespace) {
        let skip = after.map_or(0, char::len_utf8);
        return format!("{}{}", &name[..start], &name[end + skip..]);
    }
    let before = name[..start].chars().next_back();
    if before.is_some_and(char::is_whitespace) {
        let skip = before.map_or(0, char::len_utf8);
        return format!("{}{}", &name[..start - skip], &name[end..]);
    }
    format!("{}{}", &name[..start], &name[end..])
}

fn cut_token(name: &str, start: usize, end: usize) -> String {
    remove_with_separator(name, start, end).trim().to_string()
}

fn move_token_to_end(name: &str, start: usize, end: usize) -> String {
    if end == name.len() {
        return name.to_string();
    }
    let token = &name[start..end];
    let rest = remove_with_separator(name, start, end);
    format!("{} {}", rest.trim(), token).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> StreetNameNormalizer {
        StreetNameNormalizer::from_settings(&IndexerSettings::default())
    }

    #[test]
    fn test_drop_leading_token() {
        assert_eq!(normalizer().normalize("улица Ленина"), "Ленина");
        assert_eq!(normalizer().normalize("Ленина улица"), "Ленина");
        assert_eq!(normalizer().normalize("  ул. Мира "), "Мира");
    }

    #[test]
    fn test_tokens_match_case_sensitively() {
        assert_eq!(normalizer().normalize("Улица Ленина"), "Улица Ленина");
        assert_eq!(normalizer().normalize("Переулок Ленина"), "Переулок Ленина");
        let n = StreetNameNormalizer::new(true, vec!["улица".into()], vec![]);
        assert_eq!(n.normalize("Улица Ленина"), "Улица Ленина");
    }

    #[test]
    fn test_normalizing_twice_changes_nothing() {
        let n = normalizer();
        for name in [
            "улица Ленина",
            "Ленина улица",
            "ул. Мира",
            "переулок Ленина",
            "Малый переулок Ленина",
            "Ленина переулок",
            "набережная Фонтанки",
            "Main Street",
        ] {
            let once = n.normalize(name);
            assert_eq!(n.normalize(&once), once, "input {:?}", name);
        }
    }

    #[test]
    fn test_reorder_moves_token_to_end() {
        assert_eq!(normalizer().normalize("переулок Ленина"), "Ленина переулок");
        assert_eq!(
            normalizer().normalize("Малый переулок Ленина"),
            "Малый Ленина переулок"
        );
    }

    #[test]
    fn test_reorder_token_already_at_end() {
        assert_eq!(normalizer().normalize("Ленина переулок"), "Ленина переулок");
    }

    #[test]
    fn test_token_glued_to_word_is_ignored() {
        // "Моулица" contains "улица" right after a letter
        assert_eq!(normalizer().normalize("Моулица"), "Моулица");
    }

    #[test]
    fn test_drop_wins_over_reorder() {
        assert_eq!(normalizer().normalize("улица переулок Ленина"), "переулок Ленина");
    }

    #[test]
    fn test_no_token_leaves_name() {
        assert_eq!(normalizer().normalize("Main Street"), "Main Street");
    }

    #[test]
    fn test_disabled_only_trims() {
        let n = StreetNameNormalizer::new(false, vec!["улица".into()], vec![]);
        assert_eq!(n.normalize(" улица Ленина "), "улица Ленина");
    }
}
