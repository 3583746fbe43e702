//! Area aliases
//!
//! Callers name neighbourhoods by landmarks and short forms. Aliases map
//! those onto the area names stored on listings.

use once_cell::sync::Lazy;

/// `(alias, canonical area)`, longest aliases first so "gulshan e iqbal"
/// wins over "gulshan"
static AREA_ALIASES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    let mut aliases = vec![
        ("sea view", "Clifton"),
        ("seaview", "Clifton"),
        ("clifton", "Clifton"),
        ("do darya", "Defence"),
        ("dha", "Defence"),
        ("defence", "Defence"),
        ("gulshan e iqbal", "Gulshan-e-Iqbal"),
        ("gulshan-e-iqbal", "Gulshan-e-Iqbal"),
        ("gulshan", "Gulshan-e-Iqbal"),
        ("pechs", "PECHS"),
        ("bahadurabad", "Bahadurabad"),
    ];
    aliases.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));
    aliases
});

/// Canonical area for a location filter; unknown input passes through trimmed
pub fn resolve_area(location: &str) -> String {
    let needle = location.trim().to_lowercase();
    AREA_ALIASES
        .iter()
        .find(|(alias, _)| *alias == needle)
        .map(|(_, area)| area.to_string())
        .unwrap_or_else(|| location.trim().to_string())
}

/// First area mentioned anywhere in free text
pub fn find_area(text: &str) -> Option<&'static str> {
    let haystack = text.to_lowercase();
    AREA_ALIASES
        .iter()
        .find(|(alias, _)| contains_phrase(&haystack, alias))
        .map(|(_, area)| *area)
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + phrase.len()..].chars().next();
        !before.map_or(false, char::is_alphanumeric) && !after.map_or(false, char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_alias() {
        assert_eq!(resolve_area("Sea View"), "Clifton");
        assert_eq!(resolve_area(" gulshan "), "Gulshan-e-Iqbal");
        assert_eq!(resolve_area("Karachi"), "Karachi");
    }

    #[test]
    fn test_find_in_text() {
        assert_eq!(find_area("something near the sea view please"), Some("Clifton"));
        assert_eq!(find_area("in gulshan e iqbal"), Some("Gulshan-e-Iqbal"));
        assert_eq!(find_area("two bedroom under 120000"), None);
        // whole words only
        assert_eq!(find_area("shadhan"), None);
    }
}
