//! URL slugs for post titles.

/// Used when a title has no ASCII letters or digits at all.
pub const FALLBACK_SLUG: &str = "post";

/// Lowercases the title and collapses every run of non-alphanumeric
/// characters into a single `-`, trimming separators at both ends.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_joins_words() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Goodbye World"), "goodbye-world");
    }

    #[test]
    fn collapses_runs_and_trims_edges() {
        assert_eq!(slugify("  Rust -- is *great*!!  "), "rust-is-great");
        assert_eq!(slugify("C++ vs. Rust: 2019 edition"), "c-vs-rust-2019-edition");
    }

    #[test]
    fn non_ascii_is_a_separator() {
        assert_eq!(slugify("café au lait"), "caf-au-lait");
    }

    #[test]
    fn symbol_only_title_falls_back() {
        assert_eq!(slugify("?!?"), FALLBACK_SLUG);
    }
}
