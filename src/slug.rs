//! URL-safe slugs for workspaces and services.

use std::sync::LazyLock;

use regex::Regex;

static NON_ALNUM_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Derive a slug from a display name.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single `-`, then trims leading and trailing separators.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn punctuation_and_case() {
        assert_eq!(slugify("Acme's Cleaning & Co."), "acme-s-cleaning-co");
        assert_eq!(slugify("Acme Services"), "acme-services");
    }

    #[test]
    fn trims_separators() {
        assert_eq!(slugify("  --Deep Cleaning!!  "), "deep-cleaning");
        assert_eq!(slugify("***"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn non_ascii_becomes_separator() {
        assert_eq!(slugify("Café Müller 24/7"), "caf-m-ller-24-7");
    }

    proptest! {
        #[test]
        fn any_name_yields_a_clean_slug(name in any::<String>()) {
            let slug = slugify(&name);
            prop_assert!(
                slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
                "{:?} has characters outside [a-z0-9-]", slug
            );
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn slugs_are_fixed_points(name in "[ -~]{0,48}") {
            let slug = slugify(&name);
            prop_assert_eq!(slugify(&slug), slug);
        }
    }
}
