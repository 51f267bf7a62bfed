//! Display-name parsing for the participant name allocator.
//!
//! Pure functions only. The allocator in `meethub-coordination` keys the
//! store with the lower-cased form of a name (case-insensitive collision
//! domain) while preserving the originally-supplied casing for display.

use std::collections::HashSet;

/// Lower-cased form of a name, used for all store keys.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// Split a requested name into its base and an optional trailing numeric
/// suffix.
///
/// Exactly one trailing `_<digits>` group is stripped, so a taken `"Bob_1"`
/// retries as `"Bob_2"` and never grows into `"Bob_1_1"`.
///
/// A name is only treated as suffixed when the base is non-empty, the digit
/// group is non-empty, and the digits fit in a `u32` -- otherwise the whole
/// name is the base.
///
/// # Examples
///
/// ```
/// use meethub_core::naming::split_base_suffix;
///
/// assert_eq!(split_base_suffix("Bob"), ("Bob", None));
/// assert_eq!(split_base_suffix("Bob_1"), ("Bob", Some(1)));
/// assert_eq!(split_base_suffix("Bob_1_2"), ("Bob_1", Some(2)));
/// assert_eq!(split_base_suffix("_7"), ("_7", None));
/// ```
pub fn split_base_suffix(name: &str) -> (&str, Option<u32>) {
    let Some((base, digits)) = name.rsplit_once('_') else {
        return (name, None);
    };
    if base.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (name, None);
    }
    match digits.parse::<u32>() {
        Ok(n) => (base, Some(n)),
        Err(_) => (name, None),
    }
}

/// Append a numeric suffix to a base name.
pub fn with_suffix(base: &str, n: u32) -> String {
    format!("{base}_{n}")
}

/// Smallest positive integer not present in `taken`.
///
/// Used when the number pool is empty and candidates must be derived from
/// the reservations currently visible in the store.
pub fn smallest_missing(taken: &HashSet<u32>) -> u32 {
    let mut candidate = 1;
    while taken.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- split_base_suffix ----------------------------------------------------

    #[test]
    fn plain_name_has_no_suffix() {
        assert_eq!(split_base_suffix("Alice"), ("Alice", None));
    }

    #[test]
    fn single_suffix_is_stripped() {
        assert_eq!(split_base_suffix("Alice_3"), ("Alice", Some(3)));
    }

    #[test]
    fn only_last_suffix_is_stripped() {
        assert_eq!(split_base_suffix("Bob_1_1"), ("Bob_1", Some(1)));
    }

    #[test]
    fn trailing_underscore_is_not_a_suffix() {
        assert_eq!(split_base_suffix("Bob_"), ("Bob_", None));
    }

    #[test]
    fn leading_underscore_digits_is_not_a_suffix() {
        assert_eq!(split_base_suffix("_42"), ("_42", None));
    }

    #[test]
    fn non_numeric_tail_is_not_a_suffix() {
        assert_eq!(split_base_suffix("Bob_x1"), ("Bob_x1", None));
    }

    #[test]
    fn oversized_digits_are_kept_in_the_base() {
        assert_eq!(
            split_base_suffix("Bob_99999999999999"),
            ("Bob_99999999999999", None)
        );
    }

    #[test]
    fn zero_suffix_parses() {
        assert_eq!(split_base_suffix("Bob_0"), ("Bob", Some(0)));
    }

    // -- normalize ------------------------------------------------------------

    #[test]
    fn normalize_lowercases() {
        assert_eq!(normalize("AlIcE"), "alice");
    }

    #[test]
    fn normalize_handles_non_ascii() {
        assert_eq!(normalize("ÉLODIE"), "élodie");
    }

    // -- smallest_missing -----------------------------------------------------

    #[test]
    fn empty_set_yields_one() {
        assert_eq!(smallest_missing(&HashSet::new()), 1);
    }

    #[test]
    fn first_gap_is_found() {
        let taken: HashSet<u32> = [1, 2, 4, 5].into_iter().collect();
        assert_eq!(smallest_missing(&taken), 3);
    }

    #[test]
    fn dense_set_yields_next() {
        let taken: HashSet<u32> = [1, 2, 3].into_iter().collect();
        assert_eq!(smallest_missing(&taken), 4);
    }

    #[test]
    fn zero_in_set_is_ignored() {
        let taken: HashSet<u32> = [0].into_iter().collect();
        assert_eq!(smallest_missing(&taken), 1);
    }

    // -- with_suffix ----------------------------------------------------------

    #[test]
    fn suffix_round_trips_through_split() {
        let name = with_suffix("Carol", 7);
        assert_eq!(name, "Carol_7");
        assert_eq!(split_base_suffix(&name), ("Carol", Some(7)));
    }
}
