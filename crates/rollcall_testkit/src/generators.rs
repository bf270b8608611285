//! Property-based test generators using proptest.

use proptest::prelude::*;
use rollcall_core::PartitionConfig;

/// Strategy for student-like names: one or two capitalised words.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{0,11}( [A-Z][a-z]{0,11})?").expect("Invalid regex")
}

/// Strategy for names in either case, possibly padded with whitespace.
pub fn messy_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ \t]{0,3}[A-Za-z][A-Za-z ]{0,15}[ \t]{0,3}").expect("Invalid regex")
}

/// Strategy for arbitrary input that is not blank.
pub fn non_blank_strategy() -> impl Strategy<Value = String> {
    any::<String>().prop_filter("must not be blank", |s| !s.trim().is_empty())
}

/// Strategy for a list of distinct student names.
pub fn distinct_names_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set(name_strategy(), 1..=max).prop_map(|set| set.into_iter().collect())
}

/// Strategy for a two-partition layout split at a random letter.
///
/// The first partition covers `A..=split`, the second the rest of the
/// alphabet.
pub fn split_layout_strategy() -> impl Strategy<Value = (char, Vec<PartitionConfig>)> {
    (b'A'..b'Z').prop_map(|split| {
        let split = char::from(split);
        let next = char::from(split as u8 + 1);
        (
            split,
            vec![
                PartitionConfig::in_memory("low", 'A', split),
                PartitionConfig::in_memory("high", next, 'Z'),
            ],
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn names_start_uppercase(name in name_strategy()) {
            prop_assert!(name.chars().next().is_some_and(|c| c.is_ascii_uppercase()));
        }

        #[test]
        fn messy_names_are_not_blank(name in messy_name_strategy()) {
            prop_assert!(!name.trim().is_empty());
        }

        #[test]
        fn split_layout_is_disjoint((split, layout) in split_layout_strategy()) {
            prop_assert_eq!(layout[0].range_end, split);
            prop_assert!(layout[0].range_end < layout[1].range_start);
            prop_assert_eq!(layout[1].range_end, 'Z');
        }
    }
}
