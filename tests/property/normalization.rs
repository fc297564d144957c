//! Property tests for taxonomy normalization.
//!
//! 1. `Category::coerce` and `DurationEstimate::normalize` are total: any
//!    input yields a taxonomy member and never panics.
//! 2. Canonical names survive case and whitespace noise.
//! 3. Change-feed decoding never panics on arbitrary input.

use proptest::prelude::*;
use tasklist_proto::{Category, ChangePayload, DurationEstimate};

fn arb_category() -> impl Strategy<Value = Category> {
    prop::sample::select(Category::ALL.to_vec())
}

fn arb_duration() -> impl Strategy<Value = DurationEstimate> {
    prop::sample::select(DurationEstimate::ALL.to_vec())
}

/// Upper-cases a random subset of characters.
fn scramble_case(raw: &str, mask: &[bool]) -> String {
    raw.chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| {
            if *upper {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn coerce_is_total(raw in ".{0,64}") {
        let category = Category::coerce(&raw);
        prop_assert!(Category::ALL.contains(&category));
    }

    #[test]
    fn normalize_is_total(raw in ".{0,64}") {
        let duration = DurationEstimate::normalize(&raw);
        prop_assert!(DurationEstimate::ALL.contains(&duration));
    }

    #[test]
    fn normalize_handles_number_unit_phrases(
        amount in 0u32..200,
        unit in prop::sample::select(vec!["min", "minutes", "h", "hours", "day", "days", "week", "weeks"]),
        prefix in prop::sample::select(vec!["", "about ", "roughly ", "maybe "]),
    ) {
        let raw = format!("{prefix}{amount} {unit}");
        let duration = DurationEstimate::normalize(&raw);
        prop_assert!(DurationEstimate::ALL.contains(&duration));
    }

    #[test]
    fn category_survives_case_and_padding(
        category in arb_category(),
        mask in prop::collection::vec(any::<bool>(), 1..8),
        left in " {0,3}",
        right in "[ \t]{0,3}",
    ) {
        let raw = format!("{left}{}{right}", scramble_case(category.as_str(), &mask));
        prop_assert_eq!(Category::coerce(&raw), category);
    }

    #[test]
    fn duration_survives_case_and_padding(
        duration in arb_duration(),
        mask in prop::collection::vec(any::<bool>(), 1..8),
        left in " {0,3}",
    ) {
        let raw = format!("{left}{}", scramble_case(duration.as_str(), &mask));
        prop_assert_eq!(DurationEstimate::normalize(&raw), duration);
    }

    #[test]
    fn decode_never_panics(raw in ".{0,256}") {
        if let Ok(payload) = ChangePayload::decode(&raw) {
            let _ = payload.into_event();
        }
    }
}
