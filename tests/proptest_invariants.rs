//! Property tests for path sanitization and PRNG determinism — the two
//! surfaces small enough to state as universally-quantified properties
//! rather than fixed worked scenarios.

use ocpkg::path::validate_relative_path;
use ocpkg::prng::DeterministicPrng;
use proptest::prelude::*;

fn path_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.]{0,12}"
}

proptest! {
    /// Any path built from segments none of which is exactly `".."`, joined
    /// by `/`, is accepted.
    #[test]
    fn paths_without_dotdot_segments_are_always_accepted(
        segments in prop::collection::vec(path_segment().prop_filter("not dotdot", |s| s != ".."), 1..6)
    ) {
        let path = segments.join("/");
        prop_assert!(validate_relative_path(&path, false).is_ok());
    }

    /// Inserting a literal `".."` segment anywhere in an otherwise-clean
    /// path is always rejected for filesystem items, regardless of what
    /// surrounds it.
    #[test]
    fn inserting_a_dotdot_segment_is_always_rejected(
        before in prop::collection::vec(path_segment().prop_filter("not dotdot", |s| s != ".."), 0..4),
        after in prop::collection::vec(path_segment().prop_filter("not dotdot", |s| s != ".."), 0..4),
    ) {
        let mut segments = before;
        segments.push("..".to_string());
        segments.extend(after);
        let path = segments.join("/");
        prop_assert!(validate_relative_path(&path, false).is_err());
    }

    /// The same restriction, lifted for non-filesystem items: any path is
    /// accepted once `allow_non_filesystem` is set.
    #[test]
    fn dotdot_is_allowed_when_the_item_is_not_filesystem_facing(
        before in prop::collection::vec(path_segment(), 0..4),
        after in prop::collection::vec(path_segment(), 0..4),
    ) {
        let mut segments = before;
        segments.push("..".to_string());
        segments.extend(after);
        let path = segments.join("/");
        prop_assert!(validate_relative_path(&path, true).is_ok());
    }

    /// Two `DeterministicPrng` instances built from the same seed produce
    /// the same `next_below`/`next_in_range` sequence, for any seed and any
    /// sequence of bounds — this is what lets writer and reader derive the
    /// same interleaving schedule independently.
    #[test]
    fn same_seed_yields_same_sequence_for_any_bounds(
        seed in prop::collection::vec(any::<u8>(), 1..64),
        bounds in prop::collection::vec(1u32..=4096, 1..32),
    ) {
        let mut a = DeterministicPrng::new(&seed);
        let mut b = DeterministicPrng::new(&seed);
        for &bound in &bounds {
            prop_assert_eq!(a.next_below(bound), b.next_below(bound));
        }
    }

    /// `next_in_range(min, max_exclusive)` always stays within bounds,
    /// regardless of seed or requested range.
    #[test]
    fn next_in_range_always_stays_within_requested_bounds(
        seed in prop::collection::vec(any::<u8>(), 1..64),
        min in 0u32..1000,
        span in 1u32..1000,
    ) {
        let mut prng = DeterministicPrng::new(&seed);
        let max_exclusive = min + span;
        let v = prng.next_in_range(min, max_exclusive);
        prop_assert!(v >= min && v < max_exclusive);
    }
}
