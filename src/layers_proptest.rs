//! Property-based tests for layer naming and identity hashing.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::layers::{hash_layers, split_name, Layer};
    use crate::source::SourceDescriptor;
    use proptest::prelude::*;

    fn layer_strategy() -> impl Strategy<Value = Layer> {
        (
            "[a-z][a-z0-9-]{0,12}",
            proptest::option::of("[a-z][a-z0-9-]{0,8}"),
            proptest::option::of("git://[a-z]{1,8}/[a-z-]{1,12}"),
            proptest::option::of("[a-z0-9.]{1,8}"),
            any::<bool>(),
        )
            .prop_map(|(name, subpath, remote, r#ref, local)| {
                let source = if local {
                    SourceDescriptor::local(&name, None)
                } else {
                    SourceDescriptor::git(remote.as_deref(), r#ref.as_deref())
                };
                Layer::new(name, subpath, Some(source))
            })
    }

    // ============================================================================
    // split_name property tests
    // ============================================================================

    proptest! {
        /// Property: the first segment is the repository and the last the layer
        #[test]
        fn split_name_takes_first_and_last_segment(
            segments in proptest::collection::vec("[a-z0-9-]{1,10}", 1..6)
        ) {
            let input = segments.join("/");
            let names = split_name(&input);
            prop_assert_eq!(&names.repo, &segments[0]);
            prop_assert_eq!(&names.layer, &segments[segments.len() - 1]);
        }

        /// Property: the subpath is exactly the middle segments, or None
        #[test]
        fn split_name_subpath_is_middle(
            segments in proptest::collection::vec("[a-z0-9-]{1,10}", 1..6)
        ) {
            let input = segments.join("/");
            let names = split_name(&input);
            if segments.len() <= 2 {
                prop_assert_eq!(names.subpath, None);
            } else {
                let middle = segments[1..segments.len() - 1].join("/");
                prop_assert_eq!(names.subpath, Some(middle));
            }
        }

        /// Property: repo, subpath and layer rejoin to the input when there are
        /// at least two segments
        #[test]
        fn split_name_rejoins(
            segments in proptest::collection::vec("[a-z0-9-]{1,10}", 2..6)
        ) {
            let input = segments.join("/");
            let names = split_name(&input);
            let rejoined = match names.subpath {
                Some(sub) => format!("{}/{}/{}", names.repo, sub, names.layer),
                None => format!("{}/{}", names.repo, names.layer),
            };
            prop_assert_eq!(rejoined, input);
        }
    }

    // ============================================================================
    // hash property tests
    // ============================================================================

    proptest! {
        /// Property: the hash does not depend on layer order
        #[test]
        fn hash_is_permutation_invariant(
            layers in proptest::collection::vec(layer_strategy(), 0..8)
        ) {
            let forward = hash_layers(&layers);
            let reversed: Vec<Layer> = layers.iter().rev().cloned().collect();
            prop_assert_eq!(forward, hash_layers(&reversed));
        }

        /// Property: the hash is always 16 lowercase hex digits
        #[test]
        fn hash_is_sixteen_hex_digits(
            layers in proptest::collection::vec(layer_strategy(), 0..8)
        ) {
            let hash = hash_layers(&layers);
            prop_assert_eq!(hash.len(), 16);
            prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
