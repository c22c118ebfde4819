//! Property-based tests for path helpers.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{cache_file_for, dir_for_cache_file, normalize_dir};
    use proptest::prelude::*;
    use std::path::Path;

    proptest! {
        /// Property: a normalised directory maps to a cache file and back.
        #[test]
        fn cache_file_roundtrips(dir in "(/[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,8}){1,4}/") {
            let cache = Path::new("/var/cache/dsjanitor");
            let file = cache_file_for(cache, &dir);
            prop_assert_eq!(dir_for_cache_file(cache, &file), Some(dir));
        }

        /// Property: normalisation is idempotent
        #[test]
        fn normalize_dir_is_idempotent(raw in "[a-zA-Z0-9_/\\\\]{1,20}") {
            if let Some(once) = normalize_dir(&raw) {
                prop_assert_eq!(normalize_dir(&once), Some(once.clone()));
                prop_assert!(once.starts_with('/') && once.ends_with('/'));
                prop_assert!(!once.contains('\\'));
            }
        }

        /// Property: distinct directories never share a cache file
        #[test]
        fn cache_file_is_injective(
            a in "(/[a-z0-9]{1,6}){1,3}/",
            b in "(/[a-z0-9]{1,6}){1,3}/",
        ) {
            let cache = Path::new("/c");
            if a != b {
                prop_assert_ne!(cache_file_for(cache, &a), cache_file_for(cache, &b));
            }
        }
    }
}
