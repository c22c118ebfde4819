//! Property-based tests for dataset merging, filter composition and grouping.

#[cfg(test)]
mod proptest_tests {
    use crate::cancel::CancellationToken;
    use crate::dataset::Dataset;
    use crate::filter::FilterPipeline;
    use crate::group::collect_groups;
    use chrono::{NaiveDate, NaiveDateTime};
    use proptest::prelude::*;

    fn day(offset: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(offset as i64)
    }

    /// One record of dataset "alpha": (location, invocation, size, last-used day).
    fn fragment() -> impl Strategy<Value = Dataset> {
        (
            "/[a-c]{1,2}/",
            prop::sample::select(vec!["", ".p0", ".p1"]),
            0u64..1_000_000,
            0u32..100,
        )
            .prop_map(|(location, invocation, size, used)| {
                Dataset::new("alpha", ".ds")
                    .with_location(location, invocation, size)
                    .with_last_used(day(used))
            })
    }

    fn merged(parts: &[&Dataset]) -> Dataset {
        let mut base = parts[0].clone();
        for part in &parts[1..] {
            base.merge(part);
        }
        base
    }

    /// Arbitrary datasets with distinct names.
    fn collection() -> impl Strategy<Value = Vec<Dataset>> {
        prop::collection::vec((any::<bool>(), 0u32..60, 1u64..100), 0..20).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (orphan, used, size))| {
                    let dataset = Dataset::new(format!("ds{}", i), ".ds")
                        .with_location("/data/", ".p0", size)
                        .with_last_used(day(used));
                    if orphan {
                        dataset
                    } else {
                        dataset.with_descriptor("/desc/", 1)
                    }
                })
                .collect()
        })
    }

    proptest! {
        /// Property: merge order does not change locations, sizes or last use
        #[test]
        fn merge_is_order_independent(a in fragment(), b in fragment(), c in fragment()) {
            let abc = merged(&[&a, &b, &c]);
            let cba = merged(&[&c, &b, &a]);
            let bac = merged(&[&b, &a, &c]);

            prop_assert_eq!(abc.location_invocations(), cba.location_invocations());
            prop_assert_eq!(abc.location_invocations(), bac.location_invocations());
            prop_assert_eq!(abc.last_used(), cba.last_used());
            prop_assert_eq!(abc.last_used(), bac.last_used());
            prop_assert_eq!(abc.size(), cba.size());
        }

        /// Property: merging a record into itself changes nothing
        #[test]
        fn merge_is_idempotent(a in fragment(), b in fragment()) {
            let once = merged(&[&a, &b]);
            let twice = merged(&[&a, &b, &a, &b]);
            prop_assert_eq!(once.location_invocations(), twice.location_invocations());
            prop_assert_eq!(once.size(), twice.size());
        }

        /// Property: expired(30) and orphans(true) commute
        #[test]
        fn filter_stages_commute(datasets in collection()) {
            let now = day(90);
            let first: Vec<&str> = FilterPipeline::new(datasets.iter().collect(), now)
                .expired(30)
                .orphans(true)
                .collect()
                .into_iter()
                .map(|d| d.name())
                .collect();
            let second: Vec<&str> = FilterPipeline::new(datasets.iter().collect(), now)
                .orphans(true)
                .expired(30)
                .collect()
                .into_iter()
                .map(|d| d.name())
                .collect();
            prop_assert_eq!(first, second);
        }

        /// Property: a group's size is the sum of its members, in any order
        #[test]
        fn group_size_is_member_sum(
            sizes in prop::collection::vec(1u64..1_000_000, 1..10),
            reversed in any::<bool>(),
        ) {
            let datasets: Vec<Dataset> = sizes
                .iter()
                .enumerate()
                .map(|(i, size)| {
                    Dataset::new(format!("feed_2024-02-{:02}", i + 1), ".ds")
                        .with_location("/data/", ".p0", *size)
                })
                .collect();
            let mut refs: Vec<&Dataset> = datasets.iter().collect();
            if reversed {
                refs.reverse();
            }
            let groups = collect_groups(&refs, &CancellationToken::new()).unwrap();

            prop_assert_eq!(groups.len(), 1);
            prop_assert_eq!(groups[0].size(), sizes.iter().sum::<u64>());
            prop_assert_eq!(groups[0].members().len(), sizes.len());
        }
    }
}
