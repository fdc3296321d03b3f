//! Group overflow: cap how many done issues each group keeps.
//!
//! The only rule with cross-issue coupling. It needs every done issue in
//! the snapshot before it can decide on any one of them.

use std::collections::BTreeMap;

use crate::model::{IssueRecord, LabelDecision, Rule, TargetLabel};

use super::{Policy, decide};

/// Archive decisions for the oldest done issues of every group over the limit.
///
/// Within a group, issues are ordered by `updated_at` ascending, then by
/// number, repository, and id so ties always break the same way. The
/// first `size - limit` are overflow. A limit of zero archives the whole group.
pub fn resolve(records: &[IssueRecord], policy: &Policy) -> Vec<LabelDecision> {
    let mut groups: BTreeMap<&str, Vec<&IssueRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.status == policy.done_status) {
        groups.entry(record.group.as_str()).or_default().push(record);
    }

    let mut decisions = Vec::new();
    for (group, mut members) in groups {
        if members.len() <= policy.overflow_limit {
            continue;
        }
        members.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then(a.number.cmp(&b.number))
                .then_with(|| a.repository.cmp(&b.repository))
                .then_with(|| a.id.cmp(&b.id))
        });

        let overflow = members.len() - policy.overflow_limit;
        tracing::debug!(group, size = members.len(), overflow, "group over limit");

        let reason = format!(
            "Overflow in '{}' status for group '{group}'",
            policy.done_status
        );
        decisions.extend(
            members
                .into_iter()
                .take(overflow)
                .map(|r| decide(r, TargetLabel::Archive, Rule::Overflow, reason.clone())),
        );
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::evaluate::tests::{DAY, policy, record};
    use crate::model::UNKNOWN;

    fn numbers(decisions: &[LabelDecision]) -> Vec<u64> {
        decisions.iter().map(|d| d.number).collect()
    }

    #[test]
    fn archives_oldest_beyond_limit() {
        // Listed out of order to show the sort, not the input order, decides.
        let records = vec![
            record(3, "Done", "Backend", 7 * DAY),
            record(5, "Done", "Backend", 5 * DAY),
            record(1, "Done", "Backend", 9 * DAY),
            record(4, "Done", "Backend", 6 * DAY),
            record(2, "Done", "Backend", 8 * DAY),
        ];

        let decisions = resolve(&records, &policy(365, 3));

        assert_eq!(numbers(&decisions), vec![1, 2]);
        assert!(decisions.iter().all(|d| d.label == TargetLabel::Archive));
        assert_eq!(
            decisions[0].reason,
            "Overflow in 'Done' status for group 'Backend'"
        );
    }

    #[test]
    fn groups_at_or_under_limit_are_untouched() {
        let records = vec![
            record(1, "Done", "Backend", DAY),
            record(2, "Done", "Backend", 2 * DAY),
            record(3, "Done", "Web", DAY),
        ];

        assert!(resolve(&records, &policy(365, 2)).is_empty());
    }

    #[test]
    fn only_done_issues_count_toward_the_group() {
        let records = vec![
            record(1, "Done", "Backend", 3 * DAY),
            record(2, "In Progress", "Backend", 9 * DAY),
            record(3, "Todo", "Backend", 9 * DAY),
            record(4, "Done", "Backend", DAY),
        ];

        let decisions = resolve(&records, &policy(365, 1));
        assert_eq!(numbers(&decisions), vec![1]);
    }

    #[test]
    fn groups_are_independent() {
        let records = vec![
            record(1, "Done", "Backend", 3 * DAY),
            record(2, "Done", "Backend", DAY),
            record(3, "Done", "Web", 5 * DAY),
            record(4, "Done", "Web", 4 * DAY),
            record(5, "Done", "Web", DAY),
        ];

        let decisions = resolve(&records, &policy(365, 1));

        assert_eq!(numbers(&decisions), vec![1, 3, 4]);
        assert_eq!(
            decisions[2].reason,
            "Overflow in 'Done' status for group 'Web'"
        );
    }

    #[test]
    fn unknown_group_is_a_group_like_any_other() {
        let records = vec![
            record(1, "Done", UNKNOWN, 2 * DAY),
            record(2, "Done", UNKNOWN, DAY),
        ];

        let decisions = resolve(&records, &policy(365, 1));

        assert_eq!(numbers(&decisions), vec![1]);
        assert_eq!(
            decisions[0].reason,
            "Overflow in 'Done' status for group 'Unknown'"
        );
    }

    #[test]
    fn ties_break_by_number() {
        let records = vec![
            record(9, "Done", "Backend", DAY),
            record(4, "Done", "Backend", DAY),
            record(6, "Done", "Backend", DAY),
        ];

        let decisions = resolve(&records, &policy(365, 1));
        assert_eq!(numbers(&decisions), vec![4, 6]);
    }

    #[test]
    fn zero_limit_archives_whole_group() {
        let records = vec![
            record(1, "Done", "Backend", DAY),
            record(2, "Done", "Backend", 2 * DAY),
            record(3, "Done", "Web", DAY),
        ];

        let decisions = resolve(&records, &policy(365, 0));
        assert_eq!(numbers(&decisions), vec![2, 1, 3]);
    }

    proptest! {
        #[test]
        fn overflow_keeps_exactly_the_newest(
            ages in prop::collection::btree_set(0i64..1_000, 0..20),
            limit in 0usize..25,
        ) {
            // Distinct ages; issue number i has the i-th youngest age.
            let ages: Vec<i64> = ages.into_iter().collect();
            let records: Vec<IssueRecord> = ages
                .iter()
                .enumerate()
                .map(|(i, age)| record(i as u64 + 1, "Done", "Backend", age * 60))
                .collect();

            let decisions = resolve(&records, &policy(365, limit));

            let k = records.len();
            prop_assert_eq!(decisions.len(), k.saturating_sub(limit));
            // The archived issues are the oldest: the highest numbers here.
            let mut archived = numbers(&decisions);
            archived.sort_unstable();
            let expected: Vec<u64> = ((k.min(limit) as u64 + 1)..=(k as u64)).collect();
            prop_assert_eq!(archived, expected);
        }
    }
}
