//! CohortSampler: stratified subject selection
//!
//! Subjects are grouped by their finding profile (the sorted, pipe-joined set
//! of distinct finding codes across all of their images). Each group receives
//! a proportional quota of at least one, so rare multi-finding combinations
//! stay represented. The combined selection is then trimmed or backfilled to
//! the target size. All randomness comes from a single ChaCha stream seeded
//! once, so a fixed seed and population order reproduce the same cohort.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Profile key of a finding set: sorted, distinct codes joined by `|`
pub fn profile_key<'a>(findings: impl IntoIterator<Item = &'a str>) -> String {
    let codes: BTreeSet<&str> = findings.into_iter().collect();
    codes.into_iter().collect::<Vec<_>>().join("|")
}

/// Subjects sharing one finding profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileGroup {
    pub key: String,
    /// Subject ids in population order
    pub subjects: Vec<i64>,
}

/// Result of one selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionOutcome {
    pub selected: BTreeSet<i64>,
    /// Number of distinct finding profiles in the eligible population
    pub profiles: usize,
    /// Number of eligible subjects
    pub eligible: usize,
    pub target: usize,
    /// True when fewer subjects were eligible than requested
    pub shortfall: bool,
}

/// Stratified sampler over (subject, finding set) pairs
#[derive(Debug, Clone, Copy)]
pub struct CohortSampler {
    target_count: usize,
    seed: u64,
}

impl CohortSampler {
    pub fn new(target_count: usize, seed: u64) -> Self {
        Self { target_count, seed }
    }

    /// Group subjects by profile key
    ///
    /// Groups are ordered by size descending, then key ascending. A subject
    /// listed more than once has its finding sets merged.
    pub fn group_profiles(population: &[(i64, BTreeSet<String>)]) -> Vec<ProfileGroup> {
        let mut order: Vec<i64> = Vec::new();
        let mut merged: BTreeMap<i64, BTreeSet<&str>> = BTreeMap::new();
        for (subject_id, findings) in population {
            let entry = merged.entry(*subject_id).or_insert_with(|| {
                order.push(*subject_id);
                BTreeSet::new()
            });
            entry.extend(findings.iter().map(String::as_str));
        }

        let mut by_key: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for subject_id in order {
            let key = profile_key(merged[&subject_id].iter().copied());
            by_key.entry(key).or_default().push(subject_id);
        }

        let mut groups: Vec<ProfileGroup> = by_key
            .into_iter()
            .map(|(key, subjects)| ProfileGroup { key, subjects })
            .collect();
        groups.sort_by(|a, b| {
            b.subjects
                .len()
                .cmp(&a.subjects.len())
                .then_with(|| a.key.cmp(&b.key))
        });
        groups
    }

    /// Select up to `target_count` subjects
    ///
    /// The result size is `min(target_count, eligible)`. An eligible
    /// population smaller than the target is reported through `shortfall`,
    /// not as an error.
    pub fn select(&self, population: &[(i64, BTreeSet<String>)]) -> SelectionOutcome {
        let groups = Self::group_profiles(population);
        let eligible: usize = groups.iter().map(|g| g.subjects.len()).sum();
        let target = self.target_count;

        let mut outcome = SelectionOutcome {
            selected: BTreeSet::new(),
            profiles: groups.len(),
            eligible,
            target,
            shortfall: eligible < target,
        };

        if outcome.shortfall {
            warn!(
                eligible,
                target,
                "Eligible population smaller than target; selecting every eligible subject"
            );
        }
        if eligible == 0 || target == 0 {
            return outcome;
        }

        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);

        // Per-group quotas; the first pick of each group is its representative
        let mut representatives: Vec<i64> = Vec::with_capacity(groups.len());
        let mut extras: Vec<i64> = Vec::new();
        for group in &groups {
            let quota = group_quota(target, group.subjects.len(), eligible);
            let picked: Vec<i64> = group
                .subjects
                .choose_multiple(&mut rng, quota)
                .copied()
                .collect();
            debug!(
                profile = group.key.as_str(),
                size = group.subjects.len(),
                quota,
                "Sampled profile group"
            );
            if let Some((first, rest)) = picked.split_first() {
                representatives.push(*first);
                extras.extend_from_slice(rest);
            }
        }

        let quota_total = representatives.len() + extras.len();
        let mut selected: Vec<i64> = if quota_total > target {
            downsample(&mut rng, representatives, extras, target)
        } else {
            representatives.into_iter().chain(extras).collect()
        };

        if selected.len() < target {
            let taken: HashSet<i64> = selected.iter().copied().collect();
            let remaining: Vec<i64> = groups
                .iter()
                .flat_map(|g| g.subjects.iter().copied())
                .filter(|id| !taken.contains(id))
                .collect();
            let needed = target - selected.len();
            let fill = remaining.choose_multiple(&mut rng, needed).copied();
            selected.extend(fill);
        }

        outcome.selected = selected.into_iter().collect();
        info!(
            selected = outcome.selected.len(),
            quota_total,
            profiles = outcome.profiles,
            eligible,
            "Cohort selection complete"
        );
        outcome
    }
}

/// `max(1, round(target * share))`, capped at the group size
fn group_quota(target: usize, group_size: usize, eligible: usize) -> usize {
    let share = group_size as f64 / eligible as f64;
    let quota = (target as f64 * share).round() as usize;
    quota.max(1).min(group_size)
}

/// Trim an oversized selection to exactly `target`
///
/// When every group can keep one subject, representatives are retained and
/// only extras are dropped at random. Otherwise the whole selection is
/// sampled uniformly.
fn downsample(
    rng: &mut ChaCha20Rng,
    representatives: Vec<i64>,
    extras: Vec<i64>,
    target: usize,
) -> Vec<i64> {
    if representatives.len() <= target {
        let keep = target - representatives.len();
        let mut selected = representatives;
        selected.extend(extras.choose_multiple(rng, keep).copied());
        selected
    } else {
        let all: Vec<i64> = representatives.into_iter().chain(extras).collect();
        all.choose_multiple(rng, target).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn findings(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    /// `(profile, size)` pairs; a profile lists its codes separated by `|`
    fn population(groups: &[(&str, usize)]) -> Vec<(i64, BTreeSet<String>)> {
        let mut next_id = 1;
        let mut subjects = Vec::new();
        for (profile, size) in groups {
            let codes: Vec<&str> = profile.split('|').collect();
            for _ in 0..*size {
                subjects.push((next_id, findings(&codes)));
                next_id += 1;
            }
        }
        subjects
    }

    #[test]
    fn test_profile_key_sorts_and_dedupes() {
        assert_eq!(profile_key(["Mass", "Edema", "Mass"]), "Edema|Mass");
        assert_eq!(profile_key(["Mass", "Mass"]), "Mass");
        assert_eq!(profile_key(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_rare_profile_is_represented() {
        let pop = population(&[("No Finding", 90), ("Hernia", 10)]);
        let outcome = CohortSampler::new(20, 42).select(&pop);

        assert_eq!(outcome.selected.len(), 20);
        assert!(outcome.selected.iter().any(|id| *id > 90));
        assert_eq!(outcome.profiles, 2);
        assert!(!outcome.shortfall);
    }

    #[test]
    fn test_same_seed_same_cohort() {
        let pop = population(&[("No Finding", 60), ("Mass", 25), ("Edema|Mass", 15)]);
        let first = CohortSampler::new(30, 7).select(&pop);
        let second = CohortSampler::new(30, 7).select(&pop);
        assert_eq!(first.selected, second.selected);
    }

    #[test]
    fn test_shortfall_returns_everyone() {
        let pop = population(&[("Mass", 3), ("Edema", 2)]);
        let outcome = CohortSampler::new(10, 1).select(&pop);
        assert_eq!(outcome.selected.len(), 5);
        assert!(outcome.shortfall);
        assert_eq!(outcome.eligible, 5);
    }

    #[test]
    fn test_empty_population_is_not_an_error() {
        let outcome = CohortSampler::new(500, 42).select(&[]);
        assert!(outcome.selected.is_empty());
        assert_eq!(outcome.profiles, 0);
        assert!(outcome.shortfall);
    }

    #[test]
    fn test_many_rare_groups_trimmed_to_target_keep_every_group() {
        // 12 singleton groups plus one large group; quotas overshoot the target
        let mut groups: Vec<(&str, usize)> = vec![("No Finding", 88)];
        let codes = [
            "Atelectasis",
            "Cardiomegaly",
            "Consolidation",
            "Edema",
            "Effusion",
            "Emphysema",
            "Fibrosis",
            "Hernia",
            "Infiltration",
            "Mass",
            "Nodule",
            "Pneumonia",
        ];
        groups.extend(codes.iter().map(|code| (*code, 1)));
        let pop = population(&groups);

        let outcome = CohortSampler::new(20, 3).select(&pop);
        assert_eq!(outcome.selected.len(), 20);
        for id in 89..=100 {
            assert!(
                outcome.selected.contains(&id),
                "singleton subject {} dropped",
                id
            );
        }
    }

    #[test]
    fn test_duplicate_subject_entries_are_merged() {
        let pop = vec![
            (1, findings(&["Mass"])),
            (1, findings(&["Edema"])),
            (2, findings(&["Mass"])),
        ];
        let groups = CohortSampler::group_profiles(&pop);
        let keys: Vec<_> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Edema|Mass", "Mass"]);
    }

    #[test]
    fn test_groups_ordered_by_size_then_key() {
        let pop = population(&[("Mass", 2), ("Edema", 2), ("No Finding", 5)]);
        let keys: Vec<_> = CohortSampler::group_profiles(&pop)
            .into_iter()
            .map(|g| g.key)
            .collect();
        assert_eq!(keys, vec!["No Finding", "Edema", "Mass"]);
    }

    #[test]
    fn test_more_groups_than_target_samples_uniformly() {
        let names: Vec<String> = (0..30).map(|n| format!("Finding{:02}", n)).collect();
        let groups: Vec<(&str, usize)> = names.iter().map(|name| (name.as_str(), 1)).collect();
        let pop = population(&groups);

        let first = CohortSampler::new(10, 11).select(&pop);
        assert_eq!(first.profiles, 30);
        assert_eq!(first.selected.len(), 10);
        assert!(first.selected.iter().all(|id| (1..=30).contains(id)));

        let again = CohortSampler::new(10, 11).select(&pop);
        assert_eq!(first.selected, again.selected);
    }

    #[test]
    fn test_selection_size_is_min_of_target_and_eligible() {
        let shapes: [&[(&str, usize)]; 4] = [
            &[("No Finding", 90), ("Hernia", 10)],
            &[("No Finding", 40), ("Mass", 7), ("Edema|Mass", 2), ("Hernia", 1)],
            &[("Mass", 1), ("Edema", 1), ("Nodule", 1)],
            &[("No Finding", 5), ("Mass", 5), ("Edema", 5), ("Effusion", 5)],
        ];

        for groups in shapes {
            let pop = population(groups);
            let eligible = pop.len();
            for target in [1, 2, 3, 5, 10, 19, 20, 50, 150] {
                for seed in [0, 1, 42] {
                    let outcome = CohortSampler::new(target, seed).select(&pop);
                    assert_eq!(
                        outcome.selected.len(),
                        target.min(eligible),
                        "target {} seed {} groups {:?}",
                        target,
                        seed,
                        groups
                    );
                    let in_range = |id: &i64| *id >= 1 && *id <= eligible as i64;
                    assert!(outcome.selected.iter().all(in_range));
                    assert_eq!(outcome.shortfall, eligible < target);
                }
            }
        }
    }
}
