//! Train/dev/test split assignment.
//!
//! Two mutually exclusive test strategies: explicit hold-out provinces/years,
//! or a seeded random pool. Every randomized draw orders candidates by a
//! blake3 key derived from the run seed, a per-draw salt, and the candidate
//! identity, then takes a prefix — deterministic for a given seed no matter
//! how the upstream loading was parallelized.

use serde::Serialize;

use crate::candidate::{Candidate, sort_canonical};
use crate::config::SplitConfig;

/// Dataset split for a retained candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    /// All splits, in artifact order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Dev, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev => "dev",
            Split::Test => "test",
        }
    }
}

/// Split assignment parameters.
#[derive(Debug, Clone)]
pub struct SplitOptions<'a> {
    /// Regions held out as test.
    pub test_provinces: &'a [String],
    /// Years held out as test.
    pub test_years: &'a [i32],
    /// Remove explicit matches entirely instead of assigning them to test.
    pub exclude: bool,
    /// Test fraction for the random pool strategy.
    pub test_pool_frac: f64,
    /// Dev fraction drawn from the non-test pool.
    pub dev_frac_of_train: f64,
    /// Fraction of the train set kept after splitting.
    pub train_fraction_keep: f64,
    /// Seed for every draw.
    pub seed: &'a str,
}

impl<'a> SplitOptions<'a> {
    /// Borrow the parameters out of the config section.
    pub fn from_config(config: &'a SplitConfig) -> Self {
        Self {
            test_provinces: &config.test_provinces,
            test_years: &config.test_years,
            exclude: config.exclude,
            test_pool_frac: config.test_pool_frac,
            dev_frac_of_train: config.dev_frac_of_train,
            train_fraction_keep: config.train_fraction_keep,
            seed: &config.seed,
        }
    }

    fn explicit(&self) -> bool {
        !self.test_provinces.is_empty() || !self.test_years.is_empty()
    }

    fn matches_holdout(&self, candidate: &Candidate) -> bool {
        self.test_provinces
            .iter()
            .any(|region| region == &candidate.region)
            || self.test_years.contains(&candidate.year)
    }
}

/// Audit trail of a split pass.
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    /// Strategy used: `explicit`, `explicit-exclude`, or `pooled`.
    pub strategy: &'static str,
    /// Candidates removed by the exclude toggle.
    pub excluded: usize,
    /// Train candidates dropped by `train_fraction_keep`.
    pub train_dropped_by_keep: usize,
    /// Final train set size.
    pub train: usize,
    /// Final dev set size.
    pub dev: usize,
    /// Final test set size.
    pub test: usize,
}

fn draw_key(seed: &str, salt: &str, candidate: &Candidate) -> u128 {
    let hash = blake3::hash(
        format!("{seed}|{salt}|{}|{}", candidate.region, candidate.year).as_bytes(),
    );
    u128::from_le_bytes(hash.as_bytes()[0..16].try_into().expect("slice size verified"))
}

/// Draw `count` candidates without replacement by keyed order; both the drawn
/// set and the remainder come back in canonical order.
fn draw(
    pool: Vec<Candidate>,
    seed: &str,
    salt: &str,
    count: usize,
) -> (Vec<Candidate>, Vec<Candidate>) {
    let mut keyed: Vec<(u128, Candidate)> = pool
        .into_iter()
        .map(|candidate| (draw_key(seed, salt, &candidate), candidate))
        .collect();
    keyed.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.sort_key().cmp(&b.1.sort_key()))
    });
    let count = count.min(keyed.len());
    let rest_keyed = keyed.split_off(count);
    let mut drawn: Vec<Candidate> = keyed.into_iter().map(|(_, candidate)| candidate).collect();
    let mut rest: Vec<Candidate> = rest_keyed
        .into_iter()
        .map(|(_, candidate)| candidate)
        .collect();
    sort_canonical(&mut drawn);
    sort_canonical(&mut rest);
    (drawn, rest)
}

fn round_count(frac: f64, len: usize) -> usize {
    ((frac * len as f64).round() as usize).min(len)
}

/// Partition the filtered candidates into train/dev/test.
///
/// Assignments come back in canonical (region, year) order; the three splits
/// partition the (possibly subsampled) pool.
pub fn assign_splits(
    mut candidates: Vec<Candidate>,
    options: &SplitOptions<'_>,
) -> (Vec<(Candidate, Split)>, SplitReport) {
    sort_canonical(&mut candidates);

    let mut excluded = 0usize;
    let strategy;
    let (test, pool) = if options.explicit() {
        let (matches, rest): (Vec<Candidate>, Vec<Candidate>) = candidates
            .into_iter()
            .partition(|candidate| options.matches_holdout(candidate));
        if options.exclude {
            strategy = "explicit-exclude";
            excluded = matches.len();
            (Vec::new(), rest)
        } else {
            strategy = "explicit";
            (matches, rest)
        }
    } else {
        strategy = "pooled";
        let test_count = round_count(options.test_pool_frac, candidates.len());
        draw(candidates, options.seed, "test", test_count)
    };

    let dev_count = round_count(options.dev_frac_of_train, pool.len());
    let (dev, train) = draw(pool, options.seed, "dev", dev_count);

    let (train, train_dropped_by_keep) = if options.train_fraction_keep < 1.0 {
        let keep_count = round_count(options.train_fraction_keep, train.len());
        let dropped = train.len() - keep_count;
        let (kept, _discarded) = draw(train, options.seed, "keep", keep_count);
        (kept, dropped)
    } else {
        (train, 0)
    };

    let report = SplitReport {
        strategy,
        excluded,
        train_dropped_by_keep,
        train: train.len(),
        dev: dev.len(),
        test: test.len(),
    };

    let mut assignments: Vec<(Candidate, Split)> = Vec::new();
    assignments.extend(train.into_iter().map(|candidate| (candidate, Split::Train)));
    assignments.extend(dev.into_iter().map(|candidate| (candidate, Split::Dev)));
    assignments.extend(test.into_iter().map(|candidate| (candidate, Split::Test)));
    assignments.sort_by(|a, b| a.0.sort_key().cmp(&b.0.sort_key()));
    (assignments, report)
}
