//! Ordered inclusion/exclusion rules over candidate examples.
//!
//! Each rule is a named keep-predicate; rules apply in a fixed order and every
//! drop is credited to the rule that saw the candidate first. The surviving
//! set is the same regardless of which rule gets the credit.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::candidate::Candidate;
use crate::config::FiltersConfig;

/// Errors produced while loading the skip file.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Failed to read the skip file.
    #[error("Failed to read skip file {path}: {source}")]
    Read {
        /// Skip file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// A skip file line is not a `region,year` pair.
    #[error("Invalid skip file line {line} in {path}: {text:?}")]
    InvalidLine {
        /// Skip file path.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Offending line text.
        text: String,
    },
}

/// (region, year) pairs excluded by the external data-curation side.
pub type SkipList = BTreeSet<(String, i32)>;

/// Load a skip file: one `region,year` pair per line, `#` comments and blank
/// lines ignored.
pub fn load_skip_file(path: &Path) -> Result<SkipList, FilterError> {
    let text = std::fs::read_to_string(path).map_err(|source| FilterError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut skip = SkipList::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed = line.split_once(',').and_then(|(region, year)| {
            let region = region.trim();
            let year = year.trim().parse::<i32>().ok()?;
            if region.is_empty() {
                return None;
            }
            Some((region.to_string(), year))
        });
        match parsed {
            Some(pair) => {
                skip.insert(pair);
            }
            None => {
                return Err(FilterError::InvalidLine {
                    path: path.to_path_buf(),
                    line: index + 1,
                    text: raw.to_string(),
                });
            }
        }
    }
    Ok(skip)
}

/// Candidates dropped by one rule.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RuleDrops {
    /// Rule name.
    pub rule: &'static str,
    /// Candidates the rule dropped.
    pub dropped: usize,
}

/// Audit trail of a filter pass.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FilterReport {
    /// Candidates entering the filter pipeline.
    pub entering: usize,
    /// Candidates surviving every rule.
    pub leaving: usize,
    /// Per-rule drop counts, in application order.
    pub drops: Vec<RuleDrops>,
}

struct Rule<'a> {
    name: &'static str,
    keep: Box<dyn Fn(&Candidate) -> bool + 'a>,
}

fn build_rules<'a>(config: &'a FiltersConfig, skip: Option<&'a SkipList>) -> Vec<Rule<'a>> {
    let mut rules: Vec<Rule<'a>> = Vec::new();
    if let Some(year) = config.year_to_skip {
        rules.push(Rule {
            name: "year_to_skip",
            keep: Box::new(move |candidate| candidate.year != year),
        });
    }
    if !config.filter_provinces.is_empty() {
        rules.push(Rule {
            name: "filter_provinces",
            keep: Box::new(|candidate| {
                !config
                    .filter_provinces
                    .iter()
                    .any(|region| region == &candidate.region)
            }),
        });
    }
    if !config.filter_years.is_empty() {
        rules.push(Rule {
            name: "filter_years",
            keep: Box::new(|candidate| !config.filter_years.contains(&candidate.year)),
        });
    }
    if let Some(skip) = skip {
        rules.push(Rule {
            name: "skip_file",
            keep: Box::new(move |candidate| {
                !skip.contains(&(candidate.region.clone(), candidate.year))
            }),
        });
    }
    rules
}

/// Apply the configured rules in order, returning survivors and the audit
/// trail.
pub fn apply_filters(
    candidates: Vec<Candidate>,
    config: &FiltersConfig,
    skip: Option<&SkipList>,
) -> (Vec<Candidate>, FilterReport) {
    let rules = build_rules(config, skip);
    let mut report = FilterReport {
        entering: candidates.len(),
        leaving: 0,
        drops: Vec::with_capacity(rules.len()),
    };

    let mut survivors = candidates;
    for rule in &rules {
        let before = survivors.len();
        survivors.retain(|candidate| (rule.keep)(candidate));
        report.drops.push(RuleDrops {
            rule: rule.name,
            dropped: before - survivors.len(),
        });
    }
    report.leaving = survivors.len();
    (survivors, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn candidate(region: &str, year: i32) -> Candidate {
        Candidate {
            region: region.to_string(),
            year,
            label: 1.0,
            crop: None,
            periods: 1,
            values: vec![0.0],
        }
    }

    fn grid(regions: &[&str], years: &[i32]) -> Vec<Candidate> {
        regions
            .iter()
            .flat_map(|region| years.iter().map(|year| candidate(region, *year)))
            .collect()
    }

    #[test]
    fn rules_apply_in_order_and_credit_first_match() {
        let candidates = grid(&["Adams", "Clark"], &[2004, 2005]);
        let config = FiltersConfig {
            year_to_skip: Some(2004),
            filter_provinces: vec!["Clark".to_string()],
            filter_years: vec![2004],
            use_skip_file: false,
            skip_file: None,
        };
        let (survivors, report) = apply_filters(candidates, &config, None);
        // Adams/Clark 2004 go to year_to_skip, Clark 2005 to filter_provinces,
        // leaving filter_years nothing to drop.
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].region, "Adams");
        assert_eq!(survivors[0].year, 2005);
        assert_eq!(report.entering, 4);
        assert_eq!(report.leaving, 1);
        assert_eq!(
            report.drops,
            vec![
                RuleDrops {
                    rule: "year_to_skip",
                    dropped: 2
                },
                RuleDrops {
                    rule: "filter_provinces",
                    dropped: 1
                },
                RuleDrops {
                    rule: "filter_years",
                    dropped: 0
                },
            ]
        );
    }

    #[test]
    fn filter_years_drops_whole_year_across_regions() {
        let candidates = grid(&["Adams", "Clark", "Grant"], &[2003, 2004, 2005]);
        let config = FiltersConfig {
            filter_years: vec![2004],
            ..FiltersConfig::default()
        };
        let (survivors, report) = apply_filters(candidates, &config, None);
        assert_eq!(report.entering, 9);
        assert_eq!(survivors.len(), 6);
        for year in [2003, 2005] {
            assert_eq!(survivors.iter().filter(|c| c.year == year).count(), 3);
        }
    }

    #[test]
    fn skip_file_rule_drops_listed_pairs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("skip.csv");
        std::fs::write(&path, "# curated exclusions\nAdams, 2004\n\nClark,2005\n").unwrap();
        let skip = load_skip_file(&path).unwrap();
        assert_eq!(skip.len(), 2);

        let config = FiltersConfig {
            use_skip_file: true,
            skip_file: Some(path),
            ..FiltersConfig::default()
        };
        let (survivors, report) = apply_filters(grid(&["Adams", "Clark"], &[2004, 2005]), &config, Some(&skip));
        assert_eq!(survivors.len(), 2);
        assert!(!survivors.iter().any(|c| c.region == "Adams" && c.year == 2004));
        assert_eq!(report.drops, vec![RuleDrops { rule: "skip_file", dropped: 2 }]);
    }

    #[test]
    fn malformed_skip_line_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("skip.csv");
        std::fs::write(&path, "Adams;2004\n").unwrap();
        let err = load_skip_file(&path).unwrap_err();
        assert!(matches!(err, FilterError::InvalidLine { line: 1, .. }));
    }

    #[test]
    fn no_configured_rules_is_a_pass_through() {
        let candidates = grid(&["Adams"], &[2004]);
        let (survivors, report) = apply_filters(candidates, &FiltersConfig::default(), None);
        assert_eq!(survivors.len(), 1);
        assert!(report.drops.is_empty());
        assert_eq!(report.entering, report.leaving);
    }
}
