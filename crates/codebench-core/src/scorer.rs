//! Unbiased pass@k estimation.
//!
//! For a problem with `n` samples of which `c` pass,
//! `pass@k = 1 - C(n-c, k) / C(n, k)`: the probability that at least one of
//! `k` samples drawn without replacement passes. Corpus pass@k is the mean
//! over the problems that have at least `k` samples; problems with fewer are
//! excluded from that `k` rather than padded.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::ExecutionOutcome;

/// Anything that carries a pass/fail verdict.
pub trait Verdicted {
    fn is_pass(&self) -> bool;
}

impl Verdicted for ExecutionOutcome {
    fn is_pass(&self) -> bool {
        self.passed()
    }
}

impl Verdicted for bool {
    fn is_pass(&self) -> bool {
        *self
    }
}

/// `1 - C(n-c, k) / C(n, k)` as a running product; requires `k <= n`.
///
/// Returns 1.0 whenever `n - c < k` (every draw of k contains a pass).
pub fn pass_at_k(n: usize, c: usize, k: usize) -> f64 {
    debug_assert!(c <= n, "c ({c}) exceeds n ({n})");
    if n.saturating_sub(c) < k {
        return 1.0;
    }
    1.0 - (1..=k).fold(1.0_f64, |acc, i| {
        acc * (n - c - k + i) as f64 / (n - k + i) as f64
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemScore {
    pub task_id: String,
    pub n: usize,
    pub c: usize,
    /// pass@k for every requested `k <= n`.
    pub pass_at_k: BTreeMap<usize, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusPassAtK {
    pub k: usize,
    /// `None` when no problem has `k` samples.
    pub value: Option<f64>,
    pub included: usize,
    pub excluded: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreReport {
    pub problems: Vec<ProblemScore>,
    pub corpus: Vec<CorpusPassAtK>,
}

impl ScoreReport {
    /// Corpus pass@k for `k`, if it was requested and is defined.
    pub fn value(&self, k: usize) -> Option<f64> {
        self.corpus
            .iter()
            .find(|entry| entry.k == k)
            .and_then(|entry| entry.value)
    }

    /// `0.xxx`, or `N/A` when undefined.
    pub fn display_value(&self, k: usize) -> String {
        match self.value(k) {
            Some(v) => format!("{:.3}", v),
            None => "N/A".to_string(),
        }
    }

    /// Total samples and passes across all problems.
    pub fn totals(&self) -> (usize, usize) {
        self.problems
            .iter()
            .fold((0, 0), |(n, c), p| (n + p.n, c + p.c))
    }
}

/// Score grouped outcomes for each requested `k`.
pub fn score<T: Verdicted>(by_problem: &[(String, Vec<T>)], ks: &[usize]) -> ScoreReport {
    let problems: Vec<ProblemScore> = by_problem
        .iter()
        .map(|(task_id, outcomes)| {
            let n = outcomes.len();
            let c = outcomes.iter().filter(|o| o.is_pass()).count();
            let per_k = ks
                .iter()
                .filter(|&&k| k <= n)
                .map(|&k| (k, pass_at_k(n, c, k)))
                .collect();
            ProblemScore {
                task_id: task_id.clone(),
                n,
                c,
                pass_at_k: per_k,
            }
        })
        .collect();

    let corpus = ks
        .iter()
        .map(|&k| {
            let values: Vec<f64> = problems
                .iter()
                .filter_map(|p| p.pass_at_k.get(&k).copied())
                .collect();
            let included = values.len();
            let value = (included > 0).then(|| values.iter().sum::<f64>() / included as f64);
            CorpusPassAtK {
                k,
                value,
                included,
                excluded: problems.len() - included,
            }
        })
        .collect();

    ScoreReport { problems, corpus }
}

/// Group items by task id, keeping first-appearance order of tasks and the
/// original order within each task.
pub fn group_by_task<T, F>(items: Vec<T>, task_id: F) -> Vec<(String, Vec<T>)>
where
    F: Fn(&T) -> &str,
{
    let mut groups: Vec<(String, Vec<T>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for item in items {
        let key = task_id(&item).to_string();
        match positions.get(&key) {
            Some(&pos) => groups[pos].1.push(item),
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push((key, vec![item]));
            }
        }
    }
    groups
}
