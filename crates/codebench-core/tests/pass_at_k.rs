//! The closed-form estimator against exhaustive subset enumeration.

use codebench_core::{pass_at_k, score};

/// Fraction of k-subsets of `n` samples (the first `c` passing) that
/// contain at least one pass.
fn brute_force(n: usize, c: usize, k: usize) -> f64 {
    let mut total = 0u64;
    let mut hits = 0u64;
    for mask in 0u32..(1 << n) {
        if mask.count_ones() as usize != k {
            continue;
        }
        total += 1;
        if (0..c).any(|i| mask & (1 << i) != 0) {
            hits += 1;
        }
    }
    hits as f64 / total as f64
}

#[test]
fn closed_form_matches_enumeration() {
    for n in 1..=10 {
        for c in 0..=n {
            for k in 1..=n {
                let expected = brute_force(n, c, k);
                let actual = pass_at_k(n, c, k);
                assert!(
                    (expected - actual).abs() < 1e-9,
                    "n={n} c={c} k={k}: expected {expected}, got {actual}"
                );
            }
        }
    }
}

#[test]
fn estimator_is_monotone_in_k() {
    for n in 1..=10 {
        for c in 0..=n {
            let values: Vec<f64> = (1..=n).map(|k| pass_at_k(n, c, k)).collect();
            assert!(
                values.windows(2).all(|w| w[0] <= w[1] + 1e-12),
                "n={n} c={c}: {values:?}"
            );
        }
    }
}

#[test]
fn corpus_average_skips_short_problems() {
    let by_problem = vec![
        ("HumanEval/0".to_string(), vec![true; 5]),
        ("HumanEval/1".to_string(), vec![false; 5]),
        ("HumanEval/2".to_string(), vec![true, false]),
    ];
    let report = score(&by_problem, &[1, 5, 10]);

    assert_eq!(report.value(1), Some((1.0 + 0.0 + 0.5) / 3.0));
    assert_eq!(report.value(5), Some(0.5));
    assert_eq!(report.value(10), None);
    assert_eq!(report.display_value(10), "N/A");

    let k5 = report
        .corpus
        .iter()
        .find(|entry| entry.k == 5)
        .expect("k=5 entry");
    assert_eq!(k5.included, 2);
    assert_eq!(k5.excluded, 1);
}
