//! Measuring trained vectors: word similarity correlation, document
//! clustering and document classification.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::hash::Hash;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use ordered_float::OrderedFloat;

use crate::{dot, normalize, Vectors};

/// Ranks starting at 1, ties sharing the average of their positions.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by_key(|&i| OrderedFloat(values[i]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // Positions i..j hold equal values; ranks i+1 ..= j.
        let rank = (i + 1 + j) as f64 / 2.0;
        for &k in &order[i..j] {
            ranks[k] = rank;
        }
        i = j;
    }
    ranks
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}

/// Spearman's rank correlation coefficient.
///
/// Returns `None` if there are fewer than two pairs or either side is
/// constant.
pub fn spearman(a: &[f64], b: &[f64]) -> Option<f64> {
    assert_eq!(a.len(), b.len());
    if a.len() < 2 {
        return None;
    }
    pearson(&ranks(a), &ranks(b))
}

/// Clusters unit vectors by cosine similarity. `rows` holds `rows.len() / dim`
/// vectors back to back. Returns the cluster of each vector.
///
/// Vector `i` starts in cluster `i % k`. Each iteration sets every centroid
/// to the normalized mean of its members, then moves every vector to the
/// centroid with the largest dot product.
pub fn spherical_kmeans(rows: &[f32], dim: usize, k: usize, iterations: usize) -> Vec<usize> {
    assert!(k > 0 && dim > 0);
    let n = rows.len() / dim;
    let mut cl: Vec<usize> = (0..n).map(|a| a % k).collect();
    let mut cent: Vec<f32> = vec![0.0; k * dim];

    for _ in 0..iterations {
        cent.fill(0.0);
        for c in 0..n {
            for d in 0..dim {
                cent[dim * cl[c] + d] += rows[c * dim + d];
            }
        }
        for b in 0..k {
            normalize(&mut cent[dim * b..][..dim]);
        }

        let mut changed = false;
        for c in 0..n {
            let row = &rows[c * dim..][..dim];
            let mut closev: f32 = -10.0;
            let mut closeid = 0;
            for d in 0..k {
                let x = dot(&cent[dim * d..][..dim], row);
                if x > closev {
                    closev = x;
                    closeid = d;
                }
            }
            if cl[c] != closeid {
                cl[c] = closeid;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    cl
}

/// Fraction of items whose cluster's most common gold label is their own.
pub fn purity<G: Eq + Hash, P: Eq + Hash>(gold: &[G], predicted: &[P]) -> f64 {
    assert_eq!(gold.len(), predicted.len());
    if gold.is_empty() {
        return 0.0;
    }
    let mut contingency: HashMap<&P, HashMap<&G, usize>> = HashMap::new();
    for (g, p) in gold.iter().zip(predicted) {
        *contingency.entry(p).or_default().entry(g).or_default() += 1;
    }
    let majority: usize = contingency
        .values()
        .map(|labels| labels.values().copied().max().unwrap_or(0))
        .sum();
    majority as f64 / gold.len() as f64
}

/// Counts of items per (gold class, predicted cluster) pair, with both
/// labelings renumbered densely in order of first appearance.
fn contingency<G: Eq + Hash, P: Eq + Hash>(gold: &[G], predicted: &[P]) -> Vec<Vec<usize>> {
    assert_eq!(gold.len(), predicted.len());
    let mut classes: HashMap<&G, usize> = HashMap::new();
    let mut clusters: HashMap<&P, usize> = HashMap::new();
    let mut table: Vec<Vec<usize>> = vec![];
    for (g, p) in gold.iter().zip(predicted) {
        let n = classes.len();
        let i = *classes.entry(g).or_insert(n);
        let n = clusters.len();
        let j = *clusters.entry(p).or_insert(n);
        if i == table.len() {
            table.push(vec![]);
        }
        if table[i].len() <= j {
            table[i].resize(j + 1, 0);
        }
        table[i][j] += 1;
    }
    let width = clusters.len();
    for row in &mut table {
        row.resize(width, 0);
    }
    table
}

fn row_sums(table: &[Vec<usize>]) -> Vec<usize> {
    table.iter().map(|row| row.iter().sum()).collect()
}

fn column_sums(table: &[Vec<usize>]) -> Vec<usize> {
    let width = table.first().map_or(0, Vec::len);
    (0..width).map(|j| table.iter().map(|row| row[j]).sum()).collect()
}

/// Entropy in nats of a distribution given by counts.
fn entropy(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n as f64;
            -p * p.ln()
        })
        .sum()
}

/// Mutual information in nats between two labelings of the same items.
pub fn mutual_info<G: Eq + Hash, P: Eq + Hash>(gold: &[G], predicted: &[P]) -> f64 {
    let table = contingency(gold, predicted);
    let a = row_sums(&table);
    let b = column_sums(&table);
    let n = gold.len() as f64;
    let mut mi = 0.0;
    for (i, row) in table.iter().enumerate() {
        for (j, &nij) in row.iter().enumerate() {
            if nij > 0 {
                let nij = nij as f64;
                mi += nij / n * (n * nij / (a[i] as f64 * b[j] as f64)).ln();
            }
        }
    }
    mi.max(0.0)
}

/// Mutual information normalized by the arithmetic mean of the two
/// entropies. Two labelings that each put everything in one class agree
/// perfectly.
pub fn nmi<G: Eq + Hash, P: Eq + Hash>(gold: &[G], predicted: &[P]) -> f64 {
    let table = contingency(gold, predicted);
    let h_gold = entropy(&row_sums(&table));
    let h_pred = entropy(&column_sums(&table));
    let mean = (h_gold + h_pred) / 2.0;
    if mean == 0.0 {
        return 1.0;
    }
    mutual_info(gold, predicted) / mean
}

fn pairs(n: usize) -> f64 {
    n as f64 * (n as f64 - 1.0) / 2.0
}

/// Rand index adjusted for chance: 1 for identical partitions, about 0 for
/// independent ones.
pub fn adjusted_rand<G: Eq + Hash, P: Eq + Hash>(gold: &[G], predicted: &[P]) -> f64 {
    let table = contingency(gold, predicted);
    let index: f64 = table.iter().flatten().map(|&nij| pairs(nij)).sum();
    let sum_a: f64 = row_sums(&table).into_iter().map(pairs).sum();
    let sum_b: f64 = column_sums(&table).into_iter().map(pairs).sum();
    let total = pairs(gold.len());
    if total == 0.0 {
        return 1.0;
    }
    let expected = sum_a * sum_b / total;
    let max = (sum_a + sum_b) / 2.0;
    if max == expected {
        return 1.0;
    }
    (index - expected) / (max - expected)
}

/// Per-label true positive, false positive and false negative counts over
/// every label that occurs in either list.
fn label_counts<'a, L: Ord>(gold: &'a [L], predicted: &'a [L]) -> BTreeMap<&'a L, (usize, usize, usize)> {
    assert_eq!(gold.len(), predicted.len());
    let mut counts: BTreeMap<&L, (usize, usize, usize)> = BTreeMap::new();
    for (g, p) in gold.iter().zip(predicted) {
        if g == p {
            counts.entry(g).or_default().0 += 1;
        } else {
            counts.entry(p).or_default().1 += 1;
            counts.entry(g).or_default().2 += 1;
        }
    }
    counts
}

fn f1(tp: usize, fp: usize, fn_: usize) -> f64 {
    let denom = 2 * tp + fp + fn_;
    if denom == 0 {
        0.0
    } else {
        (2 * tp) as f64 / denom as f64
    }
}

/// Unweighted mean of the per-label F1 scores.
pub fn f1_macro<L: Ord>(gold: &[L], predicted: &[L]) -> f64 {
    let counts = label_counts(gold, predicted);
    if counts.is_empty() {
        return 0.0;
    }
    counts.values().map(|&(tp, fp, fn_)| f1(tp, fp, fn_)).sum::<f64>() / counts.len() as f64
}

/// F1 over the pooled counts of every label. For single-label
/// classification this equals accuracy.
pub fn f1_micro<L: Ord>(gold: &[L], predicted: &[L]) -> f64 {
    let (tp, fp, fn_) = label_counts(gold, predicted)
        .values()
        .fold((0, 0, 0), |acc, c| (acc.0 + c.0, acc.1 + c.1, acc.2 + c.2));
    f1(tp, fp, fn_)
}

/// Labels each row of `test` by majority vote among its `k` nearest rows of
/// `train` in Euclidean distance. Ties in the vote go to the smallest label.
pub fn knn_classify<L: Ord + Clone>(
    train: &[f32],
    labels: &[L],
    test: &[f32],
    dim: usize,
    k: usize,
) -> Vec<L> {
    assert!(k > 0 && dim > 0);
    assert_eq!(train.len(), labels.len() * dim);
    test.chunks_exact(dim)
        .filter_map(|query| {
            let mut order: Vec<(usize, f32)> = train
                .chunks_exact(dim)
                .enumerate()
                .map(|(i, row)| {
                    let d = row.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum();
                    (i, d)
                })
                .collect();
            order.sort_by_key(|&(_, d)| OrderedFloat(d));

            let mut votes: BTreeMap<&L, usize> = BTreeMap::new();
            for &(i, _) in order.iter().take(k) {
                *votes.entry(&labels[i]).or_default() += 1;
            }
            let mut best: Option<(&L, usize)> = None;
            for (label, n) in votes {
                if best.map_or(true, |(_, m)| n > m) {
                    best = Some((label, n));
                }
            }
            best.map(|(label, _)| label.clone())
        })
        .collect()
}

/// Represents each line of `corpus` by the normalized mean of the vectors of
/// its words. Words without a vector are ignored; a line with none of them
/// gets a zero row.
pub fn document_averages(vectors: &Vectors, corpus: &Path) -> Result<Vec<f32>> {
    let f = BufReader::new(
        File::open(corpus).with_context(|| format!("error opening corpus file {corpus:?}"))?,
    );
    let dim = vectors.size();
    let mut rows = vec![];
    for line in f.lines() {
        let line = line.context("error reading corpus file")?;
        let mut sum = vec![0.0f32; dim];
        for word in line.split_whitespace() {
            if let Some(i) = vectors.lookup(word) {
                for (s, &v) in sum.iter_mut().zip(&vectors[i]) {
                    *s += v;
                }
            }
        }
        normalize(&mut sum);
        rows.extend(sum);
    }
    Ok(rows)
}

/// Reads gold labels, one integer per line. Blank lines are skipped.
pub fn read_labels(path: &Path) -> Result<Vec<i64>> {
    let f = BufReader::new(
        File::open(path).with_context(|| format!("error opening label file {path:?}"))?,
    );
    let mut labels = vec![];
    for (line_num, line) in f.lines().enumerate() {
        let line = line.context("error reading label file")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        labels.push(line.parse().with_context(|| {
            format!("invalid label {line:?} on line {} of {path:?}", line_num + 1)
        })?);
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_average_ties() {
        assert_eq!(ranks(&[10.0, 20.0, 10.0, 5.0]), vec![2.5, 4.0, 2.5, 1.0]);
    }

    #[test]
    fn spearman_of_monotone_data() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 8.0, 16.0, 32.0];
        assert!((spearman(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        let c = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert!((spearman(&a, &c).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn spearman_with_ties() {
        // Ranks (1, 2.5, 2.5, 4) against (1, 2, 3, 4).
        let rho = spearman(&[1.0, 2.0, 2.0, 3.0], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((rho - 0.9486832980505138).abs() < 1e-12, "{rho}");
    }

    #[test]
    fn spearman_degenerate_inputs() {
        assert_eq!(spearman(&[1.0], &[2.0]), None);
        assert_eq!(spearman(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn kmeans_separates_two_directions() {
        let rows = [
            1.0, 0.0, //
            0.0, 1.0, //
            0.995, 0.0998, //
            0.0998, 0.995, //
            0.98, -0.199, //
        ];
        let cl = spherical_kmeans(&rows, 2, 2, 10);
        assert_eq!(cl[0], cl[2]);
        assert_eq!(cl[0], cl[4]);
        assert_eq!(cl[1], cl[3]);
        assert_ne!(cl[0], cl[1]);
    }

    #[test]
    fn purity_counts_majority_labels() {
        let gold = [0, 0, 1, 1, 1, 2];
        let predicted = ["a", "a", "a", "b", "b", "b"];
        assert!((purity(&gold, &predicted) - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(purity(&gold, &gold), 1.0);
    }

    #[test]
    fn nmi_and_mutual_info() {
        let gold = [0, 0, 1, 1];
        let predicted = [0, 0, 1, 2];
        let ln2 = 2f64.ln();
        assert!((mutual_info(&gold, &predicted) - ln2).abs() < 1e-12);
        assert!((nmi(&gold, &predicted) - 0.8).abs() < 1e-12);
        assert!((nmi(&gold, &[5, 5, 9, 9]) - 1.0).abs() < 1e-12);
        assert!(nmi(&gold, &[0, 1, 0, 1]).abs() < 1e-12);
        assert_eq!(nmi(&[1, 1, 1], &[2, 2, 2]), 1.0);
    }

    #[test]
    fn adjusted_rand_index() {
        let gold = [0, 0, 1, 1];
        assert!((adjusted_rand(&gold, &[0, 0, 1, 2]) - 4.0 / 7.0).abs() < 1e-12);
        assert!((adjusted_rand(&gold, &["b", "b", "a", "a"]) - 1.0).abs() < 1e-12);
        assert!((adjusted_rand(&gold, &[0, 1, 0, 1]) + 0.5).abs() < 1e-12);
        assert_eq!(adjusted_rand(&[3], &[4]), 1.0);
    }

    #[test]
    fn f1_scores() {
        let gold = [0, 0, 1, 1, 2];
        let predicted = [0, 1, 1, 1, 0];
        // Per label: 0.5, 0.8, 0.
        assert!((f1_macro(&gold, &predicted) - 1.3 / 3.0).abs() < 1e-12);
        assert!((f1_micro(&gold, &predicted) - 0.6).abs() < 1e-12);
        assert_eq!(f1_macro(&gold, &gold), 1.0);
    }

    #[test]
    fn knn_votes_among_nearest() {
        let train = [
            0.0, 0.0, //
            0.1, 0.0, //
            0.0, 0.1, //
            5.0, 5.0, //
            5.1, 5.0, //
        ];
        let labels = [1, 1, 2, 7, 7];
        let test = [0.05, 0.05, 4.9, 5.2];
        assert_eq!(knn_classify(&train, &labels, &test, 2, 3), vec![1, 7]);
        assert_eq!(knn_classify(&train, &labels, &[0.04, 0.0], 2, 2), vec![1]);
        // A tied vote goes to the smaller label.
        assert_eq!(knn_classify(&train, &labels, &[2.5, 2.5], 2, 5), vec![1]);
        assert_eq!(knn_classify(&[0.0, 1.0], &[4, 3], &[0.5], 1, 2), vec![3]);
    }

    #[test]
    fn averages_of_word_vectors() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let vec_path = dir.path().join("w.txt");
        let mut f = File::create(&vec_path).unwrap();
        writeln!(f, "2 2\nup 0 1\nright 1 0").unwrap();
        drop(f);
        let corpus = dir.path().join("c.txt");
        std::fs::write(&corpus, "up right\nup unknown up\nnothing here\n").unwrap();

        let vectors = Vectors::load(&vec_path, false).unwrap();
        let rows = document_averages(&vectors, &corpus).unwrap();
        assert_eq!(rows.len(), 6);
        let h = std::f32::consts::FRAC_1_SQRT_2;
        assert!((rows[0] - h).abs() < 1e-6 && (rows[1] - h).abs() < 1e-6);
        assert_eq!(&rows[2..4], &[0.0, 1.0]);
        assert_eq!(&rows[4..6], &[0.0, 0.0]);
    }

    #[test]
    fn labels_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.txt");
        std::fs::write(&path, "1\n 3 \n\n2\n").unwrap();
        assert_eq!(read_labels(&path).unwrap(), vec![1, 3, 2]);
        std::fs::write(&path, "1\nsports\n").unwrap();
        let err = read_labels(&path).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");
    }
}
