//! TF-IDF vectorisation and greedy anchor clustering of caption text.

use std::collections::BTreeMap;

pub const DEFAULT_THRESHOLD: f64 = 0.4;

/// Lowercased runs of two or more word characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// L2-normalised TF-IDF rows over `documents`.
///
/// Term frequency is the raw count, idf is the smoothed
/// `ln((1 + n) / (1 + df)) + 1`. The vocabulary is sorted, so the same corpus
/// always yields the same columns.
pub fn tfidf_vectors(documents: &[String]) -> Vec<Vec<f64>> {
    let tokenized: Vec<Vec<String>> = documents.iter().map(|doc| tokenize(doc)).collect();

    let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for tokens in &tokenized {
        let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *document_frequency.entry(term).or_default() += 1;
        }
    }

    let columns: BTreeMap<&str, usize> = document_frequency
        .keys()
        .enumerate()
        .map(|(column, term)| (*term, column))
        .collect();
    let n = documents.len() as f64;
    let idf: Vec<f64> = document_frequency
        .values()
        .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
        .collect();

    tokenized
        .iter()
        .map(|tokens| {
            let mut row = vec![0.0; columns.len()];
            for token in tokens {
                row[columns[token.as_str()]] += 1.0;
            }
            for (value, weight) in row.iter_mut().zip(&idf) {
                *value *= weight;
            }
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|v| *v /= norm);
            }
            row
        })
        .collect()
}

/// Cosine similarity of already normalised rows.
pub fn cosine_matrix(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|a| {
            rows.iter()
                .map(|b| a.iter().zip(b).map(|(x, y)| x * y).sum())
                .collect()
        })
        .collect()
}

/// Ordered member indices; the first one is the anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn anchor(&self) -> usize {
        self.members[0]
    }
}

/// Single pass over `similarity` in index order: each item joins the first
/// cluster whose anchor scores at least `threshold`, otherwise it anchors a
/// new one.
pub fn greedy_clusters(similarity: &[Vec<f64>], threshold: f64) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    for index in 0..similarity.len() {
        match clusters
            .iter_mut()
            .find(|cluster| similarity[index][cluster.anchor()] >= threshold)
        {
            Some(cluster) => cluster.members.push(index),
            None => clusters.push(Cluster {
                members: vec![index],
            }),
        }
    }
    clusters
}

/// Clusters caption texts, preserving input order inside each cluster.
pub fn cluster_texts(documents: &[String], threshold: f64) -> Vec<Cluster> {
    match documents.len() {
        0 => Vec::new(),
        1 => vec![Cluster { members: vec![0] }],
        _ => greedy_clusters(&cosine_matrix(&tfidf_vectors(documents)), threshold),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    fn members(clusters: &[Cluster]) -> Vec<Vec<usize>> {
        clusters.iter().map(|c| c.members.clone()).collect()
    }

    #[test]
    fn test_tokenize_drops_single_characters() {
        assert_eq!(tokenize("A UI mock-up, v2 x"), vec!["ui", "mock", "up", "v2"]);
    }

    #[test]
    fn test_tfidf_matches_reference_weights() {
        let sims = cosine_matrix(&tfidf_vectors(&docs(&[
            "login error screen",
            "login failure page",
            "weather forecast today",
        ])));
        // Only "login" is shared: idf 1 + ln(4/3) against 1 + ln(2) for the rest.
        let login = 1.0 + (4.0_f64 / 3.0).ln();
        let other = 1.0 + 2.0_f64.ln();
        let expected = login * login / (login * login + 2.0 * other * other);
        assert!((sims[0][1] - expected).abs() < 1e-9);
        assert!((sims[0][0] - 1.0).abs() < 1e-9);
        assert_eq!(sims[0][2], 0.0);
    }

    #[test]
    fn test_example_scenario_groups_login_screens() {
        let corpus = docs(&[
            "login error screen",
            "login failure page",
            "weather forecast today",
        ]);
        // The login pair shares one word of three and scores about 0.224
        // under smoothed TF-IDF, below the 0.4 default, so it is grouped at 0.2.
        let clusters = cluster_texts(&corpus, 0.2);
        assert_eq!(members(&clusters), vec![vec![0, 1], vec![2]]);
        assert_eq!(clusters[0].anchor(), 0);
        assert_eq!(clusters[1].anchor(), 2);
    }

    #[test]
    fn test_default_threshold_groups_close_captions() {
        let corpus = docs(&[
            "Login error screen showing a login error message",
            "Weather forecast for today",
            "Login error screen with a password error",
            "Weather forecast for the weekend",
        ]);
        let clusters = cluster_texts(&corpus, DEFAULT_THRESHOLD);
        assert_eq!(members(&clusters), vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_joins_first_qualifying_cluster_not_best() {
        let similarity = vec![
            vec![1.0, 0.1, 0.5],
            vec![0.1, 1.0, 0.9],
            vec![0.5, 0.9, 1.0],
        ];
        let clusters = greedy_clusters(&similarity, 0.4);
        assert_eq!(members(&clusters), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_empty_and_singleton_corpus() {
        assert!(cluster_texts(&[], DEFAULT_THRESHOLD).is_empty());
        assert_eq!(
            members(&cluster_texts(&docs(&["only one"]), DEFAULT_THRESHOLD)),
            vec![vec![0]]
        );
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let corpus = docs(&[
            "chat conversation with friends",
            "invoice payment receipt",
            "group chat conversation",
            "receipt for payment",
            "map navigation route",
        ]);
        let first = cluster_texts(&corpus, DEFAULT_THRESHOLD);
        let second = cluster_texts(&corpus, DEFAULT_THRESHOLD);
        assert_eq!(first, second);
    }

    #[test]
    fn test_raising_threshold_never_grows_clusters() {
        let corpus = docs(&[
            "chat thread",
            "chat thread",
            "invoice receipt",
            "chat thread",
            "invoice receipt",
            "map route",
        ]);
        let mut previous = usize::MAX;
        for step in 0..=10 {
            let threshold = step as f64 / 10.0;
            let largest = cluster_texts(&corpus, threshold)
                .iter()
                .map(|c| c.members.len())
                .max()
                .unwrap();
            assert!(largest <= previous, "threshold {threshold} grew a cluster");
            previous = largest;
        }
        assert_eq!(
            members(&cluster_texts(&corpus, DEFAULT_THRESHOLD)),
            vec![vec![0, 1, 3], vec![2, 4], vec![5]]
        );
    }

    #[test]
    fn test_text_without_tokens_stays_alone() {
        let clusters = cluster_texts(&docs(&["? !", "a b", "chat"]), DEFAULT_THRESHOLD);
        assert_eq!(clusters.len(), 3);
    }
}
