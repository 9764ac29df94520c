//! Text metrics behind the scoring blocks.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Similarity — Ratcliff/Obershelp over characters
// ---------------------------------------------------------------------------

/// Ratcliff/Obershelp similarity in `[0, 1]`: twice the number of matched
/// characters over the combined length, matching recursively around the
/// longest common substring.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / (a.len() + b.len()) as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_run(a, b);
    if len == 0 {
        return 0;
    }
    len + matched_chars(&a[..start_a], &b[..start_b])
        + matched_chars(&a[start_a + len..], &b[start_b + len..])
}

/// Longest common substring as `(start_a, start_b, len)`, preferring the
/// earliest occurrence on ties.
fn longest_common_run(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        let mut row = vec![0usize; b.len() + 1];
        for (j, &cb) in b.iter().enumerate() {
            if ca == cb {
                let run = prev[j] + 1;
                row[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        prev = row;
    }
    best
}

/// Mean pairwise dissimilarity (`1 - similarity`) across `texts`. Fewer than
/// two texts score 0.
pub fn mean_pairwise_diversity(texts: &[String]) -> f64 {
    if texts.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            total += 1.0 - similarity_ratio(&texts[i], &texts[j]);
            pairs += 1;
        }
    }
    total / pairs as f64
}

// ---------------------------------------------------------------------------
// ROUGE — n-gram and subsequence overlap F-measures
// ---------------------------------------------------------------------------

/// ROUGE variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RougeVariant {
    Rouge1,
    Rouge2,
    RougeL,
}

impl RougeVariant {
    /// Parse the conventional lowercase names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "rouge1" => Some(Self::Rouge1),
            "rouge2" => Some(Self::Rouge2),
            "rougeL" => Some(Self::RougeL),
            _ => None,
        }
    }
}

/// ROUGE F-measure between generated and reference text over lowercase
/// alphanumeric word tokens, without stemming.
pub fn rouge_f_measure(variant: RougeVariant, generated: &str, reference: &str) -> f64 {
    let generated = tokenize(generated);
    let reference = tokenize(reference);
    match variant {
        RougeVariant::Rouge1 => ngram_f_measure(&generated, &reference, 1),
        RougeVariant::Rouge2 => ngram_f_measure(&generated, &reference, 2),
        RougeVariant::RougeL => lcs_f_measure(&generated, &reference),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch.to_ascii_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn ngram_f_measure(generated: &[String], reference: &[String], n: usize) -> f64 {
    if generated.len() < n || reference.len() < n {
        return 0.0;
    }
    let generated_counts = ngram_counts(generated, n);
    let reference_counts = ngram_counts(reference, n);
    let mut overlap = 0usize;
    for (gram, count) in &generated_counts {
        if let Some(reference_count) = reference_counts.get(gram) {
            overlap += (*count).min(*reference_count);
        }
    }
    f_measure(overlap, generated.len() + 1 - n, reference.len() + 1 - n)
}

fn ngram_counts<'a>(tokens: &'a [String], n: usize) -> HashMap<&'a [String], usize> {
    let mut counts = HashMap::new();
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

fn lcs_f_measure(generated: &[String], reference: &[String]) -> f64 {
    if generated.is_empty() || reference.is_empty() {
        return 0.0;
    }
    f_measure(lcs_length(generated, reference), generated.len(), reference.len())
}

/// Longest common subsequence length, rolling one DP row at a time.
fn lcs_length(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    for token in a {
        let mut row = vec![0usize; b.len() + 1];
        for (j, other) in b.iter().enumerate() {
            row[j + 1] = if token == other {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        prev = row;
    }
    prev[b.len()]
}

fn f_measure(overlap: usize, generated_total: usize, reference_total: usize) -> f64 {
    if overlap == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / generated_total as f64;
    let recall = overlap as f64 / reference_total as f64;
    2.0 * precision * recall / (precision + recall)
}
