//! Token-set string similarity on a 0-100 scale.
//!
//! Both inputs are lowercased and split into alphanumeric tokens. The shared
//! tokens and each side's leftovers are sorted and recombined, and the best
//! pairwise indel ratio among the recombinations is the score. Word order does
//! not matter, and one name being a token subset of the other scores 100.

use std::collections::BTreeSet;

/// Order-independent token overlap score between two names (0-100)
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let shared: Vec<&str> = tokens_a.intersection(&tokens_b).map(String::as_str).collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).map(String::as_str).collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).map(String::as_str).collect();

    let sorted_shared = shared.join(" ");
    let combined_a = join_non_empty(&sorted_shared, &only_a.join(" "));
    let combined_b = join_non_empty(&sorted_shared, &only_b.join(" "));

    ratio(&sorted_shared, &combined_a)
        .max(ratio(&sorted_shared, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

/// Indel similarity `2 * LCS / (len_a + len_b)` scaled to 0-100.
/// Either side being empty scores 0.
pub fn ratio(a: &str, b: &str) -> u8 {
    let chars_a: Vec<char> = a.chars().collect();
    let chars_b: Vec<char> = b.chars().collect();
    let total = chars_a.len() + chars_b.len();
    if chars_a.is_empty() || chars_b.is_empty() {
        return 0;
    }

    let common = longest_common_subsequence(&chars_a, &chars_b);
    let score = 100.0 * (2 * common) as f64 / total as f64;
    score.round().clamp(0.0, 100.0) as u8
}

fn tokenize(s: &str) -> BTreeSet<String> {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn join_non_empty(head: &str, tail: &str) -> String {
    format!("{head} {tail}").trim().to_string()
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
