//! Partial-match scoring for display-name lookup.
//!
//! Scores are on a 0–100 scale. [`ratio`] compares two whole strings by their
//! longest common subsequence; [`partial_ratio`] slides the shorter string
//! across the longer one and keeps the best window, so "lamp" scores 100
//! against "a brass lamp".

/// Names must score strictly above this to count as a match.
pub const FUZZY_THRESHOLD: u8 = 50;

/// Similarity of `a` and `b`, ignoring case.
#[must_use]
pub fn ratio(a: &str, b: &str) -> u8 {
    let a = lowered(a);
    let b = lowered(b);
    ratio_chars(&a, &b)
}

/// Best [`ratio`] of the shorter string against every equally long window of
/// the longer one, ignoring case.
#[must_use]
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a = lowered(a);
    let b = lowered(b);
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0;
    }
    if short.len() == long.len() {
        return ratio_chars(&short, &long);
    }

    let mut best = 0;
    for window in long.windows(short.len()) {
        let score = ratio_chars(&short, window);
        if score > best {
            best = score;
            if best == 100 {
                break;
            }
        }
    }
    best
}

/// Returns `true` if `name` is a fuzzy match for `text`.
#[must_use]
pub fn is_match(text: &str, name: &str) -> bool {
    partial_ratio(text, name) > FUZZY_THRESHOLD
}

fn lowered(s: &str) -> Vec<char> {
    s.chars().flat_map(char::to_lowercase).collect()
}

fn ratio_chars(a: &[char], b: &[char]) -> u8 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100;
    }
    let common = lcs_len(a, b);
    // Rounded 200 * common / total; never exceeds 100.
    ((200 * common + total / 2) / total) as u8
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}
