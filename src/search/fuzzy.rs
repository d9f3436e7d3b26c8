//! Edit-distance helpers shared by query building and highlighting

/// Edits allowed for a query term of `len` characters.
///
/// Exact match up to two characters, one edit up to five, two beyond.
pub fn auto_fuzziness(len: usize) -> u8 {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Optimal string alignment distance: Levenshtein plus adjacent
/// transposition at cost one.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let width = b.len() + 1;
    let mut d = vec![0usize; (a.len() + 1) * width];
    for i in 0..=a.len() {
        d[i * width] = i;
    }
    for (j, cell) in d.iter_mut().enumerate().take(width) {
        *cell = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (d[(i - 1) * width + j] + 1)
                .min(d[i * width + j - 1] + 1)
                .min(d[(i - 1) * width + j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[(i - 2) * width + j - 2] + 1);
            }
            d[i * width + j] = best;
        }
    }

    d[a.len() * width + b.len()]
}

/// Whether `candidate` matches `term` within the term's automatic fuzziness
pub fn fuzzy_matches(term: &str, candidate: &str) -> bool {
    let allowed = usize::from(auto_fuzziness(term.chars().count()));
    if allowed == 0 {
        return term == candidate;
    }
    edit_distance(term, candidate) <= allowed
}
