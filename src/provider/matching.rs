//! Fuzzy ranking of stored titles and names against a free-text query.

/// Edit distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rolling rows instead of the full matrix
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Lower-cased, whitespace-collapsed form used for comparisons.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Pick the candidate closest to `query`.
///
/// Candidates are `(id, label)` pairs. Ties keep the earliest candidate.
/// Returns `None` only when there are no candidates.
pub fn best_match<'a, I>(query: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    let query = normalize(query);
    let mut best: Option<(&'a str, usize)> = None;

    for (id, label) in candidates {
        let distance = levenshtein(&query, &normalize(label));
        match best {
            Some((_, d)) if d <= distance => {}
            _ => best = Some((id.as_str(), distance)),
        }
        if distance == 0 {
            break;
        }
    }

    best.map(|(id, _)| id)
}
