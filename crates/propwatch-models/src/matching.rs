use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Default similarity floor for player names.
pub const DEFAULT_NAME_THRESHOLD: f64 = 0.80;

/// Shorter name must have at least this many characters for containment to count.
const MIN_SUBSTRING_LEN: usize = 5;

/// Shared surname must have at least this many characters.
const MIN_SURNAME_LEN: usize = 4;

/// Decides whether two free-text names refer to the same person (or team).
///
/// The rules are applied in order and the first one that fires wins:
/// exact normalized equality, substring containment, a surname heuristic,
/// then normalized Levenshtein similarity against `threshold`.
/// Every rule is symmetric, so `is_match(a, b) == is_match(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentityMatcher {
    threshold: f64,
}

impl Default for IdentityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_THRESHOLD)
    }
}

impl IdentityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether `a` and `b` name the same player.
    ///
    /// A name that normalizes to nothing (blank, or punctuation only) matches
    /// nothing, not even another empty name.
    pub fn is_match(&self, a: &str, b: &str) -> bool {
        let n1 = normalize_name(a);
        let n2 = normalize_name(b);
        if n1.is_empty() || n2.is_empty() {
            return false;
        }

        if n1 == n2 {
            return true;
        }

        let (shorter, longer) = if n1.chars().count() <= n2.chars().count() {
            (&n1, &n2)
        } else {
            (&n2, &n1)
        };
        if shorter.chars().count() >= MIN_SUBSTRING_LEN && longer.contains(shorter.as_str()) {
            return true;
        }

        if surnames_agree(&n1, &n2) {
            return true;
        }

        normalized_similarity(&n1, &n2) >= self.threshold
    }

    /// Raw similarity in `[0, 1]` between the normalized forms.
    pub fn similarity_score(&self, a: &str, b: &str) -> f64 {
        normalized_similarity(&normalize_name(a), &normalize_name(b))
    }

    /// Highest-scoring candidate that satisfies [`is_match`](Self::is_match).
    /// Ties keep the earliest candidate.
    pub fn find_best_match<'a, I>(&self, target: &str, candidates: I) -> Option<(&'a str, f64)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, f64)> = None;
        for candidate in candidates {
            if !self.is_match(target, candidate) {
                continue;
            }
            let score = self.similarity_score(target, candidate);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        best
    }
}

/// Lowercase, strip accents and `'` `-` `.`, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '-' | '.'))
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn surnames_agree(n1: &str, n2: &str) -> bool {
    let t1: Vec<&str> = n1.split(' ').collect();
    let t2: Vec<&str> = n2.split(' ').collect();
    let (Some(s1), Some(s2)) = (t1.last(), t2.last()) else {
        return false;
    };
    if s1 != s2 || s1.chars().count() < MIN_SURNAME_LEN {
        return false;
    }
    if t1.len() == 1 || t2.len() == 1 {
        return true;
    }
    t1[0].chars().next() == t2[0].chars().next()
}

fn normalized_similarity(n1: &str, n2: &str) -> f64 {
    if n1.is_empty() || n2.is_empty() {
        return 0.0;
    }
    let longest = n1.chars().count().max(n2.chars().count());
    1.0 - strsim::levenshtein(n1, n2) as f64 / longest as f64
}
