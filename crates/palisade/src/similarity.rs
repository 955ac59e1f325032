//! Edit-distance based typosquat detection.
//!
//! A name one or two edits away from a popular package (`lodahs`, `expresss`)
//! is a common way to slip a malicious package into a dependency tree. The
//! detector compares a candidate against a corpus of well-known names and
//! reports the close ones.

use std::sync::OnceLock;

/// Maximum edit distance still considered similar.
pub const SIMILARITY_THRESHOLD: usize = 3;

/// Well-known package names used as the default typosquat corpus.
pub const POPULAR_PACKAGES: &[&str] = &[
    "axios",
    "babel-core",
    "bluebird",
    "body-parser",
    "chalk",
    "cheerio",
    "classnames",
    "colors",
    "commander",
    "cors",
    "cross-env",
    "debug",
    "dotenv",
    "eslint",
    "express",
    "fs-extra",
    "glob",
    "graphql",
    "inquirer",
    "jest",
    "jquery",
    "jsonwebtoken",
    "lodash",
    "minimist",
    "mkdirp",
    "moment",
    "mongoose",
    "next",
    "node-fetch",
    "nodemon",
    "prettier",
    "prop-types",
    "react",
    "react-dom",
    "redux",
    "request",
    "rimraf",
    "rxjs",
    "semver",
    "socket.io",
    "typescript",
    "underscore",
    "uuid",
    "vue",
    "webpack",
    "winston",
    "yargs",
];

/// Outcome of a typosquat check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimilarityResult {
    /// Whether any corpus entry was close enough to be suspicious.
    pub is_suspicious: bool,
    /// The checked name, case-folded.
    pub subject: String,
    /// Close corpus entries, closest first.
    pub matches: Vec<(String, usize)>,
    /// Message naming the closest match.
    pub warning: Option<String>,
}

impl SimilarityResult {
    /// The closest corpus entry, if any.
    pub fn closest(&self) -> Option<(&str, usize)> {
        self.matches.first().map(|(name, d)| (name.as_str(), *d))
    }
}

/// Edit distance between two strings, bounded by [`SIMILARITY_THRESHOLD`].
///
/// When the lengths differ by more than the threshold the length difference
/// is returned without running the dynamic program. It is a lower bound on
/// the true distance and already enough to rule the pair out.
pub fn distance(a: &str, b: &str) -> usize {
    bounded_distance(a, b, SIMILARITY_THRESHOLD)
}

/// Returns true iff `distance(a, b) <= threshold`.
pub fn is_similar(a: &str, b: &str, threshold: usize) -> bool {
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    if len_a.abs_diff(len_b) > threshold {
        return false;
    }
    bounded_distance(a, b, threshold) <= threshold
}

fn bounded_distance(a: &str, b: &str, threshold: usize) -> usize {
    if a == b {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let diff = a.len().abs_diff(b.len());
    if diff > threshold {
        return diff;
    }
    levenshtein(&a, &b)
}

/// Full edit distance with one row sized to the shorter string.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    #[cfg(test)]
    tests::DP_RUNS.with(|runs| runs.set(runs.get() + 1));

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut row: Vec<usize> = (0..=short.len()).collect();

    for (i, lc) in long.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(lc != sc);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[short.len()]
}

/// Checks names against a corpus of well-known package names.
#[derive(Clone, Debug)]
pub struct SimilarityDetector {
    corpus: Vec<String>,
    threshold: usize,
}

impl Default for SimilarityDetector {
    fn default() -> Self {
        Self::new(POPULAR_PACKAGES.iter().copied())
    }
}

impl SimilarityDetector {
    /// Detector over a custom corpus.
    pub fn new<I, S>(corpus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            corpus: corpus.into_iter().map(|s| s.into().to_lowercase()).collect(),
            threshold: SIMILARITY_THRESHOLD,
        }
    }

    /// The corpus, in insertion order.
    pub fn corpus(&self) -> &[String] {
        &self.corpus
    }

    /// Compare `name` against the corpus.
    ///
    /// Exact corpus hits are not suspicious. Entries `0 < d < threshold`
    /// edits away are reported, closest first.
    pub fn check(&self, name: &str) -> SimilarityResult {
        let subject = name.to_lowercase();
        let subject_len = subject.chars().count();
        let mut matches = Vec::new();

        for known in &self.corpus {
            if *known == subject {
                continue;
            }
            if known.chars().count().abs_diff(subject_len) > self.threshold {
                continue;
            }
            let d = bounded_distance(&subject, known, self.threshold);
            if d > 0 && d < self.threshold {
                matches.push((known.clone(), d));
            }
        }
        matches.sort_by_key(|(_, d)| *d);

        let warning = matches.first().map(|(closest, d)| {
            format!(
                "Package '{}' is similar to popular package '{}' (distance {}). Possible typosquatting attempt.",
                subject, closest, d
            )
        });

        SimilarityResult {
            is_suspicious: !matches.is_empty(),
            subject,
            matches,
            warning,
        }
    }

    /// Returns true if `name` is itself in the corpus.
    pub fn is_known(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.corpus.iter().any(|known| *known == lower)
    }
}

/// Typosquat check against [`POPULAR_PACKAGES`].
pub fn check_typosquat(name: &str) -> SimilarityResult {
    static DETECTOR: OnceLock<SimilarityDetector> = OnceLock::new();
    DETECTOR.get_or_init(SimilarityDetector::default).check(name)
}
