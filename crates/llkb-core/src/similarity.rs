//! Code normalization and near-duplicate detection.
//!
//! Similarity is 80% token-set Jaccard over normalized code plus 20% of the
//! line-count ratio, so snippets that share vocabulary but differ in shape
//! still score below an exact structural match.

use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

const JACCARD_WEIGHT: f64 = 0.8;
const LINE_RATIO_WEIGHT: f64 = 0.2;

const STR_TOKEN: &str = "STR";
const NUM_TOKEN: &str = "NUM";
const VAR_TOKEN: &str = "VAR";

static STRING_RE: OnceLock<Regex> = OnceLock::new();
static DECL_RE: OnceLock<Regex> = OnceLock::new();
static IDENT_RE: OnceLock<Regex> = OnceLock::new();
static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
static WORD_RE: OnceLock<Regex> = OnceLock::new();

fn string_re() -> &'static Regex {
    STRING_RE.get_or_init(|| {
        Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|`(?:[^`\\]|\\.)*`"#).unwrap()
    })
}

fn decl_re() -> &'static Regex {
    DECL_RE.get_or_init(|| Regex::new(r"\b(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)").unwrap())
}

fn ident_re() -> &'static Regex {
    IDENT_RE.get_or_init(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").unwrap())
}

fn number_re() -> &'static Regex {
    NUMBER_RE.get_or_init(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap())
}

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*|\d+|[^\sA-Za-z0-9_$]").unwrap())
}

fn word_re() -> &'static Regex {
    WORD_RE.get_or_init(|| Regex::new(r"[a-z0-9]+").unwrap())
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Canonical form of a snippet: literals and locally declared names become
/// placeholder tokens, whitespace runs collapse, blank lines drop.
pub fn normalize(code: &str) -> String {
    let without_strings = string_re().replace_all(code, STR_TOKEN);

    let locals: HashSet<String> = decl_re()
        .captures_iter(&without_strings)
        .map(|c| c[1].to_string())
        .collect();
    let renamed = ident_re().replace_all(&without_strings, |c: &Captures| {
        if locals.contains(&c[0]) {
            VAR_TOKEN.to_string()
        } else {
            c[0].to_string()
        }
    });

    let numbered = number_re().replace_all(&renamed, NUM_TOKEN);

    numbered
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pre-normalized snippet, reusable across many comparisons.
#[derive(Debug, Clone)]
pub struct NormalizedCode {
    text: String,
    tokens: HashSet<String>,
    lines: usize,
}

impl NormalizedCode {
    pub fn new(code: &str) -> Self {
        let text = normalize(code);
        let tokens = token_re()
            .find_iter(&text)
            .map(|m| m.as_str().to_string())
            .collect();
        let lines = text.lines().count();
        Self {
            text,
            tokens,
            lines,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn similarity(&self, other: &NormalizedCode) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }
        if self.text == other.text {
            return 1.0;
        }
        let intersection = self.tokens.intersection(&other.tokens).count();
        let union = self.tokens.union(&other.tokens).count();
        let jaccard = if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        };
        let line_ratio = self.lines.min(other.lines) as f64 / self.lines.max(other.lines) as f64;
        JACCARD_WEIGHT * jaccard + LINE_RATIO_WEIGHT * line_ratio
    }
}

/// Similarity of two snippets in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    NormalizedCode::new(a).similarity(&NormalizedCode::new(b))
}

// ---------------------------------------------------------------------------
// Near-duplicate scan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    pub id: String,
    pub similarity: f64,
}

/// Every `(id, code)` item at or above `threshold`, most similar first.
pub fn find_near_duplicates<I, K, S>(candidate: &str, items: I, threshold: f64) -> Vec<SimilarityMatch>
where
    I: IntoIterator<Item = (K, S)>,
    K: AsRef<str>,
    S: AsRef<str>,
{
    let candidate = NormalizedCode::new(candidate);
    let mut matches: Vec<SimilarityMatch> = items
        .into_iter()
        .filter_map(|(id, code)| {
            let score = candidate.similarity(&NormalizedCode::new(code.as_ref()));
            (score >= threshold).then(|| SimilarityMatch {
                id: id.as_ref().to_string(),
                similarity: score,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "when", "then", "than", "are",
    "was", "not", "but", "use", "using", "should", "can",
];

/// Lowercased words of three or more characters, minus stopwords.
pub fn keywords(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    word_re()
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Fraction of `query` keywords that appear in `text`.
pub fn keyword_overlap(query: &BTreeSet<String>, text: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let words = keywords(text);
    let hits = query.iter().filter(|k| words.contains(*k)).count();
    hits as f64 / query.len() as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT_A: &str = "const btn = page.getByRole('button', { name: 'Save' });\nawait btn.click();\nawait page.waitForTimeout(500);";
    const WAIT_B: &str = "const saveButton = page.getByRole(\"button\", { name: \"Submit\" });\n  await saveButton.click();\nawait page.waitForTimeout(1200);";

    #[test]
    fn normalize_replaces_literals_and_locals() {
        let n = normalize(WAIT_A);
        assert!(n.contains("const VAR = page.getByRole(STR, { name: STR });"));
        assert!(n.contains("await VAR.click();"));
        assert!(n.contains("waitForTimeout(NUM)"));
        assert!(!n.contains("btn"));
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  a   +\tb \n\n\n  c  "), "a + b\nc");
    }

    #[test]
    fn cosmetic_differences_are_identical() {
        assert_eq!(normalize(WAIT_A), normalize(WAIT_B));
        assert_eq!(similarity(WAIT_A, WAIT_B), 1.0);
    }

    #[test]
    fn identity_symmetry_and_empty() {
        let other = "await page.goto('/login');\nawait expect(page).toHaveURL(/dashboard/);";
        assert_eq!(similarity(WAIT_A, WAIT_A), 1.0);
        assert_eq!(similarity(WAIT_A, other), similarity(other, WAIT_A));
        assert_eq!(similarity("", WAIT_A), 0.0);
        assert_eq!(similarity(WAIT_A, "   \n  "), 0.0);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn similarity_is_bounded() {
        let samples = [
            WAIT_A,
            WAIT_B,
            "x",
            "await page.fill('#email', 'a@b.c');",
            "for (let i = 0; i < 10; i++) {\n  total += i;\n}",
        ];
        for a in samples {
            for b in samples {
                let s = similarity(a, b);
                assert!((0.0..=1.0).contains(&s), "{s} out of range for {a:?} / {b:?}");
            }
        }
    }

    #[test]
    fn line_count_penalizes_different_shape() {
        let one = "await page.click(STR);";
        let three = "await page.click(STR);\nawait page.click(STR);\nawait page.click(STR);";
        let s = similarity(one, three);
        // Same token set, one third the lines.
        assert!((s - (0.8 + 0.2 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn near_duplicates_sorted_and_thresholded() {
        let items = vec![
            ("COMP001", WAIT_B.to_string()),
            ("COMP002", "await page.goto('/');".to_string()),
        ];
        let found = find_near_duplicates(WAIT_A, items, 0.8);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "COMP001");
        assert_eq!(found[0].similarity, 1.0);
    }

    #[test]
    fn keyword_overlap_fraction() {
        let q = keywords("flaky save button selector");
        assert_eq!(q.len(), 4);
        let overlap = keyword_overlap(&q, "Use role selector for the Save button");
        assert!((overlap - 0.75).abs() < 1e-9);
        assert_eq!(keyword_overlap(&BTreeSet::new(), "anything"), 0.0);
    }
}
