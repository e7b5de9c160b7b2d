use regex::Regex;
use std::sync::OnceLock;

static ARTICLES: OnceLock<Regex> = OnceLock::new();
static DISALLOWED: OnceLock<Regex> = OnceLock::new();

fn articles() -> &'static Regex {
    ARTICLES.get_or_init(|| Regex::new(r"\b(a|an|the)\b").expect("article pattern is valid"))
}

fn disallowed() -> &'static Regex {
    DISALLOWED.get_or_init(|| Regex::new(r"[^\p{L}\p{N}\s\-–]").expect("charset pattern is valid"))
}

/// Canonical form used by exact match and token F1.
///
/// Lowercases, drops the articles `a`/`an`/`the` as whole words, strips every
/// character that is not a letter, digit, whitespace, hyphen or en-dash, then
/// collapses whitespace runs and trims.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_articles = articles().replace_all(&lowered, " ");
    let filtered = disallowed().replace_all(&without_articles, "");

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace tokens of the normalized text.
pub fn normalized_tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
