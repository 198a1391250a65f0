use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex must be valid"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex must be valid"));
static SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\-\.]").expect("symbol regex must be valid"));
static JOINED_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{Ll})(\p{Lu})").expect("joined name regex must be valid"));

pub fn normalize_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let without_tags = TAG_RE.replace_all(raw, "");
    collapse_whitespace(&without_tags)
}

pub fn collapse_whitespace(raw: &str) -> String {
    WHITESPACE_RE.replace_all(raw, " ").trim().to_string()
}

pub fn strip_symbols(raw: &str) -> String {
    let replaced = SYMBOL_RE.replace_all(raw, " ");
    collapse_whitespace(&replaced)
}

/// Splits glued name artifacts such as `Талгат БаталовШанель` and keeps the first two words.
pub fn fix_run_together_names(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let fixed = JOINED_NAME_RE.replace_all(raw, "$1 $2");
    let words = fixed.split_whitespace().collect::<Vec<_>>();
    if words.len() >= 2 {
        words[..2].join(" ")
    } else {
        words.join(" ")
    }
}

pub fn char_window(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
