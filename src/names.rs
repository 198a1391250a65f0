//! The folding is a narrow suffix heuristic: it over-merges some distinct names and misses
//! most declension forms. Treat its hit rate as tunable, not guaranteed.

use crate::config::ExtractConfig;
use crate::normalize::strip_symbols;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

const MIN_NAME_CHARS: usize = 3;
const MAX_NAME_CHARS: usize = 30;
const MIN_PERFORMER_CHARS: usize = 5;

static CYRILLIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[А-ЯЁа-яё]").expect("cyrillic regex must be valid"));
static COMPOUND_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;/]|\s+и\s+").expect("compound split regex must be valid"));

#[derive(Debug, Clone)]
pub struct NameCleaner {
    stopwords: Vec<String>,
    stop_patterns: Vec<Regex>,
    performer_stopwords: Vec<String>,
    place_stopwords: Vec<String>,
}

impl NameCleaner {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        let stop_patterns = config
            .name_stop_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("invalid name stop pattern {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            stopwords: lowercase_all(&config.name_stopwords),
            stop_patterns,
            performer_stopwords: lowercase_all(&config.performer_stopwords),
            place_stopwords: lowercase_all(&config.place_stopwords),
        })
    }

    pub fn clean_names<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<String> {
        let mut cleaned = Vec::new();
        let mut seen = HashSet::new();

        for candidate in candidates {
            let candidate = candidate.as_ref().trim();
            if self.is_rejected(candidate) {
                continue;
            }

            let normalized = normalize_name_case(&strip_symbols(candidate));
            if self.is_rejected(&normalized) {
                continue;
            }

            let folded = fold_case_suffix(&normalized);
            if seen.contains(&normalized) || seen.contains(&folded) {
                continue;
            }

            seen.insert(normalized.clone());
            seen.insert(folded);
            cleaned.push(normalized);
        }

        cleaned
    }

    pub fn is_plausible_performer(&self, name: &str) -> bool {
        if name.chars().count() < MIN_PERFORMER_CHARS || name.split_whitespace().count() < 2 {
            return false;
        }
        let lower = name.to_lowercase();
        if self.performer_stopwords.iter().any(|word| lower.contains(word)) {
            return false;
        }
        CYRILLIC_RE.is_match(name)
    }

    pub fn is_place_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.place_stopwords.iter().any(|word| lower.contains(word))
    }

    fn is_rejected(&self, candidate: &str) -> bool {
        let chars = candidate.chars().count();
        if chars < MIN_NAME_CHARS || chars > MAX_NAME_CHARS {
            return true;
        }
        if candidate.chars().any(char::is_numeric) {
            return true;
        }
        if candidate.split_whitespace().count() < 2 {
            return true;
        }

        let lower = candidate.to_lowercase();
        if self.stopwords.iter().any(|word| lower.contains(word)) {
            return true;
        }
        self.stop_patterns
            .iter()
            .any(|pattern| pattern.is_match(candidate))
    }
}

pub fn split_name_list(raw: &str) -> Vec<String> {
    COMPOUND_SPLIT_RE
        .split(raw)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub fn normalize_name_case(name: &str) -> String {
    name.split_whitespace()
        .map(|token| {
            if is_all_caps(token) {
                title_case(token)
            } else if token.chars().next().is_some_and(char::is_uppercase) {
                token.to_string()
            } else {
                capitalize(token)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Base form used for dedup: trailing `ы` folds to `а`, trailing `и` folds to `я`.
pub fn fold_case_suffix(name: &str) -> String {
    if let Some(stem) = name.strip_suffix('ы') {
        return format!("{stem}а");
    }
    if let Some(stem) = name.strip_suffix('и') {
        return format!("{stem}я");
    }
    name.to_string()
}

pub fn same_name(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    a == b || fold_case_suffix(a) == fold_case_suffix(b)
}

fn is_all_caps(token: &str) -> bool {
    let mut cased = token.chars().filter(|c| c.is_alphabetic()).peekable();
    cased.peek().is_some() && cased.all(char::is_uppercase)
}

fn title_case(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut word_start = true;
    for ch in token.chars() {
        if ch.is_alphabetic() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = true;
        }
    }
    out
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words.iter().map(|word| word.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> NameCleaner {
        NameCleaner::new(&ExtractConfig::default()).unwrap()
    }

    #[test]
    fn rejects_short_numeric_single_and_long_candidates() {
        let names = cleaner().clean_names(&[
            "Ян",
            "Иван 2",
            "Иванов",
            "Константин Константинопольский-Верхнеудинский",
            "Иван Петров",
        ]);
        assert_eq!(names, vec!["Иван Петров"]);
    }

    #[test]
    fn rejects_denylisted_terms_and_structural_patterns() {
        let names = cleaner().clean_names(&[
            "Театр Вахтангова",
            "Основная сцена",
            "ДОМ Музыки",
            "АФИША Москвы",
            "Анна Козлова",
        ]);
        assert_eq!(names, vec!["Анна Козлова"]);
    }

    #[test]
    fn normalizes_case_and_symbols() {
        let names = cleaner().clean_names(&["ИВАН ПЕТРОВ", "«анна козлова»", "Мария-Луиза Ким"]);
        assert_eq!(names, vec!["Иван Петров", "Анна Козлова", "Мария-Луиза Ким"]);
    }

    #[test]
    fn case_variants_collapse_to_first_seen() {
        let names = cleaner().clean_names(&["Анна Иванова", "Анна Ивановы", "Олег Сидоров"]);
        assert_eq!(names, vec!["Анна Иванова", "Олег Сидоров"]);

        let names = cleaner().clean_names(&["Анна Ивановы", "Анна Иванова"]);
        assert_eq!(names, vec!["Анна Ивановы"]);

        let names = cleaner().clean_names(&["Мария Петрови", "Мария Петровя"]);
        assert_eq!(names, vec!["Мария Петрови"]);
    }

    #[test]
    fn clean_names_is_idempotent() {
        let input = [
            "ИВАН ПЕТРОВ",
            "иван петров",
            "и Петров",
            "Анна Ивановы",
            "Анна Иванова",
            "Сергей  Безруков!",
            "Театр им. Пушкина",
            "Олег Табаков",
        ];
        let once = cleaner().clean_names(&input);
        let twice = cleaner().clean_names(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn output_never_contains_denylisted_terms() {
        let config = ExtractConfig::default();
        let input = [
            "Большой Театр",
            "Зал Чайковского",
            "Анна Каренина",
            "Контакты Афиши",
            "Сцена Мастерская",
        ];
        let names = cleaner().clean_names(&input);
        for name in &names {
            let lower = name.to_lowercase();
            for word in &config.name_stopwords {
                assert!(!lower.contains(word.as_str()), "{name} contains {word}");
            }
        }
        assert_eq!(names, vec!["Анна Каренина"]);
    }

    #[test]
    fn performer_predicate() {
        let cleaner = cleaner();
        assert!(cleaner.is_plausible_performer("Иван Петров"));
        assert!(!cleaner.is_plausible_performer("Иван"));
        assert!(!cleaner.is_plausible_performer("Купить билет"));
        assert!(!cleaner.is_plausible_performer("John Smith"));
        assert!(cleaner.is_place_name("Красная площадь"));
    }

    #[test]
    fn splits_name_lists() {
        assert_eq!(
            split_name_list("Иван Петров, Анна Козлова и Олег Сидоров"),
            vec!["Иван Петров", "Анна Козлова", "Олег Сидоров"]
        );
    }

    #[test]
    fn folding_rules() {
        assert_eq!(fold_case_suffix("Анны"), "Анна");
        assert_eq!(fold_case_suffix("Марии"), "Мария");
        assert_eq!(fold_case_suffix("Олег"), "Олег");
        assert!(same_name("Анна Козловы", "Анна Козлова"));
        assert!(!same_name("Анна Козлова", "Олег Сидоров"));
    }
}
