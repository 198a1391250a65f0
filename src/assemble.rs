use crate::config::ExtractConfig;
use crate::dates::normalize_dates;
use crate::model::{ShowFields, ShowRecord};
use crate::names::same_name;
use crate::normalize::normalize_text;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static AGE_RATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}\+$").expect("age rating regex must be valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("{url}: no title found")]
    MissingTitle { url: String },
    #[error("{url}: no show dates found")]
    MissingDates { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDefaults {
    pub unspecified: String,
    pub genre: String,
    pub age_rating: String,
}

impl From<&ExtractConfig> for RecordDefaults {
    fn from(config: &ExtractConfig) -> Self {
        Self {
            unspecified: config.unspecified.clone(),
            genre: config.default_genre.clone(),
            age_rating: config.default_age_rating.clone(),
        }
    }
}

pub fn assemble(fields: ShowFields, defaults: &RecordDefaults) -> Result<ShowRecord, ValidationFailure> {
    let title = fields
        .title
        .as_deref()
        .map(normalize_text)
        .filter(|title| !title.is_empty())
        .ok_or_else(|| ValidationFailure::MissingTitle {
            url: fields.url.clone(),
        })?;

    let dates = normalize_dates(fields.dates);
    if dates.is_empty() {
        return Err(ValidationFailure::MissingDates { url: fields.url });
    }

    let director = present(fields.director).unwrap_or_else(|| defaults.unspecified.clone());
    let has_director = director != defaults.unspecified;

    let mut performers: Vec<String> = Vec::with_capacity(fields.performers.len());
    for performer in fields.performers {
        let performer = performer.trim().to_string();
        if performer.is_empty() || performers.contains(&performer) {
            continue;
        }
        if has_director && same_name(&performer, &director) {
            continue;
        }
        performers.push(performer);
    }

    let age_rating = present(fields.age_rating)
        .filter(|rating| AGE_RATING_RE.is_match(rating))
        .unwrap_or_else(|| defaults.age_rating.clone());

    Ok(ShowRecord {
        url: fields.url,
        title,
        venue: present(fields.venue).unwrap_or_else(|| defaults.unspecified.clone()),
        director,
        performers,
        dates,
        genre: present(fields.genre).unwrap_or_else(|| defaults.genre.clone()),
        duration_minutes: fields.duration_minutes.filter(|minutes| *minutes > 0),
        age_rating,
        description: fields
            .description
            .as_deref()
            .map(normalize_text)
            .unwrap_or_default(),
    })
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn defaults() -> RecordDefaults {
        RecordDefaults::from(&ExtractConfig::default())
    }

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    fn fields() -> ShowFields {
        ShowFields {
            url: "https://msk.kassir.ru/teatr/chayka".to_string(),
            title: Some("  Чайка ".to_string()),
            dates: vec![at("2024-11-21T19:00:00"), at("2024-11-20T19:00:00")],
            ..ShowFields::default()
        }
    }

    #[test]
    fn minimal_fields_get_defaults() {
        let record = assemble(fields(), &defaults()).unwrap();
        assert_eq!(record.title, "Чайка");
        assert_eq!(record.venue, "unspecified");
        assert_eq!(record.director, "unspecified");
        assert_eq!(record.genre, "Спектакль");
        assert_eq!(record.age_rating, "0+");
        assert_eq!(record.description, "");
        assert_eq!(record.duration_minutes, None);
        assert_eq!(
            record.dates,
            vec![at("2024-11-20T19:00:00"), at("2024-11-21T19:00:00")]
        );
    }

    #[test]
    fn missing_title_or_dates_is_rejected() {
        let mut no_title = fields();
        no_title.title = Some("   ".to_string());
        assert_eq!(
            assemble(no_title, &defaults()),
            Err(ValidationFailure::MissingTitle {
                url: "https://msk.kassir.ru/teatr/chayka".to_string()
            })
        );

        let mut no_dates = fields();
        no_dates.dates.clear();
        assert!(matches!(
            assemble(no_dates, &defaults()),
            Err(ValidationFailure::MissingDates { .. })
        ));
    }

    #[test]
    fn director_never_appears_among_performers() {
        let mut input = fields();
        input.director = Some("Иван Петров".to_string());
        input.performers = vec![
            "Анна Козлова".to_string(),
            "Иван Петров".to_string(),
            "Анна Козлова".to_string(),
        ];
        let record = assemble(input, &defaults()).unwrap();
        assert_eq!(record.director, "Иван Петров");
        assert_eq!(record.performers, vec!["Анна Козлова"]);
    }

    #[test]
    fn invalid_optional_values_fall_back() {
        let mut input = fields();
        input.age_rating = Some("для всех".to_string());
        input.duration_minutes = Some(0);
        input.genre = Some(String::new());
        let record = assemble(input, &defaults()).unwrap();
        assert_eq!(record.age_rating, "0+");
        assert_eq!(record.duration_minutes, None);
        assert_eq!(record.genre, "Спектакль");
    }
}
