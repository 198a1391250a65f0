use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache.prefix.trim().is_empty() {
            bail!("cache.prefix must not be empty");
        }
        if self.cache.default_ttl_secs == 0 {
            bail!("cache.default_ttl_secs must be positive");
        }
        if self.listing.max_pages == 0 {
            bail!("listing.max_pages must be at least 1");
        }
        if self.fetch.retry_attempts == 0 {
            bail!("fetch.retry_attempts must be at least 1");
        }
        if url::Url::parse(&self.listing.base_url).is_err() {
            bail!("listing.base_url is not a valid url: {}", self.listing.base_url);
        }
        self.extract.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u8,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: default_user_agent(),
            headers: default_headers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_listing_path")]
    pub listing_path: String,
    #[serde(default = "default_show_path_prefix")]
    pub show_path_prefix: String,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_excluded_url_words")]
    pub excluded_url_words: Vec<String>,
    #[serde(default = "default_source_label")]
    pub source_label: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_calendar_days")]
    pub calendar_days: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            listing_path: default_listing_path(),
            show_path_prefix: default_show_path_prefix(),
            categories: default_categories(),
            excluded_url_words: default_excluded_url_words(),
            source_label: default_source_label(),
            max_pages: default_max_pages(),
            page_param: default_page_param(),
            calendar_days: default_calendar_days(),
        }
    }
}

impl ListingConfig {
    pub fn listing_urls(&self) -> Vec<String> {
        let root = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.listing_path
        );
        let mut urls = vec![root.clone()];
        for category in &self.categories {
            urls.push(format!("{}/{}", root.trim_end_matches('/'), category));
        }
        urls
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_urls_file")]
    pub urls_file: PathBuf,
    #[serde(default = "default_dump_file")]
    pub dump_file: PathBuf,
    #[serde(default = "default_collection_file")]
    pub collection_file: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            urls_file: default_urls_file(),
            dump_file: default_dump_file(),
            collection_file: default_collection_file(),
            cache_dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default)]
    pub ttl: QueryTtls,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_cache_prefix(),
            default_ttl_secs: default_ttl_secs(),
            ttl: QueryTtls::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryTtls {
    #[serde(default = "default_half_hour")]
    pub theatre_stats: u64,
    #[serde(default = "default_half_hour")]
    pub genre_stats: u64,
    #[serde(default = "default_upcoming_ttl")]
    pub upcoming_shows: u64,
    #[serde(default = "default_ttl_secs")]
    pub top_actors: u64,
    #[serde(default = "default_ttl_secs")]
    pub popular_directors: u64,
    #[serde(default = "default_distribution_ttl")]
    pub date_distribution: u64,
}

impl Default for QueryTtls {
    fn default() -> Self {
        Self {
            theatre_stats: default_half_hour(),
            genre_stats: default_half_hour(),
            upcoming_shows: default_upcoming_ttl(),
            top_actors: default_ttl_secs(),
            popular_directors: default_ttl_secs(),
            date_distribution: default_distribution_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GenreRule {
    pub keyword: String,
    pub genre: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_unspecified")]
    pub unspecified: String,
    #[serde(default = "default_age_rating")]
    pub default_age_rating: String,
    #[serde(default = "default_genre")]
    pub default_genre: String,
    #[serde(default = "default_show_time")]
    pub default_show_time: String,
    #[serde(default = "default_title_separators")]
    pub title_separators: Vec<String>,
    #[serde(default = "default_venue_suffix_pattern")]
    pub venue_suffix_pattern: String,
    #[serde(default = "default_director_markers")]
    pub director_markers: Vec<String>,
    #[serde(default = "default_director_stopwords")]
    pub director_stopwords: Vec<String>,
    #[serde(default = "default_director_line_max")]
    pub director_line_max: usize,
    #[serde(default = "default_director_window")]
    pub director_window: usize,
    #[serde(default = "default_performers_heading")]
    pub performers_heading: String,
    #[serde(default = "default_schedule_heading")]
    pub schedule_heading: String,
    #[serde(default = "default_duration_label")]
    pub duration_label: String,
    #[serde(default = "default_performer_stopwords")]
    pub performer_stopwords: Vec<String>,
    #[serde(default = "default_place_stopwords")]
    pub place_stopwords: Vec<String>,
    #[serde(default = "default_name_stopwords")]
    pub name_stopwords: Vec<String>,
    #[serde(default = "default_name_stop_patterns")]
    pub name_stop_patterns: Vec<String>,
    #[serde(default = "default_genres")]
    pub genres: Vec<GenreRule>,
    #[serde(default = "default_months")]
    pub months: Vec<String>,
    #[serde(default = "default_months_genitive")]
    pub months_genitive: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            unspecified: default_unspecified(),
            default_age_rating: default_age_rating(),
            default_genre: default_genre(),
            default_show_time: default_show_time(),
            title_separators: default_title_separators(),
            venue_suffix_pattern: default_venue_suffix_pattern(),
            director_markers: default_director_markers(),
            director_stopwords: default_director_stopwords(),
            director_line_max: default_director_line_max(),
            director_window: default_director_window(),
            performers_heading: default_performers_heading(),
            schedule_heading: default_schedule_heading(),
            duration_label: default_duration_label(),
            performer_stopwords: default_performer_stopwords(),
            place_stopwords: default_place_stopwords(),
            name_stopwords: default_name_stopwords(),
            name_stop_patterns: default_name_stop_patterns(),
            genres: default_genres(),
            months: default_months(),
            months_genitive: default_months_genitive(),
        }
    }
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<()> {
        if self.unspecified.trim().is_empty() {
            bail!("extract.unspecified must not be empty");
        }
        if self.months.len() != 12 {
            bail!("extract.months must list 12 month names, got {}", self.months.len());
        }
        if self.months_genitive.len() != 12 {
            bail!(
                "extract.months_genitive must list 12 month names, got {}",
                self.months_genitive.len()
            );
        }
        if self.director_markers.is_empty() {
            bail!("extract.director_markers must not be empty");
        }
        let age = Regex::new(r"^\d{1,2}\+$").context("age rating check regex")?;
        if !age.is_match(&self.default_age_rating) {
            bail!(
                "extract.default_age_rating must look like 12+, got {}",
                self.default_age_rating
            );
        }
        self.show_time()?;
        Regex::new(&self.venue_suffix_pattern).with_context(|| {
            format!("invalid extract.venue_suffix_pattern {}", self.venue_suffix_pattern)
        })?;
        for pattern in &self.name_stop_patterns {
            Regex::new(pattern)
                .with_context(|| format!("invalid extract.name_stop_patterns entry {pattern}"))?;
        }
        Ok(())
    }

    pub fn show_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.default_show_time, "%H:%M").with_context(|| {
            format!(
                "extract.default_show_time must be HH:MM, got {}",
                self.default_show_time
            )
        })
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!(config = %path.display(), "config file not found; using built-in defaults");
        return Ok(AppConfig::default());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let config: AppConfig = toml::from_str(&text)
        .with_context(|| format!("failed to parse toml in {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_attempts() -> u8 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_request_delay_ms() -> u64 {
    3000
}

fn default_user_agent() -> Option<String> {
    Some(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/120.0.0.0 Safari/537.36"
            .to_string(),
    )
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        (
            "Accept-Language".to_string(),
            "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
        ),
    ])
}

fn default_base_url() -> String {
    "https://msk.kassir.ru".to_string()
}

fn default_listing_path() -> String {
    "/bilety-v-teatr".to_string()
}

fn default_show_path_prefix() -> String {
    "/teatr/".to_string()
}

fn default_categories() -> Vec<String> {
    [
        "myuzikl",
        "drama",
        "komediya",
        "balet",
        "opera",
        "detektiv",
        "skazki",
        "melodrama",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_excluded_url_words() -> Vec<String> {
    vec!["category".to_string(), "tag".to_string(), "author".to_string()]
}

fn default_source_label() -> String {
    "kassir.ru".to_string()
}

fn default_max_pages() -> u32 {
    5
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_calendar_days() -> u32 {
    30
}

fn default_urls_file() -> PathBuf {
    PathBuf::from("data/play_urls.txt")
}

fn default_dump_file() -> PathBuf {
    PathBuf::from("data/plays.json")
}

fn default_collection_file() -> PathBuf {
    PathBuf::from("data/state/shows.json")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_cache_prefix() -> String {
    "theater:".to_string()
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_half_hour() -> u64 {
    1800
}

fn default_upcoming_ttl() -> u64 {
    300
}

fn default_distribution_ttl() -> u64 {
    7200
}

fn default_unspecified() -> String {
    "unspecified".to_string()
}

fn default_age_rating() -> String {
    "0+".to_string()
}

fn default_genre() -> String {
    "Спектакль".to_string()
}

fn default_show_time() -> String {
    "19:00".to_string()
}

fn default_title_separators() -> Vec<String> {
    [" - ", " – ", " — ", " | "]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_venue_suffix_pattern() -> String {
    r"(?i)\s*[—\-\.]\s*расписание.*".to_string()
}

fn default_director_markers() -> Vec<String> {
    ["Режиссер", "Режиссёр", "Постановка"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_director_stopwords() -> Vec<String> {
    ["место", "проведения", "зал", "театр", "сцена"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_director_line_max() -> usize {
    150
}

fn default_director_window() -> usize {
    200
}

fn default_performers_heading() -> String {
    "Исполнители".to_string()
}

fn default_schedule_heading() -> String {
    "Расписание".to_string()
}

fn default_duration_label() -> String {
    "Продолжительность".to_string()
}

fn default_performer_stopwords() -> Vec<String> {
    [
        "режиссер",
        "продолжительность",
        "цена",
        "билет",
        "место",
        "время",
        "дата",
        "купить",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_place_stopwords() -> Vec<String> {
    ["город", "страна", "улица", "площадь"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_name_stopwords() -> Vec<String> {
    [
        "афиша",
        "расписание",
        "сертификат",
        "организатор",
        "реклама",
        "песни",
        "христа",
        "спасителя",
        "октябрь",
        "москвы",
        "контакты",
        "залы",
        "класс",
        "место",
        "актера",
        "театр",
        "имени",
        "сцена",
        "центральный",
        "большой",
        "зал",
        "историческая",
        "московский",
        "основная",
        "исполнители",
        "дом музыки",
        "елисейских",
        "международный",
        "граф орлов",
        "солнце ландау",
        "вахтангова",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_name_stop_patterns() -> Vec<String> {
    vec![
        r"^[А-ЯЁ]{2,}\s+[А-ЯЁ][а-яё]+$".to_string(),
        r"(?i)театр.*им".to_string(),
        r"(?i)сртеатр".to_string(),
    ]
}

fn default_genres() -> Vec<GenreRule> {
    [
        ("мюзикл", "Мюзикл"),
        ("мелодрама", "Мелодрама"),
        ("драма", "Драма"),
        ("комедия", "Комедия"),
        ("трагедия", "Трагедия"),
        ("детектив", "Детектив"),
        ("шоу", "Шоу"),
        ("оперетта", "Оперетта"),
        ("опера", "Опера"),
        ("балет", "Балет"),
    ]
    .iter()
    .map(|(keyword, genre)| GenreRule {
        keyword: keyword.to_string(),
        genre: genre.to_string(),
    })
    .collect()
}

fn default_months() -> Vec<String> {
    [
        "январь", "февраль", "март", "апрель", "май", "июнь", "июль", "август", "сентябрь",
        "октябрь", "ноябрь", "декабрь",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_months_genitive() -> Vec<String> {
    [
        "января", "февраля", "марта", "апреля", "мая", "июня", "июля", "августа", "сентября",
        "октября", "ноября", "декабря",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [cache]
            prefix = "playbill:"

            [extract]
            unspecified = "Не указан"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.prefix, "playbill:");
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert_eq!(config.cache.ttl.upcoming_shows, 300);
        assert_eq!(config.cache.ttl.date_distribution, 7200);
        assert_eq!(config.extract.unspecified, "Не указан");
        assert_eq!(config.extract.months.len(), 12);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_short_month_table() {
        let mut config = AppConfig::default();
        config.extract.months.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_broken_stop_pattern() {
        let mut config = AppConfig::default();
        config.extract.name_stop_patterns.push("([".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn listing_urls_include_categories() {
        let listing = ListingConfig {
            categories: vec!["drama".to_string()],
            ..ListingConfig::default()
        };
        assert_eq!(
            listing.listing_urls(),
            vec![
                "https://msk.kassir.ru/bilety-v-teatr".to_string(),
                "https://msk.kassir.ru/bilety-v-teatr/drama".to_string(),
            ]
        );
    }
}
