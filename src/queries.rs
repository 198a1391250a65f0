use crate::cache::{CachePayload, CachedQueryRunner};
use crate::config::QueryTtls;
use crate::model::{ISO_DATETIME_FORMAT, ShowCollection};
use crate::store::load_collection;
use anyhow::Result;
use chrono::{Datelike, Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const THEATRE_STATS_LIMIT: usize = 15;
pub const UPCOMING_DAYS_LIMIT: usize = 20;
pub const UPCOMING_SHOWS_PER_DAY: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheatreStat {
    pub theatre: String,
    pub play_count: usize,
    pub avg_duration: f64,
    pub duration_range: String,
    pub total_shows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreStat {
    pub genre: String,
    pub total_plays: usize,
    pub theatre_count: usize,
    pub total_shows: usize,
    pub avg_duration: Option<f64>,
    pub avg_shows_per_play: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingShow {
    pub name: String,
    pub theatre: String,
    pub genre: String,
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingDay {
    pub date: String,
    pub play_count: usize,
    pub plays: Vec<UpcomingShow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorStat {
    pub actor: String,
    pub play_count: usize,
    pub total_shows: usize,
    pub genre_count: usize,
    pub theatre_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorStat {
    pub director: String,
    pub play_count: usize,
    pub total_shows: usize,
    pub theatre_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthStat {
    pub period: String,
    pub year: i32,
    pub month: u32,
    pub show_count: usize,
    pub play_count: usize,
}

impl CachePayload for Vec<TheatreStat> {
    const KIND: &'static str = "theatre_stats";
}

impl CachePayload for Vec<GenreStat> {
    const KIND: &'static str = "genre_stats";
}

impl CachePayload for Vec<UpcomingDay> {
    const KIND: &'static str = "upcoming_shows";
}

impl CachePayload for Vec<ActorStat> {
    const KIND: &'static str = "top_actors";
}

impl CachePayload for Vec<DirectorStat> {
    const KIND: &'static str = "popular_directors";
}

impl CachePayload for Vec<MonthStat> {
    const KIND: &'static str = "date_distribution";
}

pub fn theatre_stats(collection: &ShowCollection, unspecified: &str) -> Vec<TheatreStat> {
    #[derive(Default)]
    struct Acc {
        plays: usize,
        minutes: Vec<u32>,
        shows: usize,
    }

    let mut groups: BTreeMap<&str, Acc> = BTreeMap::new();
    for record in collection.records() {
        if record.venue.is_empty() || record.venue == unspecified {
            continue;
        }
        let Some(minutes) = record.duration_minutes else {
            continue;
        };
        let acc = groups.entry(record.venue.as_str()).or_default();
        acc.plays += 1;
        acc.minutes.push(minutes);
        acc.shows += record.dates.len();
    }

    let mut stats = groups
        .into_iter()
        .map(|(theatre, acc)| {
            let min = acc.minutes.iter().min().copied().unwrap_or_default();
            let max = acc.minutes.iter().max().copied().unwrap_or_default();
            TheatreStat {
                theatre: theatre.to_string(),
                play_count: acc.plays,
                avg_duration: round1(mean(&acc.minutes).unwrap_or_default()),
                duration_range: format!("{min}-{max}"),
                total_shows: acc.shows,
            }
        })
        .collect::<Vec<_>>();
    stats.sort_by(|a, b| b.play_count.cmp(&a.play_count));
    stats.truncate(THEATRE_STATS_LIMIT);
    stats
}

pub fn genre_stats(collection: &ShowCollection) -> Vec<GenreStat> {
    #[derive(Default)]
    struct Acc<'a> {
        plays: usize,
        theatres: BTreeSet<&'a str>,
        shows: usize,
        minutes: Vec<u32>,
    }

    let mut groups: BTreeMap<&str, Acc<'_>> = BTreeMap::new();
    for record in collection.records() {
        if record.genre.is_empty() {
            continue;
        }
        let acc = groups.entry(record.genre.as_str()).or_default();
        acc.plays += 1;
        acc.theatres.insert(record.venue.as_str());
        acc.shows += record.dates.len();
        acc.minutes.extend(record.duration_minutes);
    }

    let mut stats = groups
        .into_iter()
        .map(|(genre, acc)| GenreStat {
            genre: genre.to_string(),
            total_plays: acc.plays,
            theatre_count: acc.theatres.len(),
            total_shows: acc.shows,
            avg_duration: mean(&acc.minutes).map(round1),
            avg_shows_per_play: round1(acc.shows as f64 / acc.plays as f64),
        })
        .collect::<Vec<_>>();
    stats.sort_by(|a, b| b.total_shows.cmp(&a.total_shows));
    stats
}

/// Show times in `[today, today + days)`, grouped by exact start time. At most 20 time slots
/// and 5 productions listed per slot; `play_count` still counts every production.
pub fn upcoming_shows(collection: &ShowCollection, today: NaiveDate, days: u32) -> Vec<UpcomingDay> {
    let start = today.and_time(NaiveTime::MIN);
    let Some(end) = today
        .checked_add_days(Days::new(u64::from(days)))
        .map(|day| day.and_time(NaiveTime::MIN))
    else {
        return Vec::new();
    };

    let mut slots: BTreeMap<_, Vec<UpcomingShow>> = BTreeMap::new();
    for record in collection.records() {
        for date in record.dates.iter().filter(|d| **d >= start && **d < end) {
            slots.entry(*date).or_default().push(UpcomingShow {
                name: record.title.clone(),
                theatre: record.venue.clone(),
                genre: record.genre.clone(),
                duration: record.duration_minutes,
            });
        }
    }

    slots
        .into_iter()
        .take(UPCOMING_DAYS_LIMIT)
        .map(|(date, mut plays)| {
            let play_count = plays.len();
            plays.truncate(UPCOMING_SHOWS_PER_DAY);
            UpcomingDay {
                date: date.format(ISO_DATETIME_FORMAT).to_string(),
                play_count,
                plays,
            }
        })
        .collect()
}

pub fn top_actors(collection: &ShowCollection, limit: usize) -> Vec<ActorStat> {
    #[derive(Default)]
    struct Acc<'a> {
        plays: usize,
        shows: usize,
        genres: BTreeSet<&'a str>,
        theatres: BTreeSet<&'a str>,
    }

    let mut groups: BTreeMap<&str, Acc<'_>> = BTreeMap::new();
    for record in collection.records() {
        for actor in record.performers.iter().filter(|a| !a.is_empty()) {
            let acc = groups.entry(actor.as_str()).or_default();
            acc.plays += 1;
            acc.shows += record.dates.len();
            acc.genres.insert(record.genre.as_str());
            acc.theatres.insert(record.venue.as_str());
        }
    }

    let mut stats = groups
        .into_iter()
        .map(|(actor, acc)| ActorStat {
            actor: actor.to_string(),
            play_count: acc.plays,
            total_shows: acc.shows,
            genre_count: acc.genres.len(),
            theatre_count: acc.theatres.len(),
        })
        .collect::<Vec<_>>();
    stats.sort_by(|a, b| b.play_count.cmp(&a.play_count));
    stats.truncate(limit);
    stats
}

pub fn popular_directors(
    collection: &ShowCollection,
    unspecified: &str,
    limit: usize,
) -> Vec<DirectorStat> {
    #[derive(Default)]
    struct Acc<'a> {
        plays: usize,
        shows: usize,
        theatres: BTreeSet<&'a str>,
    }

    let mut groups: BTreeMap<&str, Acc<'_>> = BTreeMap::new();
    for record in collection.records().filter(|r| r.has_director(unspecified)) {
        let acc = groups.entry(record.director.as_str()).or_default();
        acc.plays += 1;
        acc.shows += record.dates.len();
        acc.theatres.insert(record.venue.as_str());
    }

    let mut stats = groups
        .into_iter()
        .map(|(director, acc)| DirectorStat {
            director: director.to_string(),
            play_count: acc.plays,
            total_shows: acc.shows,
            theatre_count: acc.theatres.len(),
        })
        .collect::<Vec<_>>();
    stats.sort_by(|a, b| b.play_count.cmp(&a.play_count));
    stats.truncate(limit);
    stats
}

pub fn date_distribution(collection: &ShowCollection, month_names: &[String]) -> Vec<MonthStat> {
    let mut groups: BTreeMap<(i32, u32), (usize, BTreeSet<&str>)> = BTreeMap::new();
    for stored in collection.shows.values() {
        for date in &stored.record.dates {
            let entry = groups.entry((date.year(), date.month())).or_default();
            entry.0 += 1;
            entry.1.insert(stored.id.as_str());
        }
    }

    groups
        .into_iter()
        .map(|((year, month), (shows, plays))| {
            let name = month_names
                .get(month as usize - 1)
                .map(|name| capitalize(name))
                .unwrap_or_else(|| month.to_string());
            MonthStat {
                period: format!("{name} {year}"),
                year,
                month,
                show_count: shows,
                play_count: plays.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    TheatreStats,
    GenreStats,
    UpcomingShows { days: u32 },
    TopActors { limit: usize },
    PopularDirectors { limit: usize },
    DateDistribution,
}

impl QueryKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TheatreStats => "theatre_stats",
            Self::GenreStats => "genre_stats",
            Self::UpcomingShows { .. } => "upcoming_shows",
            Self::TopActors { .. } => "top_actors",
            Self::PopularDirectors { .. } => "popular_directors",
            Self::DateDistribution => "date_distribution",
        }
    }

    // The upcoming window starts at `today`, so the date is part of its key.
    pub fn params(&self, today: NaiveDate) -> Option<Value> {
        match self {
            Self::UpcomingShows { days } => Some(json!({
                "days": days,
                "today": today.format("%Y-%m-%d").to_string(),
            })),
            Self::TopActors { limit } | Self::PopularDirectors { limit } => {
                Some(json!({ "limit": limit }))
            }
            Self::TheatreStats | Self::GenreStats | Self::DateDistribution => None,
        }
    }

    pub fn ttl_secs(&self, ttls: &QueryTtls) -> u64 {
        match self {
            Self::TheatreStats => ttls.theatre_stats,
            Self::GenreStats => ttls.genre_stats,
            Self::UpcomingShows { .. } => ttls.upcoming_shows,
            Self::TopActors { .. } => ttls.top_actors,
            Self::PopularDirectors { .. } => ttls.popular_directors,
            Self::DateDistribution => ttls.date_distribution,
        }
    }
}

pub struct CachedQueries<'a> {
    runner: &'a CachedQueryRunner,
    collection_path: PathBuf,
    ttls: QueryTtls,
    unspecified: String,
    month_names: Vec<String>,
    today: NaiveDate,
}

impl<'a> CachedQueries<'a> {
    pub fn new(
        runner: &'a CachedQueryRunner,
        collection_path: &Path,
        ttls: &QueryTtls,
        unspecified: &str,
        month_names: &[String],
        today: NaiveDate,
    ) -> Self {
        Self {
            runner,
            collection_path: collection_path.to_path_buf(),
            ttls: ttls.clone(),
            unspecified: unspecified.to_string(),
            month_names: month_names.to_vec(),
            today,
        }
    }

    pub fn runner(&self) -> &CachedQueryRunner {
        self.runner
    }

    pub fn theatre_stats(&self) -> Result<Vec<TheatreStat>> {
        self.cached(QueryKind::TheatreStats, |c| {
            theatre_stats(c, &self.unspecified)
        })
    }

    pub fn genre_stats(&self) -> Result<Vec<GenreStat>> {
        self.cached(QueryKind::GenreStats, genre_stats)
    }

    pub fn upcoming_shows(&self, days: u32) -> Result<Vec<UpcomingDay>> {
        self.cached(QueryKind::UpcomingShows { days }, |c| {
            upcoming_shows(c, self.today, days)
        })
    }

    pub fn top_actors(&self, limit: usize) -> Result<Vec<ActorStat>> {
        self.cached(QueryKind::TopActors { limit }, |c| top_actors(c, limit))
    }

    pub fn popular_directors(&self, limit: usize) -> Result<Vec<DirectorStat>> {
        self.cached(QueryKind::PopularDirectors { limit }, |c| {
            popular_directors(c, &self.unspecified, limit)
        })
    }

    pub fn date_distribution(&self) -> Result<Vec<MonthStat>> {
        self.cached(QueryKind::DateDistribution, |c| {
            date_distribution(c, &self.month_names)
        })
    }

    pub fn run(&self, kind: QueryKind) -> Result<Value> {
        let value = match kind {
            QueryKind::TheatreStats => serde_json::to_value(self.theatre_stats()?)?,
            QueryKind::GenreStats => serde_json::to_value(self.genre_stats()?)?,
            QueryKind::UpcomingShows { days } => serde_json::to_value(self.upcoming_shows(days)?)?,
            QueryKind::TopActors { limit } => serde_json::to_value(self.top_actors(limit)?)?,
            QueryKind::PopularDirectors { limit } => {
                serde_json::to_value(self.popular_directors(limit)?)?
            }
            QueryKind::DateDistribution => serde_json::to_value(self.date_distribution()?)?,
        };
        Ok(value)
    }

    pub fn invalidate(&self, kind: QueryKind) -> bool {
        self.runner
            .invalidate(kind.name(), kind.params(self.today).as_ref())
    }

    fn cached<T, F>(&self, kind: QueryKind, aggregate: F) -> Result<T>
    where
        T: CachePayload,
        F: FnOnce(&ShowCollection) -> T,
    {
        let params = kind.params(self.today);
        self.runner.get_or_compute(
            kind.name(),
            params.as_ref(),
            Some(kind.ttl_secs(&self.ttls)),
            || {
                let collection = load_collection(&self.collection_path)?;
                Ok(aggregate(&collection))
            },
        )
    }
}

fn mean(values: &[u32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let total: u64 = values.iter().map(|v| u64::from(*v)).sum();
    Some(total as f64 / values.len() as f64)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractConfig;
    use crate::model::ShowRecord;
    use crate::store::save_collection;
    use chrono::{NaiveDateTime, TimeZone, Utc};
    use tempfile::tempdir;

    const NONE: &str = "unspecified";

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, ISO_DATETIME_FORMAT).unwrap()
    }

    fn show(
        slug: &str,
        venue: &str,
        genre: &str,
        director: &str,
        actors: &[&str],
        dates: &[&str],
        minutes: Option<u32>,
    ) -> ShowRecord {
        ShowRecord {
            url: format!("https://msk.kassir.ru/teatr/{slug}"),
            title: slug.to_string(),
            venue: venue.to_string(),
            director: director.to_string(),
            performers: actors.iter().map(ToString::to_string).collect(),
            dates: dates.iter().map(|d| at(d)).collect(),
            genre: genre.to_string(),
            duration_minutes: minutes,
            age_rating: "0+".to_string(),
            description: String::new(),
        }
    }

    fn collection() -> ShowCollection {
        let now = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
        let mut collection = ShowCollection::default();
        for record in [
            show(
                "chayka",
                "МХТ",
                "Драма",
                "Иван Петров",
                &["Анна Козлова", "Олег Сидоров"],
                &["2024-11-05T19:00:00", "2024-11-20T19:00:00", "2024-12-01T18:00:00"],
                Some(150),
            ),
            show(
                "revizor",
                "МХТ",
                "Комедия",
                "Иван Петров",
                &["Анна Козлова"],
                &["2024-11-05T19:00:00"],
                Some(90),
            ),
            show(
                "bal",
                NONE,
                "Драма",
                NONE,
                &["Олег Сидоров", "Анна Козлова"],
                &["2024-11-06T12:00:00"],
                Some(60),
            ),
            show("vecher", "Ленком", "Спектакль", NONE, &[], &["2024-11-07T19:00:00"], None),
        ] {
            collection.upsert(record, now);
        }
        collection
    }

    #[test]
    fn theatre_stats_skip_sentinel_and_unknown_duration() {
        let stats = theatre_stats(&collection(), NONE);
        assert_eq!(
            stats,
            vec![TheatreStat {
                theatre: "МХТ".to_string(),
                play_count: 2,
                avg_duration: 120.0,
                duration_range: "90-150".to_string(),
                total_shows: 4,
            }]
        );
    }

    #[test]
    fn genre_stats_order_by_scheduled_shows() {
        let stats = genre_stats(&collection());
        assert_eq!(stats[0].genre, "Драма");
        assert_eq!(stats[0].total_plays, 2);
        assert_eq!(stats[0].theatre_count, 2);
        assert_eq!(stats[0].total_shows, 4);
        assert_eq!(stats[0].avg_duration, Some(105.0));
        assert_eq!(stats[0].avg_shows_per_play, 2.0);

        let plain = stats.iter().find(|s| s.genre == "Спектакль").unwrap();
        assert_eq!(plain.avg_duration, None);
    }

    #[test]
    fn upcoming_shows_group_by_start_time() {
        let today = NaiveDate::from_ymd_opt(2024, 11, 5).unwrap();
        let days = upcoming_shows(&collection(), today, 2);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, "2024-11-05T19:00:00");
        assert_eq!(days[0].play_count, 2);
        assert_eq!(days[1].date, "2024-11-06T12:00:00");
        assert_eq!(days[1].plays[0].theatre, NONE);

        assert!(upcoming_shows(&collection(), today, 0).is_empty());
    }

    #[test]
    fn top_actors_and_directors() {
        let actors = top_actors(&collection(), 1);
        assert_eq!(
            actors,
            vec![ActorStat {
                actor: "Анна Козлова".to_string(),
                play_count: 3,
                total_shows: 5,
                genre_count: 2,
                theatre_count: 2,
            }]
        );

        let directors = popular_directors(&collection(), NONE, 10);
        assert_eq!(directors.len(), 1);
        assert_eq!(directors[0].director, "Иван Петров");
        assert_eq!(directors[0].play_count, 2);
    }

    #[test]
    fn date_distribution_names_months() {
        let months = ExtractConfig::default().months;
        let stats = date_distribution(&collection(), &months);
        let periods = stats.iter().map(|s| s.period.as_str()).collect::<Vec<_>>();
        assert_eq!(periods, vec!["Ноябрь 2024", "Декабрь 2024"]);
        assert_eq!(stats[0].show_count, 5);
        assert_eq!(stats[0].play_count, 4);
        assert_eq!(stats[1].play_count, 1);
    }

    #[test]
    fn cached_queries_skip_reload_on_hit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shows.json");
        save_collection(&path, &collection()).unwrap();

        let runner = CachedQueryRunner::new(None, "theater:", 60);
        let months = ExtractConfig::default().months;
        let today = NaiveDate::from_ymd_opt(2024, 11, 5).unwrap();
        let queries =
            CachedQueries::new(&runner, &path, &QueryTtls::default(), NONE, &months, today);

        let first = queries.top_actors(5).unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = queries.top_actors(5).unwrap();
        assert_eq!(first, second);

        assert!(queries.invalidate(QueryKind::TopActors { limit: 5 }));
        assert!(queries.top_actors(5).unwrap().is_empty());
    }

    #[test]
    fn upcoming_window_is_keyed_by_day() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shows.json");
        save_collection(&path, &collection()).unwrap();

        let runner = CachedQueryRunner::new(None, "theater:", 60);
        let months = ExtractConfig::default().months;
        let ttls = QueryTtls::default();
        let day = |d| NaiveDate::from_ymd_opt(2024, 11, d).unwrap();

        let early = CachedQueries::new(&runner, &path, &ttls, NONE, &months, day(5));
        let later = CachedQueries::new(&runner, &path, &ttls, NONE, &months, day(20));

        let first = early.upcoming_shows(1).unwrap();
        let second = later.upcoming_shows(1).unwrap();
        assert!(first[0].date.starts_with("2024-11-05"));
        assert!(second[0].date.starts_with("2024-11-20"));
        assert_eq!(runner.stats().keys_by_query.get("upcoming_shows"), Some(&2));

        assert!(later.invalidate(QueryKind::UpcomingShows { days: 1 }));
        assert_eq!(runner.stats().keys_by_query.get("upcoming_shows"), Some(&1));
    }
}
