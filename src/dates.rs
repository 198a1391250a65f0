use crate::config::ExtractConfig;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use std::sync::LazyLock;

static ISO_DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").expect("iso datetime regex must be valid")
});
static OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Z|[+-]\d{2}(?::?\d{2})?)$").expect("utc offset regex must be valid")
});
static WRITTEN_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s+([а-яё]+)\s+(\d{4})(?:,?\s+(\d{1,2}):(\d{2}))?")
        .expect("written date regex must be valid")
});
static ISO_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?").expect("iso duration regex must be valid")
});
static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*час").expect("hours regex must be valid"));
static MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*мин").expect("minutes regex must be valid"));

#[derive(Debug, Clone)]
pub struct MonthTable {
    nominative: Vec<String>,
    genitive: Vec<String>,
}

impl MonthTable {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            nominative: config.months.iter().map(|m| m.to_lowercase()).collect(),
            genitive: config.months_genitive.iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    pub fn month_number(&self, name: &str) -> Option<u32> {
        let name = name.trim().to_lowercase();
        self.nominative
            .iter()
            .position(|m| *m == name)
            .or_else(|| self.genitive.iter().position(|m| *m == name))
            .map(|idx| idx as u32 + 1)
    }
}

/// Schedule widgets show day and month only. December seen from October onwards belongs to
/// the next season's year.
pub fn infer_show_year(month: u32, today: NaiveDate) -> i32 {
    if month == 12 && today.month() >= 10 {
        today.year() + 1
    } else {
        today.year()
    }
}

pub fn schedule_date(
    day: &str,
    month_name: &str,
    months: &MonthTable,
    today: NaiveDate,
    show_time: NaiveTime,
) -> Option<NaiveDateTime> {
    let day = day.trim().parse::<u32>().ok()?;
    let month = months.month_number(month_name)?;
    let year = infer_show_year(month, today);
    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.and_time(show_time))
}

pub fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let (date_part, time_part) = value.trim().split_once('T')?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    let time_part = OFFSET_RE.replace(time_part, "");
    let time = NaiveTime::parse_from_str(&time_part, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(&time_part, "%H:%M"))
        .ok()?
        .with_nanosecond(0)?;
    Some(date.and_time(time))
}

pub fn find_iso_datetimes(text: &str) -> Vec<NaiveDateTime> {
    ISO_DATETIME_RE
        .find_iter(text)
        .filter_map(|m| parse_iso_datetime(m.as_str()))
        .collect()
}

pub fn find_written_dates(
    text: &str,
    months: &MonthTable,
    show_time: NaiveTime,
) -> Vec<NaiveDateTime> {
    let lower = text.to_lowercase();
    let mut dates = Vec::new();

    for caps in WRITTEN_DATE_RE.captures_iter(&lower) {
        let Some(month) = caps.get(2).and_then(|m| months.month_number(m.as_str())) else {
            continue;
        };
        let day = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let year = caps.get(3).and_then(|m| m.as_str().parse::<i32>().ok());
        let (Some(day), Some(year)) = (day, year) else {
            continue;
        };

        let time = match (caps.get(4), caps.get(5)) {
            (Some(hour), Some(minute)) => {
                let hour = hour.as_str().parse::<u32>().ok();
                let minute = minute.as_str().parse::<u32>().ok();
                match (hour, minute) {
                    (Some(h), Some(m)) => NaiveTime::from_hms_opt(h, m, 0),
                    _ => None,
                }
            }
            _ => Some(show_time),
        };

        if let (Some(date), Some(time)) = (NaiveDate::from_ymd_opt(year, month, day), time) {
            dates.push(date.and_time(time));
        }
    }

    dates
}

pub fn normalize_dates(mut dates: Vec<NaiveDateTime>) -> Vec<NaiveDateTime> {
    dates.sort();
    dates.dedup();
    dates
}

pub fn parse_iso_duration(value: &str) -> Option<u32> {
    let caps = ISO_DURATION_RE.captures(value.trim())?;
    let hours = capture_number(caps.get(1));
    let minutes = capture_number(caps.get(2));
    positive_total(hours, minutes)
}

/// `2 часа 30 минут` -> 150. Text without a recognizable unit yields `None`, never zero.
pub fn parse_duration_text(text: &str) -> Option<u32> {
    let hours = HOURS_RE.captures(text).map(|c| capture_number(c.get(1)));
    let minutes = MINUTES_RE.captures(text).map(|c| capture_number(c.get(1)));
    positive_total(hours.unwrap_or(0), minutes.unwrap_or(0))
}

pub fn duration_after_label(text: &str, label: &Regex) -> Option<u32> {
    let caps = label.captures(text)?;
    parse_duration_text(caps.get(1)?.as_str())
}

pub fn duration_label_regex(label: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i){}[:\s]*([^\n\.]+)", regex::escape(label)))
}

fn capture_number(m: Option<regex::Match<'_>>) -> u32 {
    m.and_then(|m| m.as_str().parse::<u32>().ok()).unwrap_or(0)
}

fn positive_total(hours: u32, minutes: u32) -> Option<u32> {
    let total = hours.saturating_mul(60).saturating_add(minutes);
    (total > 0).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn months() -> MonthTable {
        MonthTable::new(&ExtractConfig::default())
    }

    fn seven_pm() -> NaiveTime {
        NaiveTime::from_hms_opt(19, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn december_rolls_over_late_in_year() {
        assert_eq!(infer_show_year(12, date(2024, 10, 1)), 2025);
        assert_eq!(infer_show_year(12, date(2024, 12, 15)), 2025);
        assert_eq!(infer_show_year(12, date(2024, 9, 30)), 2024);
        assert_eq!(infer_show_year(11, date(2024, 11, 5)), 2024);
        assert_eq!(infer_show_year(1, date(2024, 11, 5)), 2024);
    }

    #[test]
    fn schedule_dates_use_month_table() {
        let today = date(2024, 11, 5);
        let parsed = schedule_date("7", "Декабрь", &months(), today, seven_pm()).unwrap();
        assert_eq!(parsed.to_string(), "2025-12-07 19:00:00");

        let parsed = schedule_date(" 20 ", "ноябрь", &months(), today, seven_pm()).unwrap();
        assert_eq!(parsed.to_string(), "2024-11-20 19:00:00");

        assert!(schedule_date("31", "февраль", &months(), today, seven_pm()).is_none());
        assert!(schedule_date("3", "смарт", &months(), today, seven_pm()).is_none());
        assert!(schedule_date("x", "март", &months(), today, seven_pm()).is_none());
    }

    #[test]
    fn iso_datetimes_drop_offsets() {
        let parsed = parse_iso_datetime("2024-11-20T19:00:00+03:00").unwrap();
        assert_eq!(parsed.to_string(), "2024-11-20 19:00:00");
        let parsed = parse_iso_datetime("2024-11-20T19:30").unwrap();
        assert_eq!(parsed.to_string(), "2024-11-20 19:30:00");
        let parsed = parse_iso_datetime("2024-11-20T19:30:00.000Z").unwrap();
        assert_eq!(parsed.to_string(), "2024-11-20 19:30:00");
        assert!(parse_iso_datetime("2024-11-20").is_none());
        assert!(parse_iso_datetime("2024-11-20T25:00:00").is_none());
    }

    #[test]
    fn finds_iso_datetimes_in_scripts() {
        let script = r#"{"sessions":[{"at":"2024-12-01T18:00:00"},{"at":"2024-12-02T19:00:00"}]}"#;
        let found = find_iso_datetimes(script);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn finds_written_dates() {
        let found = find_written_dates(
            "Показ 20 декабря 2024, 18:30 и 21 декабря 2024",
            &months(),
            seven_pm(),
        );
        let rendered = found.iter().map(|d| d.to_string()).collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec!["2024-12-20 18:30:00", "2024-12-21 19:00:00"]
        );
    }

    #[test]
    fn normalize_sorts_and_dedups() {
        let a = parse_iso_datetime("2024-11-21T19:00:00").unwrap();
        let b = parse_iso_datetime("2024-11-20T19:00:00").unwrap();
        assert_eq!(normalize_dates(vec![a, b, a]), vec![b, a]);
    }

    #[test]
    fn iso_durations() {
        assert_eq!(parse_iso_duration("PT1H45M"), Some(105));
        assert_eq!(parse_iso_duration("PT2H"), Some(120));
        assert_eq!(parse_iso_duration("PT50M"), Some(50));
        assert_eq!(parse_iso_duration("PT0M"), None);
        assert_eq!(parse_iso_duration("P1D"), None);
    }

    #[test]
    fn text_durations() {
        assert_eq!(parse_duration_text("2 часа 30 минут"), Some(150));
        assert_eq!(parse_duration_text("1 час"), Some(60));
        assert_eq!(parse_duration_text("90 минут"), Some(90));
        assert_eq!(parse_duration_text("около двух часов"), None);
        assert_eq!(parse_duration_text(""), None);
    }

    #[test]
    fn labeled_duration() {
        let label = duration_label_regex("Продолжительность").unwrap();
        assert_eq!(
            duration_after_label("Продолжительность: 2 часа 30 минут. Антракт 15 минут", &label),
            Some(150)
        );
        assert_eq!(duration_after_label("Спектакль идёт 2 часа", &label), None);
        assert_eq!(duration_after_label("Продолжительность: уточняется", &label), None);
    }
}
