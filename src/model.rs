use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShowRecord {
    pub url: String,
    #[serde(rename = "name")]
    pub title: String,
    #[serde(rename = "theatre")]
    pub venue: String,
    pub director: String,
    #[serde(rename = "actors")]
    pub performers: Vec<String>,
    #[serde(with = "iso_dates")]
    pub dates: Vec<NaiveDateTime>,
    pub genre: String,
    pub duration_minutes: Option<u32>,
    pub age_rating: String,
    pub description: String,
}

impl ShowRecord {
    pub fn identity(&self) -> String {
        show_identity(&self.url)
    }

    pub fn has_director(&self, unspecified: &str) -> bool {
        !self.director.is_empty() && self.director != unspecified
    }
}

pub fn show_identity(url: &str) -> String {
    let digest = Sha256::digest(url.trim().as_bytes());
    hex::encode(digest)[..24].to_string()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowFields {
    pub url: String,
    pub title: Option<String>,
    pub venue: Option<String>,
    pub director: Option<String>,
    pub performers: Vec<String>,
    pub dates: Vec<NaiveDateTime>,
    pub genre: Option<String>,
    pub duration_minutes: Option<u32>,
    pub age_rating: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredShow {
    pub id: String,
    #[serde(flatten)]
    pub record: ShowRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowCollection {
    pub schema_version: u32,
    pub shows: BTreeMap<String, StoredShow>,
}

impl Default for ShowCollection {
    fn default() -> Self {
        Self {
            schema_version: 1,
            shows: BTreeMap::new(),
        }
    }
}

impl ShowCollection {
    /// Inserts or replaces the document keyed by the record's identity. `created_at` is set
    /// on insert only; `updated_at` is refreshed on every write.
    pub fn upsert(&mut self, record: ShowRecord, now: DateTime<Utc>) -> UpsertOutcome {
        let id = record.identity();
        if let Some(existing) = self.shows.get_mut(&id) {
            existing.record = record;
            existing.updated_at = now;
            return UpsertOutcome::Updated;
        }

        self.shows.insert(
            id.clone(),
            StoredShow {
                id,
                record,
                created_at: now,
                updated_at: now,
            },
        );
        UpsertOutcome::Inserted
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.shows.len();
        self.shows.clear();
        removed
    }

    pub fn records(&self) -> impl Iterator<Item = &ShowRecord> {
        self.shows.values().map(|stored| &stored.record)
    }

    pub fn len(&self) -> usize {
        self.shows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowDump {
    pub plays: Vec<ShowRecord>,
    pub metadata: DumpMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpMetadata {
    pub total_plays: usize,
    pub collection_date: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeReport {
    pub urls: usize,
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    pub records_parsed: usize,
    pub rejected: usize,
    pub inserted: usize,
    pub updated: usize,
    pub collection_replaced: bool,
    pub field_coverage: BTreeMap<String, usize>,
}

pub fn field_coverage(records: &[ShowRecord], unspecified: &str) -> BTreeMap<String, usize> {
    let mut coverage = BTreeMap::new();
    let mut bump = |field: &str, present: bool| {
        let entry = coverage.entry(field.to_string()).or_insert(0);
        if present {
            *entry += 1;
        }
    };

    for record in records {
        bump("name", !record.title.is_empty());
        bump("theatre", record.venue != unspecified);
        bump("director", record.has_director(unspecified));
        bump("actors", !record.performers.is_empty());
        bump("dates", !record.dates.is_empty());
        bump("duration_minutes", record.duration_minutes.is_some());
        bump("description", !record.description.is_empty());
    }

    coverage
}

pub const ISO_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

mod iso_dates {
    use super::ISO_DATETIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};

    pub fn serialize<S: Serializer>(
        dates: &[NaiveDateTime],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(dates.len()))?;
        for date in dates {
            seq.serialize_element(&date.format(ISO_DATETIME_FORMAT).to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<NaiveDateTime>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|value| {
                NaiveDateTime::parse_from_str(value, ISO_DATETIME_FORMAT)
                    .map_err(|err| D::Error::custom(format!("invalid show date {value}: {err}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(url: &str, title: &str) -> ShowRecord {
        ShowRecord {
            url: url.to_string(),
            title: title.to_string(),
            venue: "unspecified".to_string(),
            director: "unspecified".to_string(),
            performers: Vec::new(),
            dates: vec![
                NaiveDateTime::parse_from_str("2024-11-20T19:00:00", ISO_DATETIME_FORMAT).unwrap(),
            ],
            genre: "Спектакль".to_string(),
            duration_minutes: None,
            age_rating: "0+".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn identity_is_stable_per_url() {
        let a = show_identity("https://msk.kassir.ru/teatr/chayka");
        let b = show_identity("https://msk.kassir.ru/teatr/chayka");
        let c = show_identity("https://msk.kassir.ru/teatr/revizor");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn json_projection_uses_persisted_names() {
        let value = serde_json::to_value(record("https://x/teatr/a", "Чайка")).unwrap();
        assert_eq!(value["name"], "Чайка");
        assert_eq!(value["theatre"], "unspecified");
        assert_eq!(value["actors"], serde_json::json!([]));
        assert_eq!(value["dates"], serde_json::json!(["2024-11-20T19:00:00"]));
        assert!(value["duration_minutes"].is_null());
    }

    #[test]
    fn upsert_keeps_created_at_and_refreshes_updated_at() {
        let first = Utc.with_ymd_and_hms(2024, 11, 1, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 11, 2, 10, 0, 0).unwrap();
        let mut collection = ShowCollection::default();

        let outcome = collection.upsert(record("https://x/teatr/a", "Чайка"), first);
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let outcome = collection.upsert(record("https://x/teatr/a", "Чайка (новая)"), second);
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(collection.len(), 1);

        let stored = collection.shows.values().next().unwrap();
        assert_eq!(stored.created_at, first);
        assert_eq!(stored.updated_at, second);
        assert_eq!(stored.record.title, "Чайка (новая)");
    }

    #[test]
    fn coverage_ignores_sentinels() {
        let mut with_director = record("https://x/teatr/a", "A");
        with_director.director = "Иван Петров".to_string();
        let records = vec![with_director, record("https://x/teatr/b", "B")];

        let coverage = field_coverage(&records, "unspecified");
        assert_eq!(coverage["director"], 1);
        assert_eq!(coverage["theatre"], 0);
        assert_eq!(coverage["dates"], 2);
    }
}
