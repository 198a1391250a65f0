use crate::config::{AppConfig, load_config};
use crate::extract::ShowExtractor;
use crate::fetch::PageFetcher;
use crate::listing::{calendar_urls, collect_show_urls, has_next_page, paged_url};
use crate::model::{
    DumpMetadata, ScrapeReport, ShowCollection, ShowDump, ShowRecord, UpsertOutcome,
    field_coverage,
};
use crate::store::{
    load_collection, read_dump, read_url_list, save_collection, write_dump, write_url_list,
};
use anyhow::{Result, bail};
use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub urls_file: PathBuf,
    pub include_calendar: bool,
}

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub urls_file: PathBuf,
    pub dump_file: PathBuf,
    pub collection_file: PathBuf,
    pub limit: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub dump_file: PathBuf,
    pub collection_file: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectReport {
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    pub urls: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub removed: usize,
    pub loaded: usize,
    pub inserted: usize,
    pub updated: usize,
}

pub fn collect_urls(config: &AppConfig, options: &CollectOptions) -> Result<CollectReport> {
    let mut fetcher = PageFetcher::new(&config.fetch)?;
    let mut report = CollectReport::default();
    let mut urls = BTreeSet::new();

    for listing_url in config.listing.listing_urls() {
        for page in 1..=config.listing.max_pages {
            let page_url = if page == 1 {
                listing_url.clone()
            } else {
                paged_url(&listing_url, &config.listing.page_param, page)?
            };

            let html = match fetcher.fetch(&page_url) {
                Ok(html) => html,
                Err(err) => {
                    warn!(url = %page_url, error = %err, "listing page unavailable; moving on");
                    report.fetch_failures += 1;
                    break;
                }
            };
            report.pages_fetched += 1;

            let found = collect_show_urls(&html, &config.listing)?;
            info!(url = %page_url, found = found.len(), total = urls.len(), "listing page scanned");
            urls.extend(found);

            if !has_next_page(&html) {
                break;
            }
        }
    }

    if options.include_calendar {
        for day_url in calendar_urls(&config.listing, today()) {
            match fetcher.fetch(&day_url) {
                Ok(html) => {
                    report.pages_fetched += 1;
                    urls.extend(collect_show_urls(&html, &config.listing)?);
                }
                Err(err) => {
                    warn!(url = %day_url, error = %err, "calendar page unavailable");
                    report.fetch_failures += 1;
                }
            }
        }
    }

    let urls = urls.into_iter().collect::<Vec<_>>();
    write_url_list(&options.urls_file, &urls)?;
    report.urls = urls.len();
    info!(
        urls = report.urls,
        file = %options.urls_file.display(),
        "show url list written"
    );
    Ok(report)
}

/// Fetches every listed show page, keeps the records that validate, writes the JSON dump and
/// replaces the stored collection with the fresh records. A run that yields no records writes
/// nothing.
pub fn scrape_shows(config: &AppConfig, options: &ScrapeOptions) -> Result<ScrapeReport> {
    let mut urls = read_url_list(&options.urls_file)?;
    if let Some(limit) = options.limit {
        urls.truncate(limit);
    }
    if urls.is_empty() {
        bail!("no show urls in {}", options.urls_file.display());
    }

    let extractor = ShowExtractor::new(&config.extract)?;
    let mut fetcher = PageFetcher::new(&config.fetch)?;
    let today = today();
    let mut report = ScrapeReport {
        urls: urls.len(),
        ..ScrapeReport::default()
    };

    let mut records = Vec::new();
    for (index, url) in urls.iter().enumerate() {
        let html = match fetcher.fetch(url) {
            Ok(html) => html,
            Err(err) => {
                warn!(%url, error = %err, "show page unavailable; skipping");
                report.fetch_failures += 1;
                continue;
            }
        };
        report.pages_fetched += 1;

        match extractor.parse_show_page(url, &html, today) {
            Ok(record) => {
                info!(
                    page = index + 1,
                    total = urls.len(),
                    title = %record.title,
                    dates = record.dates.len(),
                    performers = record.performers.len(),
                    "show parsed"
                );
                records.push(record);
            }
            Err(failure) => {
                warn!(%url, reason = %failure, "show page rejected");
                report.rejected += 1;
            }
        }
    }

    report.records_parsed = records.len();
    report.field_coverage = field_coverage(&records, &config.extract.unspecified);

    if options.dry_run {
        info!("dry run enabled; dump and collection not written");
        return Ok(report);
    }
    if records.is_empty() {
        warn!(
            failures = report.fetch_failures,
            rejected = report.rejected,
            "no shows parsed; keeping the existing dump and collection"
        );
        return Ok(report);
    }

    write_dump(
        &options.dump_file,
        &ShowDump {
            metadata: DumpMetadata {
                total_plays: records.len(),
                collection_date: Utc::now(),
                source: config.listing.source_label.clone(),
            },
            plays: records.clone(),
        },
    )?;
    info!(file = %options.dump_file.display(), plays = records.len(), "dump written");

    let outcome = replace_collection(&options.collection_file, records)?;
    report.inserted = outcome.inserted;
    report.updated = outcome.updated;
    report.collection_replaced = true;
    Ok(report)
}

pub fn load_dump(options: &LoadOptions) -> Result<LoadReport> {
    let dump = read_dump(&options.dump_file)?;
    if dump.metadata.total_plays != dump.plays.len() {
        warn!(
            declared = dump.metadata.total_plays,
            actual = dump.plays.len(),
            "dump metadata disagrees with its play list"
        );
    }
    replace_collection(&options.collection_file, dump.plays)
}

pub fn replace_collection(path: &Path, records: Vec<ShowRecord>) -> Result<LoadReport> {
    let mut collection: ShowCollection = load_collection(path)?;
    let now = Utc::now();
    let mut report = LoadReport {
        removed: collection.clear(),
        loaded: records.len(),
        ..LoadReport::default()
    };

    for record in records {
        match collection.upsert(record, now) {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Updated => report.updated += 1,
        }
    }

    save_collection(path, &collection)?;
    info!(
        collection = %path.display(),
        removed = report.removed,
        inserted = report.inserted,
        updated = report.updated,
        "collection replaced"
    );
    Ok(report)
}

pub fn validate_config(path: &Path) -> Result<Vec<String>> {
    let config = load_config(path)?;
    let extractor = ShowExtractor::new(&config.extract)?;

    Ok(vec![
        format!("OK: config {}", path.display()),
        format!(
            "listing: {} start pages, up to {} pages each, {} calendar days",
            config.listing.listing_urls().len(),
            config.listing.max_pages,
            config.listing.calendar_days
        ),
        format!(
            "extract: {} name stopwords, {} genres, sentinel {:?}, default age {}",
            config.extract.name_stopwords.len(),
            config.extract.genres.len(),
            extractor.defaults().unspecified,
            extractor.defaults().age_rating
        ),
        format!(
            "cache: prefix {:?}, default ttl {}s, {}",
            config.cache.prefix,
            config.cache.default_ttl_secs,
            if config.cache.enabled { "enabled" } else { "disabled" }
        ),
    ])
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
