use crate::cache::CacheStats;
use crate::queries::{CachedQueries, QueryKind};
use anyhow::Result;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub days: u32,
    pub limit: usize,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self { days: 7, limit: 10 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchEntry {
    pub query: String,
    pub uncached_ms: f64,
    pub cached_ms: f64,
    pub speedup: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub entries: Vec<BenchEntry>,
    pub cache: CacheStats,
}

pub fn run_cache_bench(queries: &CachedQueries<'_>, options: &BenchOptions) -> Result<BenchReport> {
    let kinds = [
        QueryKind::TheatreStats,
        QueryKind::GenreStats,
        QueryKind::UpcomingShows { days: options.days },
        QueryKind::TopActors {
            limit: options.limit,
        },
        QueryKind::PopularDirectors {
            limit: options.limit,
        },
        QueryKind::DateDistribution,
    ];

    let mut entries = Vec::with_capacity(kinds.len());
    for kind in kinds {
        queries.invalidate(kind);

        let started = Instant::now();
        let uncached = queries.run(kind)?;
        let uncached_ms = elapsed_ms(started);

        let started = Instant::now();
        let cached = queries.run(kind)?;
        let cached_ms = elapsed_ms(started);

        if uncached != cached {
            warn!(query = kind.name(), "cached result differs from the computed one");
        }
        let speedup = if cached_ms > 0.0 {
            round1(uncached_ms / cached_ms)
        } else {
            0.0
        };
        info!(
            query = kind.name(),
            uncached_ms,
            cached_ms,
            speedup,
            "cache bench"
        );

        entries.push(BenchEntry {
            query: kind.name().to_string(),
            uncached_ms,
            cached_ms,
            speedup,
        });
    }

    Ok(BenchReport {
        entries,
        cache: queries.runner().stats(),
    })
}

fn elapsed_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 1000.0).round() / 1000.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
