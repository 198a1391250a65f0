use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use playbill::cache::CachedQueryRunner;
use playbill::config::{AppConfig, load_config};
use playbill::harness::{BenchOptions, run_cache_bench};
use playbill::pipeline::{
    CollectOptions, LoadOptions, ScrapeOptions, collect_urls, load_dump, scrape_shows, today,
    validate_config,
};
use playbill::queries::{CachedQueries, QueryKind};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "playbill", about = "Theater show scraper with cached analytics")]
struct Cli {
    #[arg(long, default_value = "playbill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover show page URLs on listing pages.
    Collect {
        #[arg(long)]
        urls_file: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        no_calendar: bool,
    },
    /// Fetch and parse show pages, then replace the stored collection.
    Scrape {
        #[arg(long)]
        urls_file: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Reload the collection from a JSON dump.
    Load {
        #[arg(long)]
        dump_file: Option<PathBuf>,
    },
    /// Run one cached aggregation and print it as JSON.
    Query {
        #[arg(value_enum)]
        name: QueryName,
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Compare uncached and cached query times.
    Bench {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    Validate,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    Stats,
    Clear,
    Invalidate {
        #[arg(value_enum)]
        name: QueryName,
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum QueryName {
    Theatres,
    Genres,
    Upcoming,
    Actors,
    Directors,
    Months,
}

impl QueryName {
    fn kind(self, days: u32, limit: usize) -> QueryKind {
        match self {
            Self::Theatres => QueryKind::TheatreStats,
            Self::Genres => QueryKind::GenreStats,
            Self::Upcoming => QueryKind::UpcomingShows { days },
            Self::Actors => QueryKind::TopActors { limit },
            Self::Directors => QueryKind::PopularDirectors { limit },
            Self::Months => QueryKind::DateDistribution,
        }
    }
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let runner = CachedQueryRunner::from_config(&config.cache, &config.paths.cache_dir);

    match cli.command {
        Commands::Collect {
            urls_file,
            no_calendar,
        } => {
            let report = collect_urls(
                &config,
                &CollectOptions {
                    urls_file: urls_file.unwrap_or_else(|| config.paths.urls_file.clone()),
                    include_calendar: !no_calendar,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Scrape {
            urls_file,
            limit,
            dry_run,
        } => {
            let report = scrape_shows(
                &config,
                &ScrapeOptions {
                    urls_file: urls_file.unwrap_or_else(|| config.paths.urls_file.clone()),
                    dump_file: config.paths.dump_file.clone(),
                    collection_file: config.paths.collection_file.clone(),
                    limit,
                    dry_run,
                },
            )?;
            info!(
                pages = report.pages_fetched,
                failures = report.fetch_failures,
                parsed = report.records_parsed,
                rejected = report.rejected,
                inserted = report.inserted,
                "scrape summary"
            );
            if report.collection_replaced {
                runner.clear_all();
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Load { dump_file } => {
            let report = load_dump(&LoadOptions {
                dump_file: dump_file.unwrap_or_else(|| config.paths.dump_file.clone()),
                collection_file: config.paths.collection_file.clone(),
            })?;
            runner.clear_all();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Query { name, days, limit } => {
            let queries = cached_queries(&runner, &config);
            let value = queries.run(name.kind(days, limit))?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => {
                println!("{}", serde_json::to_string_pretty(&runner.stats())?);
            }
            CacheAction::Clear => {
                let removed = runner.clear_all();
                println!("removed {removed} cache keys");
            }
            CacheAction::Invalidate { name, days, limit } => {
                let kind = name.kind(days, limit);
                let removed = cached_queries(&runner, &config).invalidate(kind);
                println!("{}: {}", kind.name(), if removed { "invalidated" } else { "not cached" });
            }
        },
        Commands::Bench { days, limit } => {
            let queries = cached_queries(&runner, &config);
            let report = run_cache_bench(&queries, &BenchOptions { days, limit })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Validate => {
            for line in validate_config(&cli.config)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn cached_queries<'a>(runner: &'a CachedQueryRunner, config: &AppConfig) -> CachedQueries<'a> {
    CachedQueries::new(
        runner,
        &config.paths.collection_file,
        &config.cache.ttl,
        &config.extract.unspecified,
        &config.extract.months,
        today(),
    )
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
