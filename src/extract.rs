use crate::assemble::{RecordDefaults, ValidationFailure, assemble};
use crate::config::{ExtractConfig, GenreRule};
use crate::dates::{
    MonthTable, duration_after_label, duration_label_regex, find_iso_datetimes,
    find_written_dates, normalize_dates, parse_iso_datetime, parse_iso_duration, schedule_date,
};
use crate::model::{ShowFields, ShowRecord};
use crate::names::{NameCleaner, same_name, split_name_list};
use crate::normalize::{
    char_window, collapse_whitespace, fix_run_together_names, normalize_text, strip_symbols,
};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "th", "thead", "title", "tr", "ul",
];
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];
const CARD_CLASSES: &[&str] = &["card", "slide", "performer"];
const CARD_NAME_CLASSES: &[&str] = &["name", "title", "semibold"];
const SCHEDULE_DAY_CLASSES: &[&str] = &["whitespace-nowrap"];
const SCHEDULE_MONTH_CLASSES: &[&str] = &["event-date-selector-month"];
const PERSON_NAME: &str = r"([А-ЯЁ][а-яё]+\s+[А-ЯЁ][а-яё]+)";

static LD_JSON_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"script[type="application/ld+json"]"#));
static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static H1_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static META_DESCRIPTION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[name="description"]"#));
static CONTENT_BLOCK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector("div.content-block"));
static MAIN_CONTENT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector("main, article, div[class*=\"content\"]"));
static PERFORMER_HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector("h2, h3, h4"));
static SCHEDULE_HEADING_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("h2, h3"));
static CARD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("div, article"));
static CARD_NAME_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("p, span, div, a"));
static SPAN_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("script"));

static NAME_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[А-ЯЁ][а-яё]+\s+[А-ЯЁ][а-яё]+\b").expect("name pair regex must be valid")
});
static AGE_RATING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d])(\d{1,2})\+").expect("age rating regex must be valid")
});
static AGE_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})").expect("age range regex must be valid"));
static DATE_ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\d+").expect("date anchor regex must be valid"));

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    StructuredMetadata,
    MetaTags,
    Section,
    FreeText,
}

type StrategyFn<T> = for<'a> fn(&ShowExtractor, &PageContext<'a>) -> Option<T>;

struct Strategy<T> {
    tier: SourceTier,
    name: &'static str,
    run: StrategyFn<T>,
}

const DESCRIPTION_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        tier: SourceTier::Section,
        name: "content_block",
        run: ShowExtractor::description_from_content_block,
    },
    Strategy {
        tier: SourceTier::StructuredMetadata,
        name: "metadata_description",
        run: ShowExtractor::description_from_metadata,
    },
    Strategy {
        tier: SourceTier::MetaTags,
        name: "meta_description",
        run: ShowExtractor::description_from_meta_tag,
    },
];

const TITLE_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        tier: SourceTier::StructuredMetadata,
        name: "metadata_name",
        run: ShowExtractor::title_from_metadata,
    },
    Strategy {
        tier: SourceTier::MetaTags,
        name: "title_tag",
        run: ShowExtractor::title_from_title_tag,
    },
    Strategy {
        tier: SourceTier::Section,
        name: "first_heading",
        run: ShowExtractor::title_from_heading,
    },
];

const VENUE_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        tier: SourceTier::StructuredMetadata,
        name: "metadata_location",
        run: ShowExtractor::venue_from_metadata,
    },
    Strategy {
        tier: SourceTier::MetaTags,
        name: "meta_description",
        run: ShowExtractor::venue_from_meta_description,
    },
];

const DIRECTOR_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        tier: SourceTier::Section,
        name: "marker_lines",
        run: ShowExtractor::director_from_lines,
    },
    Strategy {
        tier: SourceTier::FreeText,
        name: "description_window",
        run: ShowExtractor::director_from_description,
    },
];

const PERFORMER_STRATEGIES: &[Strategy<Vec<String>>] = &[
    Strategy {
        tier: SourceTier::Section,
        name: "performer_cards",
        run: ShowExtractor::performers_from_cards,
    },
    Strategy {
        tier: SourceTier::FreeText,
        name: "name_pairs",
        run: ShowExtractor::performers_from_free_text,
    },
];

const DATE_STRATEGIES: &[Strategy<Vec<NaiveDateTime>>] = &[
    Strategy {
        tier: SourceTier::Section,
        name: "schedule_widget",
        run: ShowExtractor::dates_from_schedule,
    },
    Strategy {
        tier: SourceTier::StructuredMetadata,
        name: "metadata_start_end",
        run: ShowExtractor::dates_from_metadata,
    },
    Strategy {
        tier: SourceTier::FreeText,
        name: "script_iso",
        run: ShowExtractor::dates_from_scripts,
    },
    Strategy {
        tier: SourceTier::FreeText,
        name: "written_dates",
        run: ShowExtractor::dates_from_text,
    },
];

const DURATION_STRATEGIES: &[Strategy<u32>] = &[
    Strategy {
        tier: SourceTier::StructuredMetadata,
        name: "metadata_duration",
        run: ShowExtractor::duration_from_metadata,
    },
    Strategy {
        tier: SourceTier::FreeText,
        name: "duration_label",
        run: ShowExtractor::duration_from_text,
    },
];

const AGE_RATING_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        tier: SourceTier::StructuredMetadata,
        name: "metadata_age_range",
        run: ShowExtractor::age_rating_from_metadata,
    },
    Strategy {
        tier: SourceTier::FreeText,
        name: "age_marker",
        run: ShowExtractor::age_rating_from_text,
    },
];

pub struct PageContext<'a> {
    pub url: &'a str,
    pub document: &'a Html,
    pub metadata: Option<&'a Value>,
    pub text: String,
    pub description: String,
    pub today: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct ShowExtractor {
    title_separators: Vec<String>,
    performers_heading: String,
    schedule_heading: String,
    genres: Vec<GenreRule>,
    director_stopwords: Vec<String>,
    director_line_max: usize,
    director_window: usize,
    director_marker: Regex,
    director_patterns: Vec<Regex>,
    venue_suffix: Regex,
    duration_label: Regex,
    names: NameCleaner,
    months: MonthTable,
    show_time: NaiveTime,
    defaults: RecordDefaults,
}

impl ShowExtractor {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        config.validate()?;

        let markers = config
            .director_markers
            .iter()
            .map(|marker| regex::escape(marker))
            .collect::<Vec<_>>()
            .join("|");
        let director_marker = Regex::new(&format!("(?i:{markers})"))
            .context("failed to build director marker regex")?;
        let director_patterns = [r"\s*:\s*", r"\s*[-–]\s*", r"\s*—\s*", r"\s+"]
            .iter()
            .map(|separator| {
                Regex::new(&format!("(?i:{markers}){separator}{PERSON_NAME}"))
                    .context("failed to build director pattern")
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title_separators: config.title_separators.clone(),
            performers_heading: config.performers_heading.to_lowercase(),
            schedule_heading: config.schedule_heading.to_lowercase(),
            genres: config
                .genres
                .iter()
                .map(|rule| GenreRule {
                    keyword: rule.keyword.to_lowercase(),
                    genre: rule.genre.clone(),
                })
                .collect(),
            director_stopwords: config
                .director_stopwords
                .iter()
                .map(|word| word.to_lowercase())
                .collect(),
            director_line_max: config.director_line_max,
            director_window: config.director_window,
            director_marker,
            director_patterns,
            venue_suffix: Regex::new(&config.venue_suffix_pattern)
                .context("failed to build venue suffix regex")?,
            duration_label: duration_label_regex(&config.duration_label)
                .context("failed to build duration label regex")?,
            names: NameCleaner::new(config)?,
            months: MonthTable::new(config),
            show_time: config.show_time()?,
            defaults: RecordDefaults::from(config),
        })
    }

    pub fn defaults(&self) -> &RecordDefaults {
        &self.defaults
    }

    pub fn parse_show_page(
        &self,
        url: &str,
        html: &str,
        today: NaiveDate,
    ) -> Result<ShowRecord, ValidationFailure> {
        assemble(self.extract_fields(url, html, today), &self.defaults)
    }

    pub fn extract_fields(&self, url: &str, html: &str, today: NaiveDate) -> ShowFields {
        let document = Html::parse_document(html);
        let metadata = find_event_metadata(&document);
        let mut ctx = PageContext {
            url,
            document: &document,
            metadata: metadata.as_ref(),
            text: visible_text(document.root_element()),
            description: String::new(),
            today,
        };

        let description = self.first_hit("description", &ctx, DESCRIPTION_STRATEGIES);
        ctx.description = description.clone().unwrap_or_default();

        let title = self.first_hit("title", &ctx, TITLE_STRATEGIES);
        let director = self.first_hit("director", &ctx, DIRECTOR_STRATEGIES);
        let performers = self.performers(&ctx, director.as_deref());
        let dates = self
            .first_hit("dates", &ctx, DATE_STRATEGIES)
            .map(normalize_dates)
            .unwrap_or_default();
        let genre = self.genre_for(title.as_deref().unwrap_or_default(), &ctx.description);

        ShowFields {
            url: url.to_string(),
            title,
            venue: self.first_hit("venue", &ctx, VENUE_STRATEGIES),
            director,
            performers,
            dates,
            genre,
            duration_minutes: self.first_hit("duration", &ctx, DURATION_STRATEGIES),
            age_rating: self.first_hit("age_rating", &ctx, AGE_RATING_STRATEGIES),
            description,
        }
    }

    pub fn genre_for(&self, title: &str, description: &str) -> Option<String> {
        let haystack = format!("{title} {description}").to_lowercase();
        self.genres
            .iter()
            .find(|rule| haystack.contains(&rule.keyword))
            .map(|rule| rule.genre.clone())
    }

    fn first_hit<T>(
        &self,
        field: &'static str,
        ctx: &PageContext<'_>,
        strategies: &[Strategy<T>],
    ) -> Option<T> {
        for strategy in strategies {
            if let Some(value) = (strategy.run)(self, ctx) {
                debug!(
                    url = %ctx.url,
                    field,
                    strategy = strategy.name,
                    tier = ?strategy.tier,
                    "field extracted"
                );
                return Some(value);
            }
        }
        debug!(url = %ctx.url, field, "no strategy produced a value");
        None
    }

    fn performers(&self, ctx: &PageContext<'_>, director: Option<&str>) -> Vec<String> {
        let raw = self
            .first_hit("performers", ctx, PERFORMER_STRATEGIES)
            .unwrap_or_default();

        let not_director = |name: &String| director.is_none_or(|d| !same_name(name, d));
        let candidates = raw
            .iter()
            .flat_map(|candidate| split_name_list(candidate))
            .filter(not_director)
            .collect::<Vec<_>>();

        self.names
            .clean_names(&candidates)
            .into_iter()
            .filter(not_director)
            .collect()
    }

    fn description_from_content_block(&self, ctx: &PageContext<'_>) -> Option<String> {
        let block = ctx.document.select(&CONTENT_BLOCK_SELECTOR).next()?;
        non_empty(collapse_whitespace(&visible_text(block)))
    }

    fn description_from_metadata(&self, ctx: &PageContext<'_>) -> Option<String> {
        let raw = ctx.metadata?.get("description")?.as_str()?;
        non_empty(normalize_text(raw))
    }

    fn description_from_meta_tag(&self, ctx: &PageContext<'_>) -> Option<String> {
        let meta = ctx.document.select(&META_DESCRIPTION_SELECTOR).next()?;
        non_empty(normalize_text(meta.value().attr("content")?))
    }

    fn title_from_metadata(&self, ctx: &PageContext<'_>) -> Option<String> {
        let raw = ctx.metadata?.get("name")?.as_str()?;
        non_empty(normalize_text(raw))
    }

    fn title_from_title_tag(&self, ctx: &PageContext<'_>) -> Option<String> {
        let title = ctx.document.select(&TITLE_SELECTOR).next()?;
        let mut text = title.text().collect::<String>();
        for separator in &self.title_separators {
            if let Some((head, _)) = text.split_once(separator.as_str()) {
                text = head.to_string();
            }
        }
        non_empty(normalize_text(&text))
    }

    fn title_from_heading(&self, ctx: &PageContext<'_>) -> Option<String> {
        let heading = ctx.document.select(&H1_SELECTOR).next()?;
        non_empty(collapse_whitespace(&heading.text().collect::<String>()))
    }

    fn venue_from_metadata(&self, ctx: &PageContext<'_>) -> Option<String> {
        let location = ctx.metadata?.get("location")?;
        let location = match location {
            Value::Array(items) => items.first()?,
            other => other,
        };
        let name = location.get("name")?.as_str()?;
        self.clean_venue(name)
    }

    fn venue_from_meta_description(&self, ctx: &PageContext<'_>) -> Option<String> {
        let meta = ctx.document.select(&META_DESCRIPTION_SELECTOR).next()?;
        let content = meta.value().attr("content")?;
        let after_marker = content.split('➤').nth(1)?;
        let venue = after_marker.split(',').next()?;
        self.clean_venue(venue)
    }

    fn clean_venue(&self, raw: &str) -> Option<String> {
        let venue = normalize_text(raw);
        let venue = self.venue_suffix.replace(&venue, "");
        let venue = venue.trim().trim_end_matches('.').trim();
        non_empty(venue.to_string())
    }

    fn director_from_lines(&self, ctx: &PageContext<'_>) -> Option<String> {
        ctx.text
            .lines()
            .map(collapse_whitespace)
            .filter(|line| line.chars().count() < self.director_line_max)
            .find_map(|line| self.director_in(&line))
    }

    fn director_from_description(&self, ctx: &PageContext<'_>) -> Option<String> {
        self.director_in(&ctx.description)
    }

    fn director_in(&self, text: &str) -> Option<String> {
        let marker = self.director_marker.find(text)?;
        let window = char_window(&text[marker.start()..], self.director_window);

        self.director_patterns.iter().find_map(|pattern| {
            let name = pattern.captures(window)?.get(1)?.as_str().trim().to_string();
            let lower = name.to_lowercase();
            if self
                .director_stopwords
                .iter()
                .any(|word| lower.contains(word))
            {
                debug!(candidate = %name, "director candidate looks like a venue; skipping");
                return None;
            }
            Some(name)
        })
    }

    fn performers_from_cards(&self, ctx: &PageContext<'_>) -> Option<Vec<String>> {
        let heading = ctx
            .document
            .select(&PERFORMER_HEADING_SELECTOR)
            .find(|h| {
                h.text()
                    .collect::<String>()
                    .to_lowercase()
                    .contains(&self.performers_heading)
            })?;
        let section = enclosing(heading, "section").or_else(|| enclosing(heading, "div"))?;

        let mut names = Vec::new();
        for card in section
            .select(&CARD_SELECTOR)
            .filter(|el| class_contains(*el, CARD_CLASSES))
        {
            let Some(name_el) = card
                .select(&CARD_NAME_SELECTOR)
                .find(|el| class_contains(*el, CARD_NAME_CLASSES))
            else {
                continue;
            };
            let raw = collapse_whitespace(&name_el.text().collect::<String>());
            let name = strip_symbols(&fix_run_together_names(&raw));
            if self.names.is_plausible_performer(&name) {
                names.push(name);
            }
        }

        non_empty_vec(names)
    }

    fn performers_from_free_text(&self, ctx: &PageContext<'_>) -> Option<Vec<String>> {
        let text = match ctx.document.select(&CONTENT_BLOCK_SELECTOR).next() {
            Some(block) => visible_text(block),
            None => visible_text(ctx.document.select(&MAIN_CONTENT_SELECTOR).next()?),
        };

        let names = NAME_PAIR_RE
            .find_iter(&text)
            .map(|m| m.as_str().to_string())
            .filter(|name| self.names.is_plausible_performer(name))
            .filter(|name| !self.names.is_place_name(name))
            .collect::<Vec<_>>();

        non_empty_vec(names)
    }

    fn dates_from_schedule(&self, ctx: &PageContext<'_>) -> Option<Vec<NaiveDateTime>> {
        let heading = ctx.document.select(&SCHEDULE_HEADING_SELECTOR).find(|h| {
            h.text()
                .collect::<String>()
                .to_lowercase()
                .contains(&self.schedule_heading)
        })?;
        let container = next_container(ctx.document, heading)?;
        let first_month = container
            .select(&SPAN_SELECTOR)
            .find(|el| class_contains(*el, SCHEDULE_MONTH_CLASSES))
            .map(|el| el.text().collect::<String>());

        let mut current_month: Option<String> = None;
        let mut dates = Vec::new();
        for node in container.descendants() {
            let Some(el) = ElementRef::wrap(node) else {
                continue;
            };
            match el.value().name() {
                "span" if class_contains(el, SCHEDULE_MONTH_CLASSES) => {
                    current_month = Some(el.text().collect::<String>());
                }
                "a" if el
                    .value()
                    .attr("href")
                    .is_some_and(|href| DATE_ANCHOR_RE.is_match(href)) =>
                {
                    let Some(day) = el
                        .select(&SPAN_SELECTOR)
                        .find(|span| class_contains(*span, SCHEDULE_DAY_CLASSES))
                        .map(|span| span.text().collect::<String>())
                    else {
                        continue;
                    };
                    let Some(month) = current_month.as_deref().or(first_month.as_deref()) else {
                        continue;
                    };
                    match schedule_date(&day, month, &self.months, ctx.today, self.show_time) {
                        Some(date) => dates.push(date),
                        None => debug!(url = %ctx.url, day = %day.trim(), month = %month.trim(), "unparsable schedule entry"),
                    }
                }
                _ => {}
            }
        }

        non_empty_vec(dates)
    }

    fn dates_from_metadata(&self, ctx: &PageContext<'_>) -> Option<Vec<NaiveDateTime>> {
        let metadata = ctx.metadata?;
        let dates = ["startDate", "endDate"]
            .iter()
            .filter_map(|key| metadata.get(*key)?.as_str())
            .filter_map(parse_iso_datetime)
            .collect();
        non_empty_vec(dates)
    }

    fn dates_from_scripts(&self, ctx: &PageContext<'_>) -> Option<Vec<NaiveDateTime>> {
        let dates = ctx
            .document
            .select(&SCRIPT_SELECTOR)
            .flat_map(|script| find_iso_datetimes(&script.text().collect::<String>()))
            .collect();
        non_empty_vec(dates)
    }

    fn dates_from_text(&self, ctx: &PageContext<'_>) -> Option<Vec<NaiveDateTime>> {
        non_empty_vec(find_written_dates(&ctx.text, &self.months, self.show_time))
    }

    fn duration_from_metadata(&self, ctx: &PageContext<'_>) -> Option<u32> {
        parse_iso_duration(ctx.metadata?.get("duration")?.as_str()?)
    }

    fn duration_from_text(&self, ctx: &PageContext<'_>) -> Option<u32> {
        duration_after_label(&ctx.text, &self.duration_label)
    }

    fn age_rating_from_metadata(&self, ctx: &PageContext<'_>) -> Option<String> {
        let range = match ctx.metadata?.get("typicalAgeRange")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let caps = AGE_RANGE_RE.captures(&range)?;
        Some(format!("{}+", caps.get(1)?.as_str()))
    }

    fn age_rating_from_text(&self, ctx: &PageContext<'_>) -> Option<String> {
        let caps = AGE_RATING_RE.captures(&ctx.text)?;
        Some(format!("{}+", caps.get(1)?.as_str()))
    }
}

pub fn find_event_metadata(document: &Html) -> Option<Value> {
    for script in document.select(&LD_JSON_SELECTOR) {
        let raw = script.text().collect::<String>();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => {
                if let Some(event) = find_event_node(value) {
                    return Some(event);
                }
            }
            Err(err) => debug!(error = %err, "skipping malformed ld+json block"),
        }
    }
    None
}

fn find_event_node(value: Value) -> Option<Value> {
    match value {
        Value::Array(items) => items.into_iter().find_map(find_event_node),
        Value::Object(mut map) => {
            if is_event_type(map.get("@type")) {
                return Some(Value::Object(map));
            }
            map.remove("@graph").and_then(find_event_node)
        }
        _ => None,
    }
}

fn is_event_type(kind: Option<&Value>) -> bool {
    match kind {
        Some(Value::String(kind)) => kind.ends_with("Event"),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .any(|k| k.as_str().is_some_and(|k| k.ends_with("Event"))),
        _ => false,
    }
}

/// Text content with a line break around every block-level element; scripts and styles are
/// left out. Iterative, so deep nesting cannot exhaust the call stack.
pub fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    let mut stack = Vec::new();
    push_children(root, &mut stack);

    while let Some(step) = stack.pop() {
        match step {
            TextStep::Text(text) => out.push_str(text),
            TextStep::Break => out.push('\n'),
            TextStep::Enter(element) => {
                let name = element.value().name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push('\n');
                    stack.push(TextStep::Break);
                }
                push_children(element, &mut stack);
            }
        }
    }
    out
}

enum TextStep<'a> {
    Text(&'a str),
    Enter(ElementRef<'a>),
    Break,
}

fn push_children<'a>(element: ElementRef<'a>, stack: &mut Vec<TextStep<'a>>) {
    for child in element.children().rev() {
        match child.value() {
            Node::Text(text) => stack.push(TextStep::Text(text)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    stack.push(TextStep::Enter(child));
                }
            }
            _ => {}
        }
    }
}

fn class_contains(element: ElementRef<'_>, needles: &[&str]) -> bool {
    element.value().attr("class").is_some_and(|class| {
        let class = class.to_lowercase();
        needles.iter().any(|needle| class.contains(needle))
    })
}

fn enclosing<'a>(element: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == tag)
}

fn next_container<'a>(document: &'a Html, heading: ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut passed = false;
    for node in document.root_element().descendants() {
        if node.id() == heading.id() {
            passed = true;
            continue;
        }
        if !passed {
            continue;
        }
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if !matches!(el.value().name(), "section" | "div") {
            continue;
        }
        if el.ancestors().any(|a| a.id() == heading.id()) {
            continue;
        }
        return Some(el);
    }
    None
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn non_empty_vec<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() { None } else { Some(values) }
}
