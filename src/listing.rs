use crate::config::ListingConfig;
use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector must parse"));
static DATE_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date segment regex must be valid"));
static NEXT_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)дальше|следующая|next").expect("next page regex must be valid")
});

pub fn collect_show_urls(html: &str, config: &ListingConfig) -> Result<Vec<String>> {
    let base = Url::parse(&config.base_url)
        .with_context(|| format!("invalid listing base url {}", config.base_url))?;
    let document = Html::parse_document(html);

    let mut urls = BTreeSet::new();
    for link in document.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        match show_url(&base, href, config) {
            Some(url) => {
                urls.insert(url);
            }
            None => debug!(href, "link is not a show page"),
        }
    }

    Ok(urls.into_iter().collect())
}

fn show_url(base: &Url, href: &str, config: &ListingConfig) -> Option<String> {
    let resolved = base.join(href.trim()).ok()?;
    if resolved.host_str() != base.host_str() {
        return None;
    }

    let path = resolved.path().to_lowercase();
    if config
        .excluded_url_words
        .iter()
        .any(|word| path.contains(&word.to_lowercase()))
    {
        return None;
    }

    let rest = resolved.path().strip_prefix(config.show_path_prefix.as_str())?;
    let slug = rest.split('/').find(|segment| !segment.is_empty())?;
    if DATE_SEGMENT_RE.is_match(slug) {
        return None;
    }

    let mut show = base.clone();
    show.set_path(&format!("{}{}", config.show_path_prefix, slug));
    show.set_query(None);
    show.set_fragment(None);
    Some(show.to_string())
}

pub fn has_next_page(html: &str) -> bool {
    let document = Html::parse_document(html);
    document
        .select(&LINK_SELECTOR)
        .any(|link| NEXT_PAGE_RE.is_match(&link.text().collect::<String>()))
}

pub fn paged_url(url: &str, param: &str, page: u32) -> Result<String> {
    let mut url = Url::parse(url).with_context(|| format!("invalid listing url {url}"))?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.push((param.to_string(), page.to_string()));

    {
        let mut qp = url.query_pairs_mut();
        qp.clear();
        for (k, v) in pairs {
            qp.append_pair(&k, &v);
        }
    }

    Ok(url.to_string())
}

pub fn calendar_urls(config: &ListingConfig, today: NaiveDate) -> Vec<String> {
    let root = format!(
        "{}{}",
        config.base_url.trim_end_matches('/'),
        config.listing_path
    );
    (0..config.calendar_days)
        .filter_map(|offset| today.checked_add_days(Days::new(u64::from(offset))))
        .map(|day| format!("{}/{}", root.trim_end_matches('/'), day.format("%Y-%m-%d")))
        .collect()
}
