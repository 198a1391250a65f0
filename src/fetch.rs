use crate::config::FetchConfig;
use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

const BLOCK_MARKERS: &[&str] = &["captcha", "доступ временно ограничен"];

pub struct PageFetcher {
    client: Client,
    retry_attempts: u8,
    retry_backoff: Duration,
    request_delay: Duration,
    last_request: Option<Instant>,
}

impl PageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (k, v) in &config.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .with_context(|| format!("invalid header name {k}"))?;
            let value =
                HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
            headers.insert(name, value);
        }

        if let Some(user_agent) = &config.user_agent {
            headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            request_delay: Duration::from_millis(config.request_delay_ms),
            last_request: None,
        })
    }

    pub fn fetch(&mut self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).with_context(|| format!("invalid url {url}"))?;
        if parsed.scheme() == "file" {
            return read_file_url(&parsed);
        }

        self.pace();
        let body = self.fetch_with_retries(url)?;
        self.last_request = Some(Instant::now());

        let lower = body.to_lowercase();
        if BLOCK_MARKERS.iter().any(|marker| lower.contains(marker)) {
            warn!(%url, "page looks like a bot check; content may be incomplete");
        }
        info!(%url, bytes = body.len(), "fetched page");
        Ok(body)
    }

    fn pace(&self) {
        let Some(last) = self.last_request else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < self.request_delay {
            let wait = self.request_delay - elapsed;
            debug!(wait_ms = wait.as_millis() as u64, "waiting before next request");
            std::thread::sleep(wait);
        }
    }

    fn fetch_with_retries(&self, url: &str) -> Result<String> {
        let attempts = self.retry_attempts;

        for attempt in 1..=attempts {
            match self.client.get(url).send() {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        let status = resp.status();
                        if attempt == attempts {
                            bail!("request to {url} failed with status {status}");
                        }
                        warn!(%url, %status, attempt, "request failed; retrying");
                    } else {
                        return resp
                            .text()
                            .with_context(|| format!("failed to read body of {url}"));
                    }
                }
                Err(err) => {
                    if attempt == attempts {
                        return Err(err).with_context(|| format!("request to {url} failed"));
                    }
                    warn!(%url, attempt, error = %err, "request errored; retrying");
                }
            }

            std::thread::sleep(self.retry_backoff * u32::from(attempt));
        }

        bail!("request to {url} failed after retries")
    }
}

fn read_file_url(url: &Url) -> Result<String> {
    let path = url
        .to_file_path()
        .map_err(|()| anyhow!("file url {url} has no local path"))?;
    let body = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read page {}", path.display()))?;
    debug!(file = %path.display(), bytes = body.len(), "loaded file page");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_file_urls_without_network() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<title>Чайка</title>").unwrap();
        let url = Url::from_file_path(&path).unwrap().to_string();

        let mut fetcher = PageFetcher::new(&FetchConfig::default()).unwrap();
        assert_eq!(fetcher.fetch(&url).unwrap(), "<title>Чайка</title>");
        assert!(fetcher.fetch("file:///definitely/missing/page.html").is_err());
    }

    #[test]
    fn rejects_unparsable_urls() {
        let mut fetcher = PageFetcher::new(&FetchConfig::default()).unwrap();
        assert!(fetcher.fetch("not a url").is_err());
    }
}
