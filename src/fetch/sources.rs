use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{info, instrument, warn};

use super::{ChatSummarizer, Fetcher, RawContent};
use crate::error::{ConfigError, FetchError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

/// One named page to pull text from.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub url: Url,
    selector_text: String,
    selector: Selector,
}

impl Source {
    pub fn new(name: &str, url: &str, selector: Option<&str>) -> Result<Self, ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidSource(format!("={url}")));
        }
        let url = Url::parse(url.trim()).map_err(|e| ConfigError::InvalidUrl {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let selector_text = selector
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("body")
            .to_string();
        let selector = Selector::parse(&selector_text).map_err(|_| ConfigError::InvalidSelector {
            name: name.to_string(),
            selector: selector_text.clone(),
        })?;

        Ok(Self {
            name: name.to_string(),
            url,
            selector_text,
            selector,
        })
    }

    pub fn selector(&self) -> &str {
        &self.selector_text
    }
}

/// `NAME=URL` or `NAME=URL SELECTOR`.
impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, rest) = value
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidSource(value.to_string()))?;
        let rest = rest.trim();
        match rest.split_once(char::is_whitespace) {
            Some((url, selector)) => Source::new(name, url, Some(selector)),
            None if !rest.is_empty() => Source::new(name, rest, None),
            None => Err(ConfigError::InvalidSource(value.to_string())),
        }
    }
}

/// Fetches every source concurrently and stitches the results into one
/// Markdown document, one section per source.
pub struct SourcesFetcher {
    client: reqwest::Client,
    sources: Vec<Source>,
    timeout: Duration,
    max_words: usize,
    summarizer: Option<ChatSummarizer>,
}

impl SourcesFetcher {
    pub fn new(client: reqwest::Client, sources: Vec<Source>, timeout: Duration) -> Self {
        Self {
            client,
            sources,
            timeout,
            max_words: usize::MAX,
            summarizer: None,
        }
    }

    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    pub fn with_summarizer(mut self, summarizer: ChatSummarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    async fn fetch_source(&self, source: &Source) -> Result<String, FetchError> {
        tokio::time::timeout(self.timeout, self.load(source))
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::Timeout {
                    name: source.name.clone(),
                    after: self.timeout,
                })
            })
    }

    #[instrument(level = "info", skip_all, fields(source = %source.name))]
    async fn load(&self, source: &Source) -> Result<String, FetchError> {
        let http_error = |e| FetchError::Http {
            name: source.name.clone(),
            source: e,
        };

        let response = self
            .client
            .get(source.url.clone())
            .headers(browser_headers())
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                name: source.name.clone(),
                status,
            });
        }

        let html = response.text().await.map_err(http_error)?;
        let text = extract_text(&html, &source.selector).ok_or_else(|| {
            FetchError::NothingExtracted {
                name: source.name.clone(),
                selector: source.selector_text.clone(),
            }
        })?;
        let text = truncate_words(&text, self.max_words);
        info!(words = text.split_whitespace().count(), "extracted");

        match &self.summarizer {
            Some(summarizer) => {
                summarizer
                    .summarize(&text)
                    .await
                    .map_err(|reason| FetchError::Summarize {
                        name: source.name.clone(),
                        reason,
                    })
            }
            None => Ok(text),
        }
    }
}

#[async_trait]
impl Fetcher for SourcesFetcher {
    async fn fetch(&self) -> Result<RawContent, FetchError> {
        let results = join_all(self.sources.iter().map(|s| self.fetch_source(s))).await;
        combine(
            self.sources
                .iter()
                .map(|s| s.name.as_str())
                .zip(results),
        )
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("text/html,*/*;q=0.8"));
    headers
}

/// Visible text of every element matching `selector`, one paragraph per
/// element with whitespace collapsed. `None` when nothing matched or all
/// matches were blank.
pub fn extract_text(html: &str, selector: &Selector) -> Option<String> {
    let document = Html::parse_document(html);
    let paragraphs: Vec<String> = document
        .select(selector)
        .map(|element| {
            let text = element.text().collect::<Vec<_>>().join(" ");
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect();

    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n\n"))
    }
}

/// Keeps at most `max_words` words, preserving paragraph breaks.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let mut remaining = max_words;
    let mut paragraphs = Vec::new();
    for paragraph in text.split("\n\n") {
        if remaining == 0 {
            break;
        }
        let words: Vec<&str> = paragraph.split_whitespace().take(remaining).collect();
        remaining -= words.len();
        if !words.is_empty() {
            paragraphs.push(words.join(" "));
        }
    }
    paragraphs.join("\n\n")
}

/// Stitches per-source outcomes into one Markdown document.
///
/// Failed sources become a visible note in their place. Only when every
/// source failed is the whole fetch a failure.
pub fn combine<'a>(
    results: impl IntoIterator<Item = (&'a str, Result<String, FetchError>)>,
) -> Result<RawContent, FetchError> {
    let mut sections = Vec::new();
    let mut failures = Vec::new();
    let mut succeeded = 0;

    for (name, result) in results {
        match result {
            Ok(text) => {
                succeeded += 1;
                sections.push(format!("## {name}\n\n{}", text.trim()));
            }
            Err(err) => {
                warn!(source = name, error = %err, "source failed");
                sections.push(format!("_Source {name} failed: {err}_"));
                failures.push(err.to_string());
            }
        }
    }

    if succeeded == 0 {
        return Err(if failures.is_empty() {
            FetchError::Empty
        } else {
            FetchError::AllSourcesFailed {
                count: failures.len(),
                summary: failures.join("; "),
            }
        });
    }
    if !failures.is_empty() {
        warn!(
            failed = failures.len(),
            succeeded, "digest built with partial sources"
        );
    }

    Ok(sections.join("\n\n"))
}
