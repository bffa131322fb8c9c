use actix_web::{
    http::{header, Method},
    route, web, HttpRequest, HttpResponse, Responder,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod cache;
pub mod custom_date;
pub mod error;
pub mod fetch;
pub mod page;
pub mod render;

use cache::RefreshCache;
use error::ConfigError;
use fetch::summarize::DEFAULT_SYSTEM_PROMPT;
use fetch::{ChatSummarizer, CommandFetcher, Fetcher, Source, SourcesFetcher};
use page::Page;
use render::{MarkdownRenderer, PreformattedRenderer, Renderer};

const DEFAULT_SOURCE: &str = "FT=https://www.ft.com/ .n-layout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RendererKind {
    /// Render the digest as Markdown.
    Markdown,
    /// Show the digest verbatim in a <pre> block.
    Pre,
}

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Args {
    #[clap(short, long, env = "NEWS_DIGEST_IP", default_value = "127.0.0.1")]
    pub ip: String,

    #[clap(short, long, env = "NEWS_DIGEST_PORT", default_value = "8080")]
    pub port: u16,

    /// Seconds a digest is served before the next request refreshes it.
    #[clap(short, long, env = "NEWS_DIGEST_CACHE_LIFETIME", default_value = "3600")]
    pub cache_lifetime: u64,

    /// Seconds between browser auto-reloads of the page.
    #[clap(long, env = "NEWS_DIGEST_PAGE_REFRESH", default_value = "1")]
    pub page_refresh: u32,

    /// Upper bound in seconds for the command, or for each source.
    #[clap(long, env = "NEWS_DIGEST_FETCH_TIMEOUT", default_value = "120")]
    pub fetch_timeout: u64,

    /// Shell pipeline whose stdout becomes the digest. Overrides --source.
    #[clap(long, env = "NEWS_DIGEST_COMMAND")]
    pub command: Option<String>,

    #[clap(long, env = "NEWS_DIGEST_SHELL", default_value = "bash")]
    pub shell: String,

    /// NAME=URL [SELECTOR]; repeatable.
    #[clap(long = "source", env = "NEWS_DIGEST_SOURCES", value_delimiter = ';')]
    pub sources: Vec<Source>,

    /// Words kept per source before summarizing.
    #[clap(long, env = "NEWS_DIGEST_MAX_WORDS", default_value = "3000")]
    pub max_words: usize,

    #[clap(
        long,
        env = "NEWS_DIGEST_LLM_ENDPOINT",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    pub llm_endpoint: String,

    #[clap(long, env = "NEWS_DIGEST_LLM_MODEL", default_value = "gpt-4o")]
    pub llm_model: String,

    /// Enables summarizing each source when set.
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[clap(long, env = "NEWS_DIGEST_SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    #[clap(long, env = "NEWS_DIGEST_RENDERER", value_enum, default_value = "markdown")]
    pub renderer: RendererKind,

    /// IANA zone for the times shown on the page.
    #[clap(long, env = "NEWS_DIGEST_TIMEZONE", default_value = "UTC")]
    pub timezone: String,

    #[clap(long, env = "NEWS_DIGEST_TITLE", default_value = "News Summary")]
    pub title: String,

    /// Fetch once at startup instead of on the first page load.
    #[clap(long, env = "NEWS_DIGEST_PREFETCH")]
    pub prefetch: bool,
}

/// Validated server settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub address: String,
    pub ttl: Duration,
    pub page_refresh: u32,
    pub timezone: Tz,
    pub title: String,
}

impl Args {
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        if self.fetch_timeout == 0 {
            return Err(ConfigError::Zero("fetch-timeout"));
        }
        if self.page_refresh == 0 {
            return Err(ConfigError::Zero("page-refresh"));
        }
        if self.max_words == 0 {
            return Err(ConfigError::Zero("max-words"));
        }
        let timezone = custom_date::parse_timezone(&self.timezone)
            .ok_or_else(|| ConfigError::InvalidTimezone(self.timezone.clone()))?;

        Ok(Settings {
            address: format!("{}:{}", self.ip, self.port),
            ttl: Duration::from_secs(self.cache_lifetime),
            page_refresh: self.page_refresh,
            timezone,
            title: self.title.clone(),
        })
    }

    pub fn fetcher(&self) -> Result<Arc<dyn Fetcher>, ConfigError> {
        let timeout = Duration::from_secs(self.fetch_timeout);

        if let Some(command) = &self.command {
            return Ok(Arc::new(
                CommandFetcher::new(command.clone(), timeout).with_shell(self.shell.clone()),
            ));
        }

        let sources = if self.sources.is_empty() {
            vec![DEFAULT_SOURCE.parse()?]
        } else {
            self.sources.clone()
        };

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut fetcher = SourcesFetcher::new(client.clone(), sources, timeout)
            .with_max_words(self.max_words);
        if let Some(api_key) = &self.llm_api_key {
            fetcher = fetcher.with_summarizer(
                ChatSummarizer::new(
                    client,
                    self.llm_endpoint.clone(),
                    self.llm_model.clone(),
                    api_key.clone(),
                )
                .with_system_prompt(self.system_prompt.clone()),
            );
        }
        Ok(Arc::new(fetcher))
    }

    pub fn renderer(&self) -> Arc<dyn Renderer> {
        match self.renderer {
            RendererKind::Markdown => Arc::new(MarkdownRenderer),
            RendererKind::Pre => Arc::new(PreformattedRenderer),
        }
    }
}

pub struct AppState {
    pub settings: Settings,
    pub cache: Arc<RefreshCache>,
}

#[route("/", method = "GET", method = "HEAD")]
pub async fn index(app_data: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let snapshot = app_data.cache.get_current().await;

    if let Some(err) = snapshot.last_error() {
        if snapshot.content().is_empty() {
            debug!(error = %err, "no digest yet, serving unavailable notice");
        } else {
            debug!(error = %err, "serving stale digest");
        }
    }

    let settings = &app_data.settings;
    let html = Page {
        title: &settings.title,
        now: Utc::now(),
        timezone: settings.timezone,
        refresh_secs: settings.page_refresh,
        snapshot: &snapshot,
    }
    .to_html();

    create_response(&req, &html, snapshot.fetched_at(), settings.page_refresh)
}

fn create_response(
    req: &HttpRequest,
    body: &str,
    fetched_at: Option<DateTime<Utc>>,
    max_age: u32,
) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    response.insert_header((header::CONTENT_TYPE, "text/html; charset=utf-8"));
    response.insert_header(header::CacheControl(vec![header::CacheDirective::MaxAge(
        max_age,
    )]));
    if let Some(at) = fetched_at {
        let last_modified = header::HttpDate::from(custom_date::to_system_time(at));
        response.insert_header((header::LAST_MODIFIED, last_modified.to_string()));
    }

    if req.method() == Method::HEAD {
        response
            .insert_header((header::CONTENT_LENGTH, body.len()))
            .finish()
    } else {
        response.body(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["news-digest"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let args = args(&[]);
        let settings = args.settings().unwrap();
        assert_eq!(settings.address, "127.0.0.1:8080");
        assert_eq!(settings.ttl, Duration::from_secs(3600));
        assert_eq!(settings.page_refresh, 1);
        assert_eq!(settings.timezone, Tz::UTC);
        assert_eq!(args.renderer, RendererKind::Markdown);
        assert!(args.fetcher().is_ok());
    }

    #[test]
    fn repeated_sources() {
        let args = args(&[
            "--source",
            "FT=https://www.ft.com/ .n-layout",
            "--source",
            "CNN=https://lite.cnn.com .card--lite",
        ]);
        assert_eq!(args.sources.len(), 2);
        assert_eq!(args.sources[1].name, "CNN");
        assert_eq!(args.sources[1].selector(), ".card--lite");
    }

    #[test]
    fn bad_source_is_rejected_at_parse_time() {
        let argv = ["news-digest", "--source", "no-equals-sign"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn bad_timezone() {
        let err = args(&["--timezone", "Nowhere/Special"]).settings().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimezone(_)));
    }

    #[test]
    fn zero_timeout() {
        let err = args(&["--fetch-timeout", "0"]).settings().unwrap_err();
        assert!(matches!(err, ConfigError::Zero("fetch-timeout")));
    }

    #[test]
    fn zero_page_refresh() {
        let err = args(&["--page-refresh", "0"]).settings().unwrap_err();
        assert!(matches!(err, ConfigError::Zero("page-refresh")));
    }
}
