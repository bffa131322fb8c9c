use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::cache::Snapshot;
use crate::custom_date::format_rfc1123;
use crate::render::escape_html;

pub const UNAVAILABLE_NOTICE: &str =
    "The news summary is currently unavailable. Please check back later.";
pub const PENDING_NOTICE: &str = "The news summary has not been fetched yet.";

pub struct Page<'a> {
    pub title: &'a str,
    pub now: DateTime<Utc>,
    pub timezone: Tz,
    pub refresh_secs: u32,
    pub snapshot: &'a Snapshot,
}

impl Page<'_> {
    /// Digest markup, or a notice when there is nothing to show yet.
    fn body(&self) -> String {
        let snapshot = self.snapshot;
        if !snapshot.content().is_empty() {
            return snapshot.content().to_string();
        }
        let notice = if snapshot.last_error().is_some() {
            UNAVAILABLE_NOTICE
        } else {
            PENDING_NOTICE
        };
        format!(r#"<p class="notice">{notice}</p>"#)
    }

    fn updated(&self) -> String {
        match self.snapshot.fetched_at() {
            Some(at) if self.snapshot.has_succeeded() => format!(
                r#"<p class="updated">Last refreshed {}</p>"#,
                format_rfc1123(at, self.timezone)
            ),
            _ => String::new(),
        }
    }

    pub fn to_html(&self) -> String {
        let current_time = format_rfc1123(self.now, self.timezone);

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <meta http-equiv="refresh" content="{refresh}">
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
            line-height: 1.6;
            margin: 0;
            padding: 20px;
            background-color: #f4f7f6;
            color: #333;
        }}
        .container {{
            max-width: 800px;
            margin: 20px auto;
            padding: 30px;
            background-color: #ffffff;
            border-radius: 8px;
            box-shadow: 0 2px 10px rgba(0, 0, 0, 0.1);
        }}
        h1 {{ color: #2c3e50; font-size: 1.8em; margin-bottom: 0.5em; }}
        h2 {{
            color: #34495e;
            font-size: 1.4em;
            margin-top: 1.5em;
            margin-bottom: 0.7em;
            border-bottom: 1px solid #ecf0f1;
            padding-bottom: 0.3em;
        }}
        hr {{ border: 0; height: 1px; background-color: #bdc3c7; margin: 2em 0; }}
        pre {{
            white-space: pre-wrap;
            overflow-wrap: break-word;
            background-color: #ecf0f1;
            padding: 15px;
            border-radius: 4px;
            font-family: "Courier New", Courier, monospace;
            font-size: 0.95em;
        }}
        .notice {{ color: #7f8c8d; font-style: italic; }}
        .updated {{ color: #95a5a6; font-size: 0.85em; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>The current time is: {current_time}</h1>
        <hr>
        <h2>{title}</h2>
        {updated}
        <div class="digest">
{body}
        </div>
    </div>
</body>
</html>
"#,
            refresh = self.refresh_secs,
            current_time = current_time,
            title = escape_html(self.title),
            updated = self.updated(),
            body = self.body(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{ManualClock, ScriptedFetcher};
    use crate::cache::{Clock, RefreshCache};
    use crate::render::PreformattedRenderer;
    use std::sync::Arc;
    use std::time::Duration;

    async fn snapshot_after(script: Vec<Result<&str, &str>>) -> Arc<Snapshot> {
        let cache = Arc::new(RefreshCache::with_clock(
            Duration::from_secs(60),
            Arc::new(ScriptedFetcher::new(script)),
            Arc::new(PreformattedRenderer),
            Arc::new(ManualClock::new()),
        ));
        cache.get_current().await
    }

    fn page(snapshot: &Snapshot) -> String {
        Page {
            title: "FT <News> Summary",
            now: ManualClock::new().now(),
            timezone: Tz::UTC,
            refresh_secs: 1,
            snapshot,
        }
        .to_html()
    }

    #[test]
    fn pending_before_first_fetch() {
        let html = page(&Snapshot::default());
        assert!(html.contains(PENDING_NOTICE));
        assert!(!html.contains("Last refreshed"));
        assert!(html.contains(r#"<meta http-equiv="refresh" content="1">"#));
        assert!(html.contains("The current time is: Wed, 01 May 2024 12:00:00 UTC"));
        assert!(html.contains("<h2>FT &lt;News&gt; Summary</h2>"));
        assert!(html.contains("<title>FT &lt;News&gt; Summary</title>"));
    }

    #[tokio::test]
    async fn shows_digest() {
        let snapshot = snapshot_after(vec![Ok("Stocks rose")]).await;
        let html = page(&snapshot);
        assert!(html.contains("<pre>Stocks rose</pre>"));
        assert!(html.contains("Last refreshed Wed, 01 May 2024 12:00:00 UTC"));
        assert!(!html.contains(UNAVAILABLE_NOTICE));
    }

    #[tokio::test]
    async fn unavailable_when_never_succeeded() {
        let snapshot = snapshot_after(vec![Err("curl: (6) Could not resolve host")]).await;
        let html = page(&snapshot);
        assert!(html.contains(UNAVAILABLE_NOTICE));
        assert!(!html.contains("Could not resolve host"));
    }
}
