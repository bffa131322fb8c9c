use pulldown_cmark::{html, Event, Options, Parser};

/// Turns fetched text into display markup. Must be pure and total.
pub trait Renderer: Send + Sync {
    fn render(&self, raw: &str) -> String;
}

/// CommonMark to HTML. Raw HTML in the input is shown as text, not passed
/// through.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, raw: &str) -> String {
        let parser = Parser::new_ext(raw, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES)
            .map(|event| match event {
                Event::Html(text) | Event::InlineHtml(text) => Event::Text(text),
                other => other,
            });

        let mut out = String::with_capacity(raw.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// Escaped text in a `<pre>` block.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreformattedRenderer;

impl Renderer for PreformattedRenderer {
    fn render(&self, raw: &str) -> String {
        format!("<pre>{}</pre>", escape_html(raw))
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_headings_and_paragraphs() {
        let html = MarkdownRenderer.render("## Markets\n\nStocks *rose*.");
        assert_eq!(html, "<h2>Markets</h2>\n<p>Stocks <em>rose</em>.</p>\n");
    }

    #[test]
    fn markdown_does_not_pass_html_through() {
        let html = MarkdownRenderer.render("<script>alert(1)</script>\n\nhi <b>there</b>");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn preformatted_escapes() {
        assert_eq!(
            PreformattedRenderer.render("a < b & \"c\""),
            "<pre>a &lt; b &amp; &quot;c&quot;</pre>"
        );
    }

    #[test]
    fn empty_input_renders_empty() {
        assert_eq!(MarkdownRenderer.render(""), "");
    }
}
