use crate::error::LoaderError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = "ITInfraAssistant/1.0";

#[derive(Debug, Clone)]
pub struct WebPage {
    pub title: Option<String>,
    pub text: String,
}

#[async_trait]
pub trait WebFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<WebPage, LoaderError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, LoaderError> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<WebPage, LoaderError> {
        debug!(url, "fetching page");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(LoaderError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let html = response.text().await?;
        Ok(WebPage {
            title: html_title(&html),
            text: html_to_text(&html),
        })
    }
}

struct HtmlPatterns {
    hidden: Regex,
    comment: Regex,
    block_end: Regex,
    tag: Regex,
    title: Regex,
    blank_lines: Regex,
}

fn patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        hidden: Regex::new(r"(?is)<(script|style|noscript|template)\b.*?</(script|style|noscript|template)\s*>")
            .expect("static regex"),
        comment: Regex::new(r"(?s)<!--.*?-->").expect("static regex"),
        block_end: Regex::new(r"(?i)</?(p|div|br|li|ul|ol|tr|table|section|article|h[1-6])\b[^>]*>")
            .expect("static regex"),
        tag: Regex::new(r"(?s)<[^>]*>").expect("static regex"),
        title: Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("static regex"),
        blank_lines: Regex::new(r"\n\s*\n+").expect("static regex"),
    })
}

pub fn html_title(html: &str) -> Option<String> {
    patterns()
        .title
        .captures(html)
        .and_then(|capture| capture.get(1))
        .map(|title| decode_entities(title.as_str().trim()))
        .filter(|title| !title.is_empty())
}

/// Reduces an HTML page to its visible text, one block element per line.
pub fn html_to_text(html: &str) -> String {
    let patterns = patterns();
    let text = patterns.hidden.replace_all(html, " ");
    let text = patterns.comment.replace_all(&text, " ");
    let text = patterns.title.replace_all(&text, " ");
    let text = patterns.block_end.replace_all(&text, "\n");
    let text = patterns.tag.replace_all(&text, " ");
    let text = decode_entities(&text);

    let lines = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    patterns
        .blank_lines
        .replace_all(&lines, "\n\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::{html_title, html_to_text};

    #[test]
    fn strips_scripts_styles_and_tags() {
        let html = r#"<html><head><title>EUC &amp; VDI</title><style>p { color: red; }</style></head>
<body><script>var x = 1;</script><h1>End-user computing</h1><p>Thin&nbsp;clients and <b>VDI</b>.</p><!-- hidden --></body></html>"#;

        let text = html_to_text(html);
        assert!(text.contains("End-user computing"));
        assert!(text.contains("Thin clients and VDI ."));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains('<'));
        assert_eq!(html_title(html).as_deref(), Some("EUC & VDI"));
    }

    #[test]
    fn block_elements_become_paragraphs() {
        let text = html_to_text("<div>one</div>\n\n\n<div>two</div>");
        assert_eq!(text, "one\n\ntwo");
    }

    mod http {
        use crate::web::{HttpFetcher, WebFetcher};
        use crate::error::LoaderError;
        use crate::test_server::serve;
        use axum::http::{HeaderMap, StatusCode};
        use axum::response::Html;
        use axum::routing::get;
        use axum::Router;

        fn site() -> Router {
            Router::new()
                .route(
                    "/euc",
                    get(|headers: HeaderMap| async move {
                        let agent = headers
                            .get("user-agent")
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        Html(format!(
                            "<html><head><title>EUC</title></head><body><p>Agent {agent}</p></body></html>"
                        ))
                    }),
                )
                .route("/gone", get(|| async { StatusCode::GONE }))
        }

        #[tokio::test]
        async fn page_is_fetched_with_the_configured_agent() {
            let base = serve(site()).await;
            let fetcher = HttpFetcher::new("ITInfraAssistant/1.0").unwrap();

            let page = fetcher.fetch(&format!("{base}/euc")).await.unwrap();
            assert_eq!(page.title.as_deref(), Some("EUC"));
            assert!(page.text.contains("Agent ITInfraAssistant/1.0"));
        }

        #[tokio::test]
        async fn error_status_is_reported_with_the_url() {
            let base = serve(site()).await;
            let fetcher = HttpFetcher::new("ITInfraAssistant/1.0").unwrap();
            let url = format!("{base}/gone");

            match fetcher.fetch(&url).await {
                Err(LoaderError::HttpStatus { url: failed, status }) => {
                    assert_eq!(failed, url);
                    assert_eq!(status, 410);
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }
}
