//! Page fetching and HTML-to-text helpers shared by the crawler and the query extractor.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client};
use scraper::{node::Node, ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::{Host, Url};

const USER_AGENT: &str = concat!("assessment-recommender/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("refusing to fetch private or local address '{0}'")]
    BlockedHost(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Anything that can turn a URL into an HTML document.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed [`PageSource`] with a bounded per-request timeout. Loopback, private and
/// link-local hosts are refused, both up front and as redirect targets.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let policy = redirect::Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if is_blocked_host(attempt.url()) {
                attempt.error("redirect to a private or local address")
            } else {
                attempt.follow()
            }
        });
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(policy)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        if is_blocked_host(&parsed) {
            return Err(FetchError::BlockedHost(url.to_string()));
        }

        let to_error = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Http {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let response = self.client.get(parsed).send().await.map_err(to_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(to_error)?;
        debug!(url, bytes = body.len(), "fetched page");
        Ok(body)
    }
}

/// True for URLs with no host, `localhost`, or a loopback, private, link-local,
/// shared-address or unspecified IP literal.
pub fn is_blocked_host(url: &Url) -> bool {
    match url.host() {
        None => true,
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_blocked_v4(ip),
        Some(Host::Ipv6(ip)) => is_blocked_v6(ip),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}

/// Returns the input as a URL when it is a bare http(s) link.
pub fn as_http_url(input: &str) -> Option<Url> {
    let trimmed = input.trim();
    if trimmed.contains(char::is_whitespace) {
        return None;
    }
    Url::parse(trimmed)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
}

/// Extracts readable text from an HTML document: the `article`, `main` or `body` element,
/// skipping script/style content, with whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = pick_root(&document);

    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .map(|el| matches!(el.value().name(), "script" | "style" | "noscript" | "template"))
            .unwrap_or(false);
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

fn pick_root(document: &Html) -> ElementRef<'_> {
    ["article", "main", "body"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element())
}
