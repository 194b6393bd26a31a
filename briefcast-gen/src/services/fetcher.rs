//! Safe content fetcher
//!
//! Fetches a URL's page content for signal enrichment while defending
//! against request forgery into internal networks. The public entry point
//! never errors: blocked targets, network failures and oversized bodies all
//! degrade to a best-effort result derived from the URL itself.

use briefcast_common::config::FetchConfig;
use futures::StreamExt;
use regex::Regex;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use url::{Host, Url};

const USER_AGENT: &str = "Briefcast/0.1 (+https://briefcast.fm)";
const ALLOWED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/plain"];
const BLOCKED_HOST_SUFFIXES: &[&str] = &[".local", ".internal", ".lan", ".home.arpa"];

/// Extracted page content, each field best-effort
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub title: Option<String>,
    pub source: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Error)]
enum FetchError {
    #[error("URL blocked by safety policy")]
    Blocked,
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("redirect without Location header")]
    BadRedirect,
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Safe page fetcher with redirect re-validation and body size ceiling
pub struct SafeFetcher {
    client: reqwest::Client,
    max_redirects: usize,
    max_body_bytes: usize,
    max_words: usize,
}

impl SafeFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        // Redirects are followed manually so every hop gets re-validated
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
            max_words: config.max_words,
        }
    }

    /// Fetch and extract `{title, source, content}` for a URL.
    ///
    /// Never fails: on any error the result still carries a title derived
    /// from the URL path and a hostname source label.
    pub async fn fetch_page(&self, url: &str) -> PageContent {
        match self.fetch_inner(url).await {
            Ok(page) => page,
            Err(err) => {
                tracing::debug!(url, error = %err, "Page fetch degraded to URL-derived fallback");
                fallback_content(url)
            }
        }
    }

    async fn fetch_inner(&self, url: &str) -> Result<PageContent, FetchError> {
        let mut current = Url::parse(url)?;
        let mut response = None;

        for _hop in 0..=self.max_redirects {
            if !is_safe_url(&current) {
                return Err(FetchError::Blocked);
            }
            if let Some(Host::Domain(domain)) = current.host() {
                if !self.resolves_to_public(domain).await {
                    return Err(FetchError::Blocked);
                }
            }

            let resp = self.client.get(current.clone()).send().await?;
            if resp.status().is_redirection() {
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(FetchError::BadRedirect)?;
                current = current.join(location)?;
                continue;
            }

            response = Some(resp);
            break;
        }

        let response = response.ok_or(FetchError::TooManyRedirects)?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let is_html = content_type.starts_with("text/html")
            || content_type.starts_with("application/xhtml+xml");
        if !ALLOWED_CONTENT_TYPES
            .iter()
            .any(|allowed| content_type.starts_with(allowed))
        {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let body = self.read_capped(response).await?;
        let fallback = fallback_content(current.as_str());

        if is_html {
            let (title, text) = extract_from_html(&body, self.max_words);
            Ok(PageContent {
                title: title.or(fallback.title),
                source: fallback.source,
                content: text,
            })
        } else {
            let text = truncate_words(&body, self.max_words);
            Ok(PageContent {
                title: fallback.title,
                source: fallback.source,
                content: if text.is_empty() { None } else { Some(text) },
            })
        }
    }

    /// DNS check for domain targets. A resolution failure allows the fetch
    /// to fail naturally rather than blocking it.
    async fn resolves_to_public(&self, domain: &str) -> bool {
        match tokio::net::lookup_host((domain, 443)).await {
            Ok(addrs) => {
                let mut any = false;
                for addr in addrs {
                    any = true;
                    if ip_is_private(addr.ip()) {
                        tracing::warn!(domain, ip = %addr.ip(), "Hostname resolves to private range, blocked");
                        return false;
                    }
                }
                // Empty resolution: let the request fail on its own
                let _ = any;
                true
            }
            Err(_) => true,
        }
    }

    /// Stream the body up to the byte ceiling; overflow truncates
    async fn read_capped(&self, response: reqwest::Response) -> Result<String, FetchError> {
        let mut buf: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let remaining = self.max_body_bytes.saturating_sub(buf.len());
            if remaining == 0 {
                tracing::debug!("Response body exceeded byte ceiling, truncating");
                break;
            }
            buf.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Synchronous URL safety checks: scheme, literal hosts, reserved suffixes
pub fn is_safe_url(url: &Url) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }

    match url.host() {
        None => false,
        Some(Host::Ipv4(ip)) => !ip_is_private(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => !ip_is_private(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return false;
            }
            if BLOCKED_HOST_SUFFIXES.iter().any(|s| domain.ends_with(s)) {
                return false;
            }
            // Dotted-quad that url left as a domain (e.g. trailing dot)
            if let Ok(ip) = domain.trim_end_matches('.').parse::<IpAddr>() {
                return !ip_is_private(ip);
            }
            true
        }
    }
}

/// Private, loopback, link-local and otherwise non-routable ranges
pub fn ip_is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // Carrier-grade NAT 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return ip_is_private(IpAddr::V4(mapped));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique local fc00::/7
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // Link-local fe80::/10
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Best-effort content derived from the URL alone
fn fallback_content(url: &str) -> PageContent {
    let Ok(parsed) = Url::parse(url) else {
        return PageContent::default();
    };

    let title = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(slug_to_title)
        .filter(|t| !t.is_empty());

    let source = parsed.host_str().map(|host| {
        host.trim_start_matches("www.").to_string()
    });

    PageContent {
        title,
        source,
        content: None,
    }
}

/// "my-article_title.html" -> "My Article Title"
fn slug_to_title(slug: &str) -> String {
    let stem = slug.rsplit_once('.').map(|(s, _)| s).unwrap_or(slug);
    stem.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract (title, body text) from an HTML document
fn extract_from_html(html: &str, max_words: usize) -> (Option<String>, Option<String>) {
    let noise = Regex::new(
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<nav\b.*?</nav\s*>|<header\b.*?</header\s*>|<footer\b.*?</footer\s*>|<aside\b.*?</aside\s*>|<form\b.*?</form\s*>|<svg\b.*?</svg\s*>|<!--.*?-->",
    )
    .expect("static regex");
    let cleaned = noise.replace_all(html, " ");

    let title = extract_title(&cleaned);

    // Prefer article content over the full body
    let article = Regex::new(r"(?is)<article\b[^>]*>(.*?)</article\s*>").expect("static regex");
    let body = Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").expect("static regex");
    let scope = article
        .captures(&cleaned)
        .or_else(|| body.captures(&cleaned))
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| cleaned.to_string());

    let tags = Regex::new(r"(?s)<[^>]*>").expect("static regex");
    let text = tags.replace_all(&scope, " ");
    let text = truncate_words(&decode_entities(&text), max_words);

    (title, if text.is_empty() { None } else { Some(text) })
}

/// og:title, then <title>
fn extract_title(html: &str) -> Option<String> {
    let og_forward = Regex::new(
        r#"(?is)<meta\b[^>]*property\s*=\s*["']og:title["'][^>]*content\s*=\s*["']([^"']+)["']"#,
    )
    .expect("static regex");
    let og_reversed = Regex::new(
        r#"(?is)<meta\b[^>]*content\s*=\s*["']([^"']+)["'][^>]*property\s*=\s*["']og:title["']"#,
    )
    .expect("static regex");
    let title_tag = Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("static regex");

    og_forward
        .captures(html)
        .or_else(|| og_reversed.captures(html))
        .or_else(|| title_tag.captures(html))
        .map(|c| decode_entities(c[1].trim()))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

/// The handful of entities that actually show up in titles and copy
fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}

/// Collapse whitespace and cap at the prompting word budget
fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}
