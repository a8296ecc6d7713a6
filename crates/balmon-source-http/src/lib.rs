// # HTTP Page Source
//
// This crate provides an HTTP-based value source for the balance monitor.
//
// ## Purpose
//
// Fetches a location's public page and pulls the available balance out of
// its text. The reference pages say something like
// `... include acum 1.500 RON ...`; when that phrase is missing, the first
// `<n> RON` on the page is used instead.
//
// ## Limits
//
// Pages behind an anti-bot challenge cannot be read this way. A blocked
// response is reported as a failed observation, never as a zero balance,
// and the monitor falls back to `/balance` for manual entry.

use balmon_core::SourceRegistry;
use balmon_core::config::{LocationConfig, SourceConfig};
use balmon_core::traits::{ValueSource, ValueSourceFactory};
use balmon_core::{Error, Result};

use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

const SOURCE_NAME: &str = "http";

/// Browser-like User-Agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Amount with optional `.` thousands groups: `150`, `1.500`, `12.000.000`
const AMOUNT: &str = r"(\d{1,3}(?:\.\d{3})+|\d+)";

/// Extracts a balance from page text
#[derive(Debug, Clone)]
pub struct BalanceExtractor {
    primary: Regex,
    fallback: Regex,
}

impl BalanceExtractor {
    /// Build the default patterns for `currency`
    ///
    /// `primary` overrides the `include acum <n> <currency>` pattern; it must
    /// have exactly one capture group for the amount.
    pub fn new(currency: &str, primary: Option<&str>) -> Result<Self> {
        let currency = regex::escape(currency.trim());

        let primary = match primary {
            Some(pattern) => pattern.to_string(),
            None => format!(r"(?i)include\s+acum\s+{AMOUNT}\s*{currency}\b"),
        };
        let fallback = format!(r"(?i){AMOUNT}\s*{currency}\b");

        let primary = Regex::new(&primary)
            .map_err(|e| Error::config(format!("Invalid balance pattern: {}", e)))?;
        if primary.captures_len() < 2 {
            return Err(Error::config("Balance pattern needs a capture group for the amount"));
        }
        let fallback = Regex::new(&fallback)
            .map_err(|e| Error::config(format!("Invalid currency for balance pattern: {}", e)))?;

        Ok(Self { primary, fallback })
    }

    /// Find the balance in already-flattened page text
    pub fn extract(&self, text: &str) -> Option<u64> {
        [&self.primary, &self.fallback]
            .into_iter()
            .find_map(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .and_then(|amount| parse_amount(amount.as_str()))
    }
}

/// `1.500` -> 1500
fn parse_amount(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Reduces HTML to the visible text, roughly as a browser would render it
#[derive(Debug, Clone)]
pub struct PageText {
    hidden: Regex,
    tags: Regex,
    whitespace: Regex,
}

impl PageText {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::Other(format!("Invalid built-in pattern {}: {}", pattern, e)))
        };

        Ok(Self {
            hidden: compile(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>")?,
            tags: compile(r"(?s)<[^>]*>")?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Strip hidden blocks and tags, decode common entities, collapse whitespace
    pub fn flatten(&self, html: &str) -> String {
        let visible = self.hidden.replace_all(html, " ");
        let text = self.tags.replace_all(&visible, " ");
        let text = decode_entities(&text);
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Whether a response body is an anti-bot page rather than the real one
pub fn looks_blocked(body: &str) -> bool {
    (body.contains("Cloudflare") && body.contains("blocked"))
        || body.contains("<title>Just a moment...</title>")
}

/// HTTP page scraping value source
pub struct HttpPageSource {
    client: reqwest::Client,
    extractor: BalanceExtractor,
    page_text: PageText,
}

impl HttpPageSource {
    /// Create a new HTTP page source
    ///
    /// # Parameters
    ///
    /// - `currency`: Currency label that follows the amount on the page
    /// - `settings`: Request and pattern settings
    pub fn new(currency: &str, settings: &HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(
                settings
                    .user_agent
                    .as_deref()
                    .unwrap_or(DEFAULT_USER_AGENT),
            )
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            extractor: BalanceExtractor::new(currency, settings.balance_pattern.as_deref())?,
            page_text: PageText::new()?,
        })
    }

    /// Fetch the raw page
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "ro-RO,ro;q=0.9,en;q=0.8")
            .send()
            .await
            .map_err(|e| Error::source_error(SOURCE_NAME, format!("Request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(Error::source_error(
                SOURCE_NAME,
                format!("Blocked by anti-bot protection (status {})", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(Error::source_error(
                SOURCE_NAME,
                format!("HTTP error: {}", status),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| Error::source_error(SOURCE_NAME, format!("Failed to read response: {}", e)))
    }

    /// Turn a fetched page into a balance
    pub fn parse_page(&self, html: &str) -> Result<u64> {
        if looks_blocked(html) {
            return Err(Error::source_error(SOURCE_NAME, "Anti-bot challenge page"));
        }

        let text = self.page_text.flatten(html);
        self.extractor.extract(&text).ok_or_else(|| {
            Error::observation("No balance found on page")
        })
    }
}

#[async_trait::async_trait]
impl ValueSource for HttpPageSource {
    async fn observe(&self, location: &LocationConfig) -> Result<u64> {
        tracing::debug!("Fetching {} ({})", location.name, location.url);

        let html = self.fetch_page(&location.url).await?;
        let value = self.parse_page(&html)?;

        tracing::debug!("{}: extracted {}", location.name, value);
        Ok(value)
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}

/// Settings for [`HttpPageSource`]
///
/// Read from `SourceConfig::Http`, or from the JSON of a
/// `SourceConfig::Custom` entry whose factory is `http`.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub balance_pattern: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: None,
            request_timeout_secs: default_request_timeout_secs(),
            balance_pattern: None,
            currency: default_currency(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_currency() -> String {
    "RON".to_string()
}

/// Factory for creating HTTP page sources
#[derive(Debug, Clone)]
pub struct HttpSourceFactory {
    currency: String,
}

impl HttpSourceFactory {
    /// `currency` is the label that follows amounts on the page
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }
}

impl Default for HttpSourceFactory {
    fn default() -> Self {
        Self::new(default_currency())
    }
}

impl ValueSourceFactory for HttpSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn ValueSource>> {
        let settings = match config {
            SourceConfig::Http {
                user_agent,
                request_timeout_secs,
                balance_pattern,
            } => HttpSettings {
                user_agent: user_agent.clone(),
                request_timeout_secs: *request_timeout_secs,
                balance_pattern: balance_pattern.clone(),
                currency: self.currency.clone(),
            },
            SourceConfig::Custom { config, .. } => serde_json::from_value(config.clone())
                .map_err(|e| Error::config(format!("Invalid HTTP source config: {}", e)))?,
            SourceConfig::Manual => {
                return Err(Error::config("Invalid config for HTTP value source"));
            }
        };

        if settings.request_timeout_secs == 0 {
            return Err(Error::config("HTTP source request timeout must be > 0"));
        }

        Ok(Box::new(HttpPageSource::new(&settings.currency, &settings)?))
    }
}

/// Register the HTTP page source with a registry
pub fn register(registry: &mut SourceRegistry, currency: &str) {
    registry.register_source(SOURCE_NAME, Box::new(HttpSourceFactory::new(currency)));
}
