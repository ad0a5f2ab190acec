//! Spoofed client identity for one scrape run
//!
//! Every request in a run presents headers derived from exactly one
//! [`SessionIdentity`]. The identity is sampled lazily from an [`IdentityPool`],
//! held until [`IdentityProvider::reset`] discards it, and never edited in place.
//!
//! The pool is read-only and may be shared between concurrent runs; each run
//! owns its own provider.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::fetcher::{FetcherError, FetcherResult};
use crate::scraper::config::{RESET_COOLDOWN_MAX, RESET_COOLDOWN_MIN};
use crate::shutdown::ShutdownCoordinator;

static CHROME_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:Chrome|CriOS)/(\d+)").expect("valid regex"));
static EDGE_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Edg/(\d+)").expect("valid regex"));
static FIREFOX_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Firefox/(\d+)").expect("valid regex"));
static SAFARI_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Version/(\d+)").expect("valid regex"));

/// A realistic `(user_agent, accept_language)` pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityTemplate {
    /// Full `User-Agent` string
    pub user_agent: String,
    /// Matching `Accept-Language` value
    pub accept_language: String,
}

impl IdentityTemplate {
    /// Create a template
    pub fn new(user_agent: impl Into<String>, accept_language: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            accept_language: accept_language.into(),
        }
    }
}

/// How templates are drawn from a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    /// Uniform random draw (production)
    Randomized,
    /// Draw `n` takes template `n % len` (tests)
    Deterministic,
}

/// Read-only set of identity templates
#[derive(Debug, Clone)]
pub struct IdentityPool {
    templates: Vec<IdentityTemplate>,
    mode: PoolMode,
}

impl IdentityPool {
    /// Randomized pool over the built-in browser templates
    pub fn randomized() -> Self {
        Self {
            templates: default_templates(),
            mode: PoolMode::Randomized,
        }
    }

    /// Deterministic pool over caller-supplied templates
    ///
    /// An empty list falls back to the built-in templates.
    pub fn deterministic(templates: Vec<IdentityTemplate>) -> Self {
        let templates = if templates.is_empty() {
            default_templates()
        } else {
            templates
        };
        Self {
            templates,
            mode: PoolMode::Deterministic,
        }
    }

    /// Sampling mode
    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    /// Number of templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the pool has no templates
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Pick the template for the `draw`-th identity of a run
    pub fn pick(&self, draw: usize) -> &IdentityTemplate {
        match self.mode {
            PoolMode::Randomized => self
                .templates
                .choose(&mut rand::thread_rng())
                .unwrap_or(&self.templates[0]),
            PoolMode::Deterministic => &self.templates[draw % self.templates.len()],
        }
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::randomized()
    }
}

fn default_templates() -> Vec<IdentityTemplate> {
    vec![
        IdentityTemplate::new(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36",
            "en-US,en;q=0.9",
        ),
        IdentityTemplate::new(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
            "en-GB,en;q=0.9",
        ),
        IdentityTemplate::new(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36 Edg/137.0.0.0",
            "en-US,en;q=0.9,ar;q=0.8",
        ),
        IdentityTemplate::new(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
            "en-US,en;q=0.8",
        ),
        IdentityTemplate::new(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.5; rv:128.0) Gecko/20100101 Firefox/128.0",
            "en-US,en;q=0.5",
        ),
        IdentityTemplate::new(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
            "en-AE,en;q=0.9",
        ),
        IdentityTemplate::new(
            "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Mobile Safari/537.36",
            "ar-QA,ar;q=0.9,en-US;q=0.8,en;q=0.7",
        ),
    ]
}

/// Client-presentation identity used for a period of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// `User-Agent` header
    pub user_agent: String,
    /// `Accept-Language` header
    pub accept_language: String,
    /// Platform derived from the user agent (`"macOS"`, `"Windows"`, …)
    pub platform_hint: String,
    /// Browser major version derived from the user agent
    pub version_hint: Option<String>,
    /// When the identity was sampled
    pub created_at: DateTime<Utc>,
}

impl SessionIdentity {
    /// Derive an identity from a template
    pub fn from_template(template: &IdentityTemplate) -> Self {
        let ua = template.user_agent.as_str();
        Self {
            user_agent: template.user_agent.clone(),
            accept_language: template.accept_language.clone(),
            platform_hint: platform_from_user_agent(ua).to_string(),
            version_hint: version_from_user_agent(ua),
            created_at: Utc::now(),
        }
    }

    /// Whether the identity claims a Chromium-based browser (sends client hints)
    pub fn is_chromium(&self) -> bool {
        CHROME_VERSION.is_match(&self.user_agent) && !self.user_agent.contains("Firefox/")
    }

    /// Build the full request header set for this identity
    pub fn headers(&self) -> FetcherResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let static_headers = [
            ("accept", "*/*"),
            ("cache-control", "no-cache"),
            ("pragma", "no-cache"),
            ("content-type", "application/x-www-form-urlencoded;charset=UTF-8"),
            ("origin", "https://adstransparency.google.com"),
            ("referer", "https://adstransparency.google.com/"),
            ("sec-fetch-dest", "empty"),
            ("sec-fetch-mode", "cors"),
            ("sec-fetch-site", "same-origin"),
            ("x-same-domain", "1"),
        ];
        for (name, value) in static_headers {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        insert_header(&mut headers, "user-agent", &self.user_agent)?;
        insert_header(&mut headers, "accept-language", &self.accept_language)?;

        if self.is_chromium() {
            let mobile = if self.platform_hint == "Android" { "?1" } else { "?0" };
            insert_header(&mut headers, "sec-ch-ua-mobile", mobile)?;
            insert_header(
                &mut headers,
                "sec-ch-ua-platform",
                &format!("\"{}\"", self.platform_hint),
            )?;
            if let Some(version) = &self.version_hint {
                let brand = if self.user_agent.contains("Edg/") {
                    "Microsoft Edge"
                } else {
                    "Google Chrome"
                };
                insert_header(
                    &mut headers,
                    "sec-ch-ua",
                    &format!(
                        "\"{brand}\";v=\"{version}\", \"Chromium\";v=\"{version}\", \"Not/A)Brand\";v=\"24\""
                    ),
                )?;
            }
        }

        Ok(headers)
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> FetcherResult<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| FetcherError::InvalidRequest(format!("invalid {name} header: {e}")))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Platform name as a browser would report it in `sec-ch-ua-platform`
pub fn platform_from_user_agent(user_agent: &str) -> &'static str {
    if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
        "iOS"
    } else if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Macintosh") || user_agent.contains("Mac OS X") {
        "macOS"
    } else if user_agent.contains("CrOS") {
        "Chrome OS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

/// Browser major version claimed by a user agent
pub fn version_from_user_agent(user_agent: &str) -> Option<String> {
    [&EDGE_VERSION, &CHROME_VERSION, &FIREFOX_VERSION, &SAFARI_VERSION]
        .into_iter()
        .find_map(|re| re.captures(user_agent))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Holds the identity of one run
///
/// Owned by a single run; never shared.
#[derive(Debug)]
pub struct IdentityProvider {
    pool: Arc<IdentityPool>,
    current: Option<SessionIdentity>,
    draws: usize,
    resets: u32,
    cooldown: RangeInclusive<Duration>,
}

impl IdentityProvider {
    /// Create a provider drawing from `pool`
    pub fn new(pool: Arc<IdentityPool>) -> Self {
        Self {
            pool,
            current: None,
            draws: 0,
            resets: 0,
            cooldown: RESET_COOLDOWN_MIN..=RESET_COOLDOWN_MAX,
        }
    }

    /// Override the reset cooldown range
    pub fn with_cooldown(mut self, cooldown: RangeInclusive<Duration>) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Current identity, sampling one on first use
    pub fn get_identity(&mut self) -> &SessionIdentity {
        let Self {
            pool,
            current,
            draws,
            ..
        } = self;

        current.get_or_insert_with(|| {
            let identity = SessionIdentity::from_template(pool.pick(*draws));
            *draws += 1;
            debug!(
                platform = %identity.platform_hint,
                version = ?identity.version_hint,
                "Sampled session identity"
            );
            identity
        })
    }

    /// Whether an identity is currently held
    pub fn has_identity(&self) -> bool {
        self.current.is_some()
    }

    /// Number of resets performed so far
    pub fn reset_count(&self) -> u32 {
        self.resets
    }

    /// Discard the identity and cool down before returning
    ///
    /// The cooldown is drawn from the configured range (3–5 seconds by
    /// default). Returns [`FetcherError::Cancelled`] if shutdown is requested
    /// during the cooldown; the identity is discarded either way.
    pub async fn reset(&mut self, shutdown: &ShutdownCoordinator) -> FetcherResult<Duration> {
        self.current = None;
        self.resets += 1;

        let cooldown = self.draw_cooldown();
        info!(
            resets = self.resets,
            cooldown_ms = cooldown.as_millis() as u64,
            "Session identity discarded, cooling down"
        );

        if !shutdown.sleep(cooldown).await {
            return Err(FetcherError::Cancelled);
        }
        Ok(cooldown)
    }

    fn draw_cooldown(&self) -> Duration {
        let (min, max) = (*self.cooldown.start(), *self.cooldown.end());
        if max <= min {
            return min;
        }
        let span = (max - min).as_millis() as u64;
        min + Duration::from_millis(rand::thread_rng().gen_range(0..=span))
    }
}
