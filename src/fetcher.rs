//! Remote script retrieval.
//!
//! Requires are fetched one at a time in declaration order. A failed require
//! is logged and recorded but never aborts the remaining requires or the
//! owning script.

use crate::error::FetchError;
use crate::metadata::parse_metadata;
use crate::settings::Settings;
use crate::store::ScriptRecord;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Source of remote text. Implemented over HTTP by [`HttpFetcher`].
pub trait Fetch {
    fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: impl Into<String>, max_body_bytes: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::ClientInit(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: user_agent.into(),
            max_body_bytes,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FetchError> {
        Self::new(
            settings.fetch_timeout,
            settings.user_agent.clone(),
            settings.max_script_bytes,
        )
    }
}

/// Parse `url` and accept it only if the scheme is plaintext or TLS HTTP.
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

impl Fetch for HttpFetcher {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let parsed = validate_url(url)?;
        debug!(url = %parsed, "fetching");

        let response = self
            .client
            .get(parsed)
            .header("User-Agent", &self.user_agent)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.to_string() }
                } else if e.is_connect() {
                    FetchError::Connect { url: url.to_string() }
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown error").to_string(),
            });
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_body_bytes,
                });
            }
        }

        let body = response
            .text()
            .map_err(|e| FetchError::Network(format!("failed to read response: {}", e)))?;

        if body.len() > self.max_body_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.max_body_bytes,
            });
        }

        Ok(body)
    }
}

/// Outcome of fetching one `@require`.
#[derive(Debug)]
pub struct FetchedRequire {
    pub url: String,
    pub body: Result<String, FetchError>,
}

/// Fetch every require sequentially, in declaration order.
///
/// The result has exactly one entry per input URL, in the same order,
/// regardless of how many fetches failed.
pub fn resolve_requires<F: Fetch + ?Sized>(fetcher: &F, urls: &[String]) -> Vec<FetchedRequire> {
    urls.iter()
        .map(|url| {
            let body = fetcher.get(url);
            match &body {
                Ok(text) => debug!(%url, bytes = text.len(), "require fetched"),
                Err(e) => warn!(%url, error = %e, "require failed, continuing without it"),
            }
            FetchedRequire {
                url: url.clone(),
                body,
            }
        })
        .collect()
}

/// Fetch a script to add to a profile.
pub fn fetch_script<F: Fetch + ?Sized>(fetcher: &F, url: &str) -> Result<ScriptRecord, FetchError> {
    let code = fetcher.get(url)?;
    let metadata = parse_metadata(&code);
    info!(%url, name = %metadata.name, "script imported");

    Ok(ScriptRecord {
        name: metadata.name,
        update_url: Some(metadata.update_url.unwrap_or_else(|| url.to_string())),
        code,
    })
}

/// Refetch a script from its update URL.
pub fn fetch_update<F: Fetch + ?Sized>(fetcher: &F, script: &ScriptRecord) -> Result<ScriptRecord, FetchError> {
    let url = script.update_url.as_deref().ok_or(FetchError::NoUpdateUrl)?;
    let code = fetcher.get(url)?;
    let metadata = parse_metadata(&code);
    info!(%url, name = %metadata.name, version = %metadata.version, "script updated");

    Ok(ScriptRecord {
        name: metadata.name,
        update_url: metadata.update_url.or_else(|| script.update_url.clone()),
        code,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory fetcher that records the order URLs were requested in.
    #[derive(Default)]
    pub struct FakeFetcher {
        responses: HashMap<String, Result<String, u16>>,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        pub fn failing(mut self, url: &str, status: u16) -> Self {
            self.responses.insert(url.to_string(), Err(status));
            self
        }
    }

    impl Fetch for FakeFetcher {
        fn get(&self, url: &str) -> Result<String, FetchError> {
            self.calls.borrow_mut().push(url.to_string());
            match self.responses.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status: *status,
                    reason: "stub".to_string(),
                }),
                None => Err(FetchError::Connect { url: url.to_string() }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeFetcher;
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn requires_keep_declaration_order_through_failures() {
        let fetcher = FakeFetcher::default()
            .with("https://a.test/1.js", "one")
            .failing("https://a.test/2.js", 404)
            .with("http://a.test/3.js", "three");

        let declared = urls(&["https://a.test/1.js", "https://a.test/2.js", "http://a.test/3.js"]);
        let resolved = resolve_requires(&fetcher, &declared);

        assert_eq!(*fetcher.calls.borrow(), declared);
        let order: Vec<_> = resolved.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(order, ["https://a.test/1.js", "https://a.test/2.js", "http://a.test/3.js"]);
        assert_eq!(resolved[0].body.as_deref().ok(), Some("one"));
        assert!(matches!(resolved[1].body, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(resolved[2].body.as_deref().ok(), Some("three"));
    }

    #[test]
    fn validate_url_rejects_other_schemes() {
        assert!(validate_url("https://example.com/a.js").is_ok());
        assert!(validate_url("http://127.0.0.1:5500/a.js").is_ok());
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(FetchError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn fetch_script_defaults_update_url_to_source() {
        let fetcher = FakeFetcher::default().with(
            "https://example.com/x.user.js",
            "// ==UserScript==\n// @name X\n// ==/UserScript==\n",
        );
        let record = fetch_script(&fetcher, "https://example.com/x.user.js").unwrap();
        assert_eq!(record.name, "X");
        assert_eq!(record.update_url.as_deref(), Some("https://example.com/x.user.js"));
    }

    #[test]
    fn fetch_update_prefers_declared_update_url() {
        let fetcher = FakeFetcher::default().with(
            "https://old.test/s.js",
            "// ==UserScript==\n// @name New Name\n// @updateURL https://new.test/s.js\n// ==/UserScript==\n",
        );
        let script = ScriptRecord {
            name: "Old".to_string(),
            code: String::new(),
            update_url: Some("https://old.test/s.js".to_string()),
        };
        let updated = fetch_update(&fetcher, &script).unwrap();
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.update_url.as_deref(), Some("https://new.test/s.js"));

        let local = ScriptRecord {
            update_url: None,
            ..script
        };
        assert!(matches!(fetch_update(&fetcher, &local), Err(FetchError::NoUpdateUrl)));
    }
}
