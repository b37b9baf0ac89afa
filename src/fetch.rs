//! HTTP collaborator seam. The engine only ever sees [`Fetcher`], so tests
//! swap in canned pages and the selection logic stays offline.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use std::time::Duration;
use url::Url;

use crate::error::{GrabError, Result};
use crate::types::FetchConfig;

/// A fetched page plus the URL it finally landed on. The site redirects
/// series slugs and chapter ids, and the landing path is what tells a
/// chapter page apart from a series page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub body: String,
}

pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn fetch(&self, url: &str, cfg: &FetchConfig) -> Result<FetchedPage>;
}

/// Default blocking fetcher.
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for ReqwestFetcher {
    fn name(&self) -> &'static str {
        "reqwest-blocking"
    }

    fn fetch(&self, url: &str, cfg: &FetchConfig) -> Result<FetchedPage> {
        Url::parse(url).map_err(|_| GrabError::InvalidUrl(url.into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&cfg.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        if let Some(cookie) = lang_option_cookie(&cfg.cookie_languages) {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.insert(COOKIE, value);
            }
        }

        let resp = self
            .client
            .get(url)
            .headers(headers)
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .send()?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(GrabError::Http {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let body = resp.text()?;

        Ok(FetchedPage { final_url, body })
    }
}

// The site reads `lang_option` to pre-filter listings. Languages are joined
// with an escaped semicolon since a raw ';' would end the cookie value.
fn lang_option_cookie(languages: &[String]) -> Option<String> {
    if languages.is_empty() {
        return None;
    }
    Some(format!("lang_option={}", languages.join("%3B")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_joins_languages_with_escaped_semicolon() {
        let langs = vec!["German".to_string(), "English".to_string()];
        assert_eq!(
            lang_option_cookie(&langs).unwrap(),
            "lang_option=German%3BEnglish"
        );
        assert_eq!(lang_option_cookie(&[]), None);
    }
}
