use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;

use crate::decode::decode_text;
use crate::PageError;

/// HTTP behavior for extractor implementations built on [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: "crypto-sentiment-harvester/1.0".to_string(),
        }
    }
}

/// A fetched, charset-decoded text response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedText {
    pub text: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub encoding_label: String,
}

/// GET helper for API and render tiers: timeouts, redirect cap, streamed
/// body with a byte ceiling, and status classification into the engine's
/// retry taxonomy. Extractors parse the returned text themselves.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    settings: HttpSettings,
}

impl HttpFetcher {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, PageError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(
                self.settings.redirect_limit,
            ))
            .build()
            .map_err(|err| PageError::Transient(err.to_string()))
    }

    pub async fn get_text(&self, url: &str) -> Result<FetchedText, PageError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| PageError::Malformed(format!("invalid url {url}: {err}")))?;
        let client = self.build_client()?;

        let response = client
            .get(parsed)
            .header(USER_AGENT, &self.settings.user_agent)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(PageError::Malformed(format!(
                    "response too large ({content_len} bytes)"
                )));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(PageError::Malformed(format!(
                    "response too large (over {} bytes)",
                    self.settings.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let decoded = decode_text(&bytes, content_type.as_deref());
        Ok(FetchedText {
            text: decoded.text,
            final_url,
            content_type,
            encoding_label: decoded.encoding_label,
        })
    }
}

fn classify_status(status: StatusCode) -> PageError {
    match status.as_u16() {
        401 | 403 | 407 | 451 => PageError::Blocked(format!("http status {status}")),
        408 | 429 => PageError::Transient(format!("http status {status}")),
        code if code >= 500 => PageError::Transient(format!("http status {status}")),
        _ => PageError::Malformed(format!("unexpected http status {status}")),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> PageError {
    if err.is_timeout() {
        return PageError::Transient(format!("timeout: {err}"));
    }
    if err.is_redirect() {
        // Redirect storms are how consent walls and bot checks present.
        return PageError::Blocked(format!("redirect limit exceeded: {err}"));
    }
    PageError::Transient(format!("network error: {err}"))
}
