//! HTTP issuing layer: one shared connection pool for every virtual
//! user, with session state (cookies) owned by each virtual user and
//! never shared.

use crate::error::Error;
use crate::metrics::{Counter, Trend};
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::{Client, Method, StatusCode, Url};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
#[allow(unused)]
use tracing::{debug, trace, warn};

/// Shared request issuer. Clones share the same underlying connection
/// pool (keep-alive across virtual users); cookie state lives in the
/// caller's [`CookieJar`].
#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Client,
    base_url: Url,
    http_reqs: Counter,
    http_req_duration: Trend,
}

impl HttpClient {
    pub fn new(
        base_url: Url,
        timeout: Duration,
        http_reqs: Counter,
        http_req_duration: Trend,
    ) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            http_reqs,
            http_req_duration,
        })
    }

    /// Issue one request with timing instrumentation. The response body
    /// is read to completion so the measured duration covers the full
    /// transfer, matching what a page load costs.
    pub async fn request(
        &self,
        jar: &mut CookieJar,
        method: Method,
        path: &str,
        form: Option<&[(&str, &str)]>,
        tag: &'static str,
    ) -> Result<PageResponse, Error> {
        let url = self.base_url.join(path)?;
        let mut builder = self.client.request(method, url.clone());
        if let Some(cookie) = jar.header_value() {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(form) = form {
            builder = builder.form(form);
        }

        self.http_reqs.add(1);
        let start = Instant::now();
        let outcome = async {
            let response = builder.send().await?;
            let status = response.status();
            jar.store_from(response.headers());
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;

        match outcome {
            Ok((status, body)) => {
                let duration = start.elapsed();
                self.http_req_duration.record_duration(duration);
                trace!(tag, %status, ms = duration.as_millis() as u64, %url, "request complete");
                Ok(PageResponse {
                    status,
                    body,
                    duration,
                })
            }
            Err(err) => {
                debug!(tag, %err, %url, "transport failure");
                Err(err.into())
            }
        }
    }
}

/// A completed HTTP exchange as seen by checks.
#[derive(Debug)]
pub struct PageResponse {
    status: StatusCode,
    body: String,
    duration: Duration,
}

impl PageResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn body_contains(&self, needle: &str) -> bool {
        self.body.contains(needle)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1e3
    }
}

/// Per-virtual-user session state, mutated by `Set-Cookie` response
/// headers and replayed on every subsequent request from the same
/// virtual user. Attributes (path, expiry) are ignored: the engine
/// talks to a single origin.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        Some(pairs.join("; "))
    }

    fn store_from(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if value.is_empty() {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }
}

#[cfg(test)]
impl PageResponse {
    pub(crate) fn test_stub(status: u16, body: String, duration: Duration) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body,
            duration,
        }
    }
}
