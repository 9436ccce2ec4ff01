use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Url};

use crate::session::{SessionStore, SharedJar};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Connection error for {url}: {message}")]
    Network { url: String, message: String },
    #[error("HTTP status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to fetch {url} after {attempts} attempts")]
    ExhaustedRetries { url: String, attempts: u32 },
}

impl FetchError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::Request(err)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network { .. } | FetchError::Status { .. })
    }
}

/// Fixed-delay retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// `policy.attempts` tries have been made. Waits `policy.delay` between tries.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, url: &str, attempt: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts.max(1);
    let backoff = ConstantBuilder::default()
        .with_delay(policy.delay)
        .with_max_times((attempts - 1) as usize);
    let retried = AtomicU32::new(0);

    let result = attempt
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(FetchError::is_retryable)
        .notify(|err: &FetchError, delay: Duration| {
            let n = retried.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!(
                "{}. Retrying {}/{} in {:?}...",
                err,
                n,
                attempts - 1,
                delay
            );
        })
        .await;

    match result {
        Err(e) if e.is_retryable() => {
            log::error!("Giving up on {} after {} attempts", url, attempts);
            Err(FetchError::ExhaustedRetries {
                url: url.to_string(),
                attempts,
            })
        }
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Whether a request carries the persisted cookie session. A fresh session
/// starts with an empty jar that lives only for the one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Shared,
    Fresh,
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: Method,
    pub url: String,
    pub referer: Option<String>,
    pub form: Option<Vec<(String, String)>>,
    pub session: SessionMode,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            referer: None,
            form: None,
            session: SessionMode::Shared,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            form: Some(form),
            ..Self::get(url)
        }
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn fresh_session(mut self) -> Self {
        self.session = SessionMode::Fresh;
        self
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers
}

fn build_client(jar: Option<Arc<SharedJar>>) -> Result<Client, reqwest::Error> {
    // Accept-Encoding is negotiated by reqwest so responses get decompressed.
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(USER_AGENT)
        .default_headers(browser_headers());
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    builder.build()
}

/// Sends requests one at a time with browser-like headers, retrying flaky calls
/// and persisting the cookie session around each call.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    jar: Arc<SharedJar>,
    store: Arc<dyn SessionStore>,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(policy: RetryPolicy, store: Arc<dyn SessionStore>) -> Result<Self, FetchError> {
        let jar = Arc::new(SharedJar::default());
        Ok(Self {
            client: build_client(Some(jar.clone()))?,
            jar,
            store,
            policy,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches the body of a page, failing only once retries are exhausted.
    pub async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError> {
        let fresh;
        let client = match request.session {
            SessionMode::Shared => {
                self.jar.replace(self.store.load());
                &self.client
            }
            SessionMode::Fresh => {
                fresh = build_client(Some(Arc::new(SharedJar::default())))?;
                &fresh
            }
        };

        log::debug!("{:?} {}", request.method, request.url);
        let body = retry(&self.policy, &request.url, move || {
            self.send_once(client, request)
        })
        .await?;

        if request.session == SessionMode::Shared
            && let Err(e) = self.store.save(&self.jar.snapshot())
        {
            log::warn!("Failed to save cookies: {}", e);
        }

        Ok(body)
    }

    async fn send_once(&self, client: &Client, request: &PageRequest) -> Result<String, FetchError> {
        let url = request.url.as_str();
        let mut builder = match request.method {
            Method::Get => client.get(url),
            Method::Post => client.post(url),
        };

        if let Some(referer) = &request.referer {
            builder = builder.header(header::REFERER, referer);
        }
        if let Some(form) = &request.form {
            if let Ok(parsed) = Url::parse(url) {
                builder = builder.header(header::ORIGIN, parsed.origin().ascii_serialization());
            }
            builder = builder.form(form);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}
