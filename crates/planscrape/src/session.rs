use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use cookie::Cookie;
use cookie::time::{Duration, OffsetDateTime};
use reqwest::Url;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cookie file error: {0}")]
    Io(#[from] io::Error),
    #[error("Cookie serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cookies keyed by domain, then by cookie name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    domains: BTreeMap<String, BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.domains.values().map(BTreeMap::len).sum()
    }

    pub fn insert(&mut self, domain: &str, name: &str, value: &str) {
        self.domains
            .entry(domain.trim_start_matches('.').to_lowercase())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove(&mut self, domain: &str, name: &str) {
        let domain = domain.trim_start_matches('.').to_lowercase();
        if let Some(cookies) = self.domains.get_mut(&domain) {
            cookies.remove(name);
            if cookies.is_empty() {
                self.domains.remove(&domain);
            }
        }
    }

    pub fn get(&self, host: &str, name: &str) -> Option<&str> {
        self.matching(host)
            .find(|(cookie, _)| *cookie == name)
            .map(|(_, value)| value)
    }

    /// Value for a `Cookie` request header to `host`, if any cookie applies.
    pub fn header_for(&self, host: &str) -> Option<String> {
        let pairs: Vec<String> = self
            .matching(host)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Records one `Set-Cookie` header received from `host`. A cookie whose
    /// `Max-Age` or `Expires` is already in the past is removed instead.
    pub fn apply_set_cookie(&mut self, header: &str, host: &str) {
        let Ok(cookie) = Cookie::parse(header) else {
            return;
        };
        let domain = cookie.domain().unwrap_or(host);

        if is_expired(&cookie, OffsetDateTime::now_utc()) {
            self.remove(domain, cookie.name());
        } else {
            self.insert(domain, cookie.name(), cookie.value_trimmed());
        }
    }

    fn matching<'a>(&'a self, host: &str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let host = host.to_lowercase();
        self.domains
            .iter()
            .filter(move |(domain, _)| {
                host == **domain || host.ends_with(&format!(".{domain}"))
            })
            .flat_map(|(_, cookies)| cookies.iter().map(|(n, v)| (n.as_str(), v.as_str())))
    }
}

// Max-Age wins over Expires when both are present.
fn is_expired(cookie: &Cookie<'_>, now: OffsetDateTime) -> bool {
    match cookie.max_age() {
        Some(age) => age <= Duration::ZERO,
        None => cookie.expires_datetime().is_some_and(|at| at <= now),
    }
}

/// A [`CookieJar`] shared with the HTTP client.
#[derive(Debug, Default)]
pub struct SharedJar {
    inner: RwLock<CookieJar>,
}

impl SharedJar {
    pub fn new(jar: CookieJar) -> Self {
        Self {
            inner: RwLock::new(jar),
        }
    }

    pub fn replace(&self, jar: CookieJar) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = jar;
    }

    pub fn snapshot(&self) -> CookieJar {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl reqwest::cookie::CookieStore for SharedJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        let mut jar = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for header in cookie_headers {
            if let Ok(header) = header.to_str() {
                jar.apply_set_cookie(header, host);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        let header = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .header_for(host)?;
        HeaderValue::from_str(&header).ok()
    }
}

/// Where the cookie jar lives between request groups.
pub trait SessionStore: Send + Sync {
    /// Returns the stored jar, or an empty one when nothing usable is stored.
    fn load(&self) -> CookieJar;

    fn save(&self, jar: &CookieJar) -> Result<(), SessionError>;
}

/// Stores the jar as JSON in a file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> CookieJar {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return CookieJar::new(),
            Err(e) => {
                log::warn!("Could not read cookie file {}: {}", self.path.display(), e);
                return CookieJar::new();
            }
        };

        if contents.trim().is_empty() {
            return CookieJar::new();
        }

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!(
                "Ignoring unreadable cookie file {}: {}",
                self.path.display(),
                e
            );
            CookieJar::new()
        })
    }

    fn save(&self, jar: &CookieJar) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(jar)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Keeps the jar in memory for the lifetime of the store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    jar: Mutex<CookieJar>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> CookieJar {
        self.jar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, jar: &CookieJar) -> Result<(), SessionError> {
        *self.jar.lock().unwrap_or_else(PoisonError::into_inner) = jar.clone();
        Ok(())
    }
}
