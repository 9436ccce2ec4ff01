use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::fetcher::RetryPolicy;
use crate::months::Direction;
use crate::session::{FileSessionStore, MemorySessionStore, SessionStore};

pub const DEFAULT_BASE_URL: &str =
    "https://www.planning2.cityoflondon.gov.uk/online-applications";
pub const DEFAULT_COOKIE_FILE: &str = "cookies.json";

/// Caps on how much one invocation walks. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlLimits {
    pub max_months: Option<usize>,
    pub max_wards: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBacking {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub retry: RetryPolicy,
    /// Pause before each contact-details fetch.
    pub delay: Duration,
    pub direction: Direction,
    pub session: SessionBacking,
    pub limits: CrawlLimits,
}

impl ScrapeConfig {
    /// Long unattended runs: patient retries and a slow crawl over the full range.
    pub fn batch() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::new(50, Duration::from_secs(100)),
            delay: Duration::from_secs(30),
            direction: Direction::Descending,
            session: SessionBacking::File(PathBuf::from(DEFAULT_COOKIE_FILE)),
            limits: CrawlLimits::default(),
        }
    }

    /// Request-scoped runs that have to answer within a bounded time.
    pub fn service() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::new(3, Duration::from_secs(5)),
            delay: Duration::from_secs(2),
            direction: Direction::Descending,
            session: SessionBacking::Memory,
            limits: CrawlLimits {
                max_months: Some(2),
                max_wards: Some(3),
            },
        }
    }

    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        match &self.session {
            SessionBacking::File(path) => Arc::new(FileSessionStore::new(path)),
            SessionBacking::Memory => Arc::new(MemorySessionStore::new()),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self::batch()
    }
}
