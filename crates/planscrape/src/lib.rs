pub mod config;
pub mod crawler;
pub mod fetcher;
pub mod months;
pub mod parser;
pub mod portal;
pub mod session;
pub mod sink;
pub mod types;

pub use config::ScrapeConfig;
pub use crawler::{CrawlError, CrawlSummary, Crawler, ScrapeRequest};
pub use portal::{PlanningPortal, PlanningSite};
