use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{CrawlLimits, ScrapeConfig};
use crate::fetcher::FetchError;
use crate::months::{self, Direction, MonthParseError};
use crate::parser::{HtmlPageParser, PageParser, ParseError};
use crate::portal::PlanningSite;
use crate::sink::{OutputSink, SinkError};
use crate::types::{OutputRow, SearchCriteria, Ward};

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Month(#[from] MonthParseError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// What to scrape. Empty `wards` means every ward the portal lists.
#[derive(Debug, Clone, Default)]
pub struct ScrapeRequest {
    pub start_month: Option<String>,
    pub end_month: Option<String>,
    pub wards: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    pub months: Vec<String>,
    pub wards: Vec<Ward>,
    pub records_seen: usize,
    pub rows_written: usize,
    pub failed: Vec<SearchCriteria>,
}

impl CrawlSummary {
    pub fn ward_values(&self) -> Vec<String> {
        self.wards.iter().map(|w| w.value.clone()).collect()
    }
}

impl std::fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nSummary:")?;
        writeln!(f, "  Months:          {}", self.months.join(", "))?;
        writeln!(f, "  Wards:           {}", self.wards.len())?;
        writeln!(f, "  Records seen:    {}", self.records_seen)?;
        writeln!(f, "  Rows written:    {}", self.rows_written)?;
        if !self.failed.is_empty() {
            writeln!(f, "  Failed searches:")?;
            for criteria in &self.failed {
                writeln!(f, "    {}", criteria)?;
            }
        }
        Ok(())
    }
}

/// Walks monthly-list searches page by page and collects agent contacts.
pub struct Crawler<S, P = HtmlPageParser> {
    site: S,
    parser: P,
    delay: Duration,
    direction: Direction,
    limits: CrawlLimits,
}

impl<S: PlanningSite> Crawler<S> {
    pub fn new(site: S, config: &ScrapeConfig) -> Self {
        Self::with_parser(site, HtmlPageParser, config)
    }
}

impl<S: PlanningSite, P: PageParser> Crawler<S, P> {
    pub fn with_parser(site: S, parser: P, config: &ScrapeConfig) -> Self {
        Self {
            site,
            parser,
            delay: config.delay,
            direction: config.direction,
            limits: config.limits,
        }
    }

    pub fn site(&self) -> &S {
        &self.site
    }

    pub async fn wards(&self) -> Result<Vec<Ward>, CrawlError> {
        let html = self.site.ward_list_page().await?;
        Ok(self.parser.parse_wards(&html)?)
    }

    /// Months to walk for `request`, already capped by the month limit.
    pub fn months(
        &self,
        request: &ScrapeRequest,
        today: NaiveDate,
    ) -> Result<Vec<String>, MonthParseError> {
        let mut months = months::month_range(
            request.start_month.as_deref(),
            request.end_month.as_deref(),
            self.direction,
            today,
        )?;
        if let Some(max) = self.limits.max_months
            && months.len() > max
        {
            log::warn!("Limiting run to {} of {} months", max, months.len());
            months.truncate(max);
        }
        Ok(months)
    }

    pub async fn run<K: OutputSink>(
        &self,
        request: &ScrapeRequest,
        sink: &mut K,
    ) -> Result<CrawlSummary, CrawlError> {
        self.run_at(request, sink, months::today()).await
    }

    /// Runs a scrape with month defaults resolved against `today`.
    ///
    /// Failures inside one (month, ward) search are logged and recorded in the
    /// summary; only a missing CSRF token or an invalid month aborts the run.
    pub async fn run_at<K: OutputSink>(
        &self,
        request: &ScrapeRequest,
        sink: &mut K,
        today: NaiveDate,
    ) -> Result<CrawlSummary, CrawlError> {
        let months = self.months(request, today)?;

        let csrf = {
            let html = self.site.search_page().await?;
            self.parser.parse_csrf_token(&html)?
        };

        let mut wards = if request.wards.is_empty() {
            self.wards().await.unwrap_or_else(|e| {
                log::error!("Failed to fetch ward list: {}", e);
                Vec::new()
            })
        } else {
            request.wards.iter().map(|w| Ward::from_token(w)).collect()
        };
        if let Some(max) = self.limits.max_wards
            && wards.len() > max
        {
            log::warn!("Limiting run to {} of {} wards", max, wards.len());
            wards.truncate(max);
        }

        let mut summary = CrawlSummary {
            months,
            wards,
            ..Default::default()
        };

        let months = summary.months.clone();
        let wards = summary.wards.clone();
        for (month_index, month) in months.iter().enumerate() {
            for (ward_index, ward) in wards.iter().enumerate() {
                log::info!(
                    "Searching month '{}' ({}/{}), ward '{}' ({}/{})",
                    month,
                    month_index + 1,
                    months.len(),
                    ward.name,
                    ward_index + 1,
                    wards.len()
                );

                let criteria = SearchCriteria {
                    month: month.clone(),
                    ward: ward.value.clone(),
                };
                if let Err(e) = self.crawl_search(&csrf, &criteria, sink, &mut summary).await {
                    log::error!("Search {} failed: {}", criteria, e);
                    summary.failed.push(criteria);
                }
            }
        }

        log::info!(
            "Scraping completed: {} row(s) from {} record(s), {} failed search(es)",
            summary.rows_written,
            summary.records_seen,
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn crawl_search<K: OutputSink>(
        &self,
        csrf: &str,
        criteria: &SearchCriteria,
        sink: &mut K,
        summary: &mut CrawlSummary,
    ) -> Result<(), CrawlError> {
        let mut html = self
            .site
            .first_results_page(csrf, &criteria.month, &criteria.ward)
            .await?;
        let mut page_number = 1;

        loop {
            let page = self.parser.parse_listing(&html);
            log::info!("Page: {}, Records: {}", page_number, page.records.len());

            let total = page.records.len();
            for (i, record) in page.records.iter().enumerate() {
                log::debug!(
                    "Record {}/{} on page {} ({}): {}",
                    i + 1,
                    total,
                    page_number,
                    criteria,
                    record.record_id
                );
                tokio::time::sleep(self.delay).await;

                let contact_html = self.site.contact_page(&record.record_id).await?;
                let contact = self.parser.parse_contact(&contact_html);
                summary.records_seen += 1;
                log::debug!("{}: {}", record.address, contact);

                if let Some(row) = OutputRow::qualify(&record.address, contact) {
                    sink.push(row)?;
                    summary.rows_written += 1;
                }
            }

            match page.next_page {
                // A cursor that does not move forward would loop forever.
                Some(next) if next > page_number => {
                    page_number = next;
                    html = self.site.results_page(next).await?;
                }
                Some(next) => {
                    log::warn!(
                        "Ignoring next page {} after page {} for {}",
                        next,
                        page_number,
                        criteria
                    );
                    break;
                }
                None => break,
            }
        }

        Ok(())
    }
}
