use std::future::Future;

use crate::config::ScrapeConfig;
use crate::fetcher::{FetchError, HttpFetcher, PageRequest};

/// The upstream pages a crawl needs, each returned as raw HTML.
pub trait PlanningSite {
    /// Simple-search page carrying the `_csrf` hidden field.
    fn search_page(&self) -> impl Future<Output = Result<String, FetchError>> + Send;

    /// Monthly-list search form embedding `<select id="ward">`.
    fn ward_list_page(&self) -> impl Future<Output = Result<String, FetchError>> + Send;

    /// Submits a monthly-list search and returns the first results page.
    fn first_results_page(
        &self,
        csrf: &str,
        month: &str,
        ward: &str,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;

    fn results_page(&self, page: u32) -> impl Future<Output = Result<String, FetchError>> + Send;

    fn contact_page(
        &self,
        record_id: &str,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// HTTP client for an Idox "online-applications" planning portal.
#[derive(Clone)]
pub struct PlanningPortal {
    fetcher: HttpFetcher,
    base_url: String,
}

impl PlanningPortal {
    pub fn new(config: &ScrapeConfig) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: HttpFetcher::new(config.retry, config.session_store())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl PlanningSite for PlanningPortal {
    async fn search_page(&self) -> Result<String, FetchError> {
        log::info!("Fetching search page for a CSRF token...");
        let request = PageRequest::get(self.url("search.do?action=simple&searchType=Application"))
            .referer(self.url("timeout.do"));
        self.fetcher.fetch(&request).await
    }

    async fn ward_list_page(&self) -> Result<String, FetchError> {
        log::info!("Fetching ward list...");
        let request = PageRequest::get(self.url("search.do?action=monthlyList"))
            .referer(self.url("search.do?action=weeklyList"));
        self.fetcher.fetch(&request).await
    }

    async fn first_results_page(
        &self,
        csrf: &str,
        month: &str,
        ward: &str,
    ) -> Result<String, FetchError> {
        let form = vec![
            ("_csrf".to_string(), csrf.to_string()),
            ("searchCriteria.ward".to_string(), ward.to_string()),
            ("month".to_string(), month.to_string()),
            ("dateType".to_string(), "DC_Validated".to_string()),
            ("searchType".to_string(), "Application".to_string()),
        ];
        let request =
            PageRequest::post_form(self.url("monthlyListResults.do?action=firstPage"), form)
                .referer(self.url("search.do?action=monthlyList"));
        self.fetcher.fetch(&request).await
    }

    async fn results_page(&self, page: u32) -> Result<String, FetchError> {
        let request = PageRequest::get(self.url(&format!(
            "pagedSearchResults.do?action=page&searchCriteria.page={page}"
        )))
        .referer(self.url("simpleSearchResults.do?action=firstPage"));
        self.fetcher.fetch(&request).await
    }

    async fn contact_page(&self, record_id: &str) -> Result<String, FetchError> {
        // Contact pages are fetched without the search session's cookies.
        let request = PageRequest::get(self.url(&format!(
            "applicationDetails.do?activeTab=contacts&keyVal={record_id}"
        )))
        .referer(self.url(&format!(
            "applicationDetails.do?activeTab=details&keyVal={record_id}"
        )))
        .fresh_session();
        self.fetcher.fetch(&request).await
    }
}
