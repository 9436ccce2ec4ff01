use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use planscrape::crawler::{CrawlError, ScrapeRequest};
use planscrape::months;
use planscrape::sink::{MemorySink, ScrapeReport, render_csv};
use planscrape::types::Ward;
use planscrape::{Crawler, PlanningPortal, ScrapeConfig};
use serde::{Deserialize, Serialize};

const MONTH_WINDOW: usize = 12;
const CSV_FILENAME: &str = "planning_contacts.csv";

#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<ScrapeConfig>,
}

impl AppState {
    pub fn new(config: ScrapeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn crawler(&self) -> Result<Crawler<PlanningPortal>, ApiError> {
        let portal = PlanningPortal::new(&self.config).map_err(|e| {
            log::error!("Failed to build portal client: {e:?}");
            ApiError::Internal(format!("Failed to build portal client: {e}"))
        })?;
        Ok(Crawler::new(portal, &self.config))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/wards", get(list_wards))
        .route("/months", get(list_months))
        .route("/scrape", post(scrape))
        .with_state(state)
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Upstream(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            ApiError::Upstream(e) => (StatusCode::BAD_GATEWAY, e),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<CrawlError> for ApiError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Month(e) => ApiError::BadRequest(e.to_string()),
            CrawlError::Sink(e) => ApiError::Internal(e.to_string()),
            e @ (CrawlError::Fetch(_) | CrawlError::Parse(_)) => ApiError::Upstream(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct Endpoint {
    method: &'static str,
    path: &'static str,
    description: &'static str,
}

#[derive(Debug, Serialize)]
struct Capabilities {
    name: &'static str,
    version: &'static str,
    endpoints: Vec<Endpoint>,
}

async fn index() -> Json<Capabilities> {
    Json(Capabilities {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            Endpoint {
                method: "GET",
                path: "/wards",
                description: "Wards offered by the portal's monthly-list search",
            },
            Endpoint {
                method: "GET",
                path: "/months",
                description: "The last 12 months, most recent first",
            },
            Endpoint {
                method: "POST",
                path: "/scrape",
                description: "Collect agent contacts for {start_month, end_month, selected_wards, format}",
            },
        ],
    })
}

async fn list_wards(State(state): State<AppState>) -> Result<Json<Vec<Ward>>, ApiError> {
    let wards = state
        .crawler()?
        .wards()
        .await
        .inspect_err(|e| log::error!("Failed to fetch ward list: {e}"))?;
    Ok(Json(wards))
}

async fn list_months() -> Json<Vec<String>> {
    Json(months::rolling_window(months::today(), MONTH_WINDOW))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ReportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Deserialize)]
struct ScrapeParams {
    start_month: Option<String>,
    end_month: Option<String>,
    #[serde(default)]
    selected_wards: Vec<String>,
    #[serde(default)]
    format: ReportFormat,
}

async fn scrape(
    State(state): State<AppState>,
    Json(params): Json<ScrapeParams>,
) -> Result<Response, ApiError> {
    let request = ScrapeRequest {
        start_month: params.start_month.filter(|m| !m.trim().is_empty()),
        end_month: params.end_month.filter(|m| !m.trim().is_empty()),
        wards: params.selected_wards,
    };
    log::info!("Scrape requested: {:?}", request);

    let crawler = state.crawler()?;
    let mut sink = MemorySink::new();
    let summary = crawler
        .run(&request, &mut sink)
        .await
        .inspect_err(|e| log::error!("Scrape failed: {e}"))?;

    let wards = summary.ward_values();
    let report = ScrapeReport::new(sink.into_rows(), summary.months, wards);
    render_report(params.format, report)
}

fn render_report(format: ReportFormat, report: ScrapeReport) -> Result<Response, ApiError> {
    match format {
        ReportFormat::Json => Ok(Json(report).into_response()),
        ReportFormat::Csv => {
            let csv = render_csv(&report.data).map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{CSV_FILENAME}\""),
                    ),
                ],
                csv,
            )
                .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use planscrape::config::SessionBacking;
    use planscrape::types::OutputRow;

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        String::from_utf8(bytes.to_vec()).expect("Body should be UTF-8")
    }

    fn report() -> ScrapeReport {
        ScrapeReport::new(
            vec![OutputRow {
                address: "1 Fleet Place".to_string(),
                name: Some("John Smith".to_string()),
                email: "john@example.com".to_string(),
            }],
            vec!["Mar 24".to_string()],
            vec!["ALD".to_string()],
        )
    }

    fn offline_state() -> AppState {
        AppState::new(ScrapeConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            session: SessionBacking::Memory,
            ..ScrapeConfig::service()
        })
    }

    #[tokio::test]
    async fn test_index_lists_endpoints() {
        let Json(capabilities) = index().await;
        let paths: Vec<&str> = capabilities.endpoints.iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["/wards", "/months", "/scrape"]);
    }

    #[tokio::test]
    async fn test_months_is_rolling_window() {
        let Json(months) = list_months().await;
        assert_eq!(months.len(), MONTH_WINDOW);
        assert_eq!(months[0], months::format_month(months::today()));
    }

    #[tokio::test]
    async fn test_render_json_report() {
        let response = render_report(ReportFormat::Json, report()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["name"], "John Smith");
        assert_eq!(body["wards"][0], "ALD");
    }

    #[tokio::test]
    async fn test_render_csv_attachment() {
        let response = render_report(ReportFormat::Csv, report()).unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"planning_contacts.csv\""
        );
        assert_eq!(
            body_string(response).await,
            "Address,Name,Email\n1 Fleet Place,John Smith,john@example.com\n"
        );
    }

    #[tokio::test]
    async fn test_scrape_rejects_invalid_month_without_fetching() {
        let params = ScrapeParams {
            start_month: Some("Smarch 24".to_string()),
            end_month: None,
            selected_wards: vec!["ALD".to_string()],
            format: ReportFormat::Json,
        };

        let response = scrape(State(offline_state()), Json(params))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("Smarch 24"), "Unexpected body: {body}");
    }

    #[test]
    fn test_scrape_params_defaults() {
        let params: ScrapeParams = serde_json::from_str(r#"{"start_month": "Jan 24"}"#).unwrap();
        assert_eq!(params.format, ReportFormat::Json);
        assert!(params.selected_wards.is_empty());
        assert!(params.end_month.is_none());

        let params: ScrapeParams =
            serde_json::from_str(r#"{"selected_wards": ["ALD"], "format": "csv"}"#).unwrap();
        assert_eq!(params.format, ReportFormat::Csv);
    }

    #[test]
    fn test_crawl_errors_map_to_status() {
        let err = months::parse_month("nope").unwrap_err();
        let response = ApiError::from(CrawlError::Month(err)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err = CrawlError::Fetch(planscrape::fetcher::FetchError::ExhaustedRetries {
            url: "https://example.com".to_string(),
            attempts: 3,
        });
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
