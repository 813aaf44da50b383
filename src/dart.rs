// 📡 Disclosure Fetcher - DART Open API
//
// list.json pages at most 100 items. Without a corp_code the API only accepts
// short date windows, so long windows are fetched entity by entity.

use crate::disclosure::DisclosureRecord;
use crate::error::{MonitorError, Result};
use crate::registry::CompanyRegistry;
use crate::watchlist::WatchList;
use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://opendart.fss.or.kr/api";
pub const MAX_PAGE_SIZE: u32 = 100;

/// Longest window list.json accepts without a corp_code
pub const BULK_RANGE_LIMIT_DAYS: i64 = 90;

const STATUS_OK: &str = "000";
const STATUS_NO_DATA: &str = "013";

// ============================================================================
// QUERY TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(MonitorError::Configuration(format!(
                "Date range start {} is after end {}",
                start, end
            )));
        }
        Ok(DateRange { start, end })
    }

    /// Jan 1 of `year` through Dec 31, capped at `today`
    pub fn for_year(year: i32, today: NaiveDate) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| MonitorError::Configuration(format!("Invalid TARGET_YEAR {}", year)))?;
        let year_end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| MonitorError::Configuration(format!("Invalid TARGET_YEAR {}", year)))?;

        let end = if today.year() == year { today } else { year_end };
        DateRange::new(start, end)
    }

    /// The last `days` days, ending today
    pub fn lookback(days: u32, today: NaiveDate) -> Result<Self> {
        let start = today.checked_sub_days(Days::new(days as u64)).ok_or_else(|| {
            MonitorError::Configuration(format!(
                "LOOKBACK_DAYS {} reaches before the earliest representable date",
                days
            ))
        })?;

        Ok(DateRange { start, end: today })
    }

    /// Inclusive day count
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn begin_param(&self) -> String {
        self.start.format("%Y%m%d").to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format("%Y%m%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub entity_code: Option<String>,
    pub range: DateRange,
    pub page_no: u32,
    pub page_size: u32,
}

impl ListQuery {
    pub fn new(range: DateRange, entity_code: Option<&str>, page_no: u32, page_size: u32) -> Self {
        ListQuery {
            entity_code: entity_code.map(String::from),
            range,
            page_no: page_no.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisclosurePage {
    pub status: String,
    pub page_no: u32,
    pub total_count: u32,
    pub total_page: u32,
    pub items: Vec<DisclosureRecord>,
}

impl DisclosurePage {
    pub fn empty(status: &str) -> Self {
        DisclosurePage {
            status: status.to_string(),
            ..Default::default()
        }
    }

    fn is_last(&self, page_size: u32) -> bool {
        self.items.is_empty()
            || (self.items.len() as u32) < page_size
            || (self.total_page > 0 && self.page_no >= self.total_page)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    page_no: u32,
    #[serde(default)]
    total_count: u32,
    #[serde(default)]
    total_page: u32,
    #[serde(default)]
    list: Vec<DisclosureRecord>,
}

/// Interpret a list.json body. "013" (no data) is an empty success.
pub fn parse_list_response(body: &str) -> Result<DisclosurePage> {
    let response: ListResponse = serde_json::from_str(body)
        .map_err(|e| MonitorError::Transport(format!("Malformed list.json response: {}", e)))?;

    match response.status.as_str() {
        STATUS_OK => Ok(DisclosurePage {
            status: response.status,
            page_no: response.page_no,
            total_count: response.total_count,
            total_page: response.total_page,
            items: response.list,
        }),
        STATUS_NO_DATA => Ok(DisclosurePage::empty(STATUS_NO_DATA)),
        _ => Err(MonitorError::Api {
            status: response.status,
            message: response.message,
        }),
    }
}

// ============================================================================
// SOURCE CONTRACT
// ============================================================================

#[async_trait]
pub trait DisclosureSource: Send + Sync {
    async fn list_page(&self, query: &ListQuery) -> Result<DisclosurePage>;

    /// Full company registry, used to resolve name-only watch-list entries
    async fn company_registry(&self) -> Result<CompanyRegistry>;

    fn describe(&self) -> String {
        "disclosure source".to_string()
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

pub struct DartClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DartClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(DartClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl DisclosureSource for DartClient {
    async fn list_page(&self, query: &ListQuery) -> Result<DisclosurePage> {
        let url = format!("{}/list.json", self.base_url);

        let mut params: Vec<(&str, String)> = vec![
            ("crtfc_key", self.api_key.clone()),
            ("bgn_de", query.range.begin_param()),
            ("end_de", query.range.end_param()),
            ("page_no", query.page_no.to_string()),
            ("page_count", query.page_size.to_string()),
        ];
        if let Some(code) = &query.entity_code {
            params.push(("corp_code", code.clone()));
        }

        let resp = self.client.get(&url).query(&params).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MonitorError::Api {
                status: status.as_u16().to_string(),
                message,
            });
        }

        let body = resp.text().await?;
        parse_list_response(&body)
    }

    async fn company_registry(&self) -> Result<CompanyRegistry> {
        let url = format!("{}/corpCode.xml", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("crtfc_key", self.api_key.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MonitorError::Api {
                status: status.as_u16().to_string(),
                message,
            });
        }

        let bytes = resp.bytes().await?;
        let registry = CompanyRegistry::from_archive(&bytes)?;
        info!(companies = registry.len(), "Company registry downloaded");
        Ok(registry)
    }

    fn describe(&self) -> String {
        format!("DART ({})", self.base_url)
    }
}

// ============================================================================
// FETCH ORCHESTRATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMode {
    /// Bulk when the window allows it, per-entity otherwise
    Auto,
    Bulk,
    PerEntity,
}

impl FetchMode {
    /// Concrete mode for a window. A forced bulk fetch over a long window is
    /// downgraded to per-entity because the API would reject it.
    pub fn resolve(self, range: &DateRange) -> FetchMode {
        let exceeds = range.days() > BULK_RANGE_LIMIT_DAYS;
        match self {
            FetchMode::PerEntity => FetchMode::PerEntity,
            FetchMode::Bulk | FetchMode::Auto if exceeds => FetchMode::PerEntity,
            FetchMode::Bulk | FetchMode::Auto => FetchMode::Bulk,
        }
    }
}

impl FromStr for FetchMode {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "auto" => Ok(FetchMode::Auto),
            "bulk" => Ok(FetchMode::Bulk),
            "per-entity" | "entity" => Ok(FetchMode::PerEntity),
            other => Err(MonitorError::Configuration(format!(
                "Unknown FETCH_MODE '{}' (expected auto, bulk or per-entity)",
                other
            ))),
        }
    }
}

/// Page through one query until exhaustion
pub async fn fetch_all<S>(
    source: &S,
    entity_code: Option<&str>,
    range: DateRange,
    page_size: u32,
    delay: Duration,
) -> Result<Vec<DisclosureRecord>>
where
    S: DisclosureSource + ?Sized,
{
    let mut items = Vec::new();
    let mut page_no = 1;

    loop {
        let query = ListQuery::new(range, entity_code, page_no, page_size);
        let page = source.list_page(&query).await?;
        let last = page.is_last(query.page_size);
        items.extend(page.items);

        if last {
            break;
        }

        page_no += 1;
        tokio::time::sleep(delay).await;
    }

    Ok(items)
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub records: Vec<DisclosureRecord>,
    /// (entity or "bulk", error)
    pub failures: Vec<(String, MonitorError)>,
    /// Name-only entities that could not be queried per entity
    pub skipped: usize,
}

/// Fetch every watched entity's disclosures in `range`. One entity failing
/// is recorded in the report and does not stop the others.
pub async fn fetch_watch_list<S>(
    source: &S,
    watch_list: &WatchList,
    range: DateRange,
    mode: FetchMode,
    delay: Duration,
) -> FetchReport
where
    S: DisclosureSource + ?Sized,
{
    let mut report = FetchReport::default();
    let mode = mode.resolve(&range);

    info!(
        entities = watch_list.len(),
        from = %range.start,
        to = %range.end,
        ?mode,
        "Fetching disclosures"
    );

    match mode {
        FetchMode::PerEntity => {
            let total = watch_list.len();

            for (idx, entity) in watch_list.entities().iter().enumerate() {
                let Some(code) = entity.registry_code.as_deref() else {
                    warn!(entity = %entity.display_name, "No registry code, skipped in per-entity mode");
                    report.skipped += 1;
                    continue;
                };

                match fetch_all(source, Some(code), range, MAX_PAGE_SIZE, delay).await {
                    Ok(records) => {
                        debug!(entity = %entity.display_name, count = records.len(), "Fetched");
                        report.records.extend(records);
                    }
                    Err(e) => {
                        warn!(entity = %entity.display_name, code, error = %e, "Fetch failed, entity skipped");
                        report.failures.push((entity.display_name.clone(), e));
                    }
                }

                if idx + 1 < total {
                    tokio::time::sleep(delay).await;
                }
            }
        }
        FetchMode::Bulk | FetchMode::Auto => {
            match fetch_all(source, None, range, MAX_PAGE_SIZE, delay).await {
                Ok(records) => {
                    let fetched = records.len();
                    report
                        .records
                        .extend(records.into_iter().filter(|r| watch_list.matches(r)));
                    debug!(fetched, watched = report.records.len(), "Bulk fetch scoped to watch-list");
                }
                Err(e) => {
                    warn!(error = %e, "Bulk fetch failed");
                    report.failures.push(("bulk".to_string(), e));
                }
            }
        }
    }

    report
}
