// 📄 Disclosure Record - one filing as published by DART
// receipt_id (rcept_no) is the idempotency key for the whole system

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

pub const DETAIL_URL_BASE: &str = "https://dart.fss.or.kr/dsaf001/main.do?rcpNo=";

/// A filing from the `list.json` endpoint. Field names follow the upstream JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureRecord {
    /// 고유번호 (8-digit registry code)
    #[serde(rename = "corp_code", default)]
    pub entity_code: String,

    #[serde(rename = "corp_name", default)]
    pub entity_name: String,

    /// 종목코드, only for listed companies. Upstream sends " " for unlisted ones.
    #[serde(rename = "stock_code", default, deserialize_with = "blank_as_none")]
    pub ticker_code: Option<String>,

    #[serde(rename = "report_nm", default)]
    pub report_title: String,

    #[serde(rename = "rcept_no")]
    pub receipt_id: String,

    #[serde(rename = "flr_nm", default)]
    pub submitter_name: String,

    /// YYYYMMDD
    #[serde(rename = "rcept_dt", default)]
    pub receipt_date: String,

    #[serde(rename = "rm", default)]
    pub remark: String,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

impl DisclosureRecord {
    /// Deep link to the filing viewer.
    pub fn detail_url(&self) -> String {
        format!("{}{}", DETAIL_URL_BASE, self.receipt_id)
    }

    /// YYYYMMDD -> YYYY-MM-DD. Falls back to the raw value.
    pub fn formatted_date(&self) -> String {
        NaiveDate::parse_from_str(&self.receipt_date, "%Y%m%d")
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|_| self.receipt_date.clone())
    }
}
