// 📨 Notifier - Telegram Bot API sendMessage
//
// Messages are HTML. Every interpolated value is escaped, so a company name
// containing `<` or `&` cannot break the markup.

use crate::disclosure::DisclosureRecord;
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_SUMMARY_SAMPLE: usize = 10;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// NOTIFIER CONTRACT
// ============================================================================

/// Delivery never raises: every method reports success as a bool and logs the cause of a failure.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, record: &DisclosureRecord) -> bool;

    async fn notify_summary(
        &self,
        entity_count: usize,
        new_count: usize,
        sample: &[DisclosureRecord],
    ) -> bool;

    async fn test_connection(&self) -> bool;
}

// ============================================================================
// RENDERING
// ============================================================================

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn render_disclosure(record: &DisclosureRecord, at: NaiveDateTime) -> String {
    let mut lines = vec![
        "🏌️ <b>[DART 감사보고서 알림]</b>".to_string(),
        String::new(),
        format!("<b>회사명:</b> {}", escape_html(&record.entity_name)),
        format!("<b>고유번호:</b> {}", escape_html(&record.entity_code)),
    ];

    if let Some(ticker) = &record.ticker_code {
        lines.push(format!("<b>종목코드:</b> {}", escape_html(ticker)));
    }

    lines.extend([
        format!("<b>보고서명:</b> {}", escape_html(&record.report_title)),
        format!("<b>접수번호:</b> {}", escape_html(&record.receipt_id)),
        format!("<b>공시일자:</b> {}", escape_html(&record.formatted_date())),
        String::new(),
        format!(
            "🔗 <a href=\"{}\">공시 상세보기</a>",
            escape_html(&record.detail_url())
        ),
        String::new(),
        format!("<i>알림 시각: {}</i>", at.format(TIME_FORMAT)),
    ]);

    lines.join("\n")
}

/// Run digest. `sample` is cut to `sample_limit` entries with an "외 N건" tail.
pub fn render_summary(
    entity_count: usize,
    new_count: usize,
    sample: &[DisclosureRecord],
    sample_limit: usize,
    at: NaiveDateTime,
) -> String {
    let mut lines = vec![
        "📊 <b>[DART 모니터링 요약]</b>".to_string(),
        String::new(),
        format!("모니터링 회사: {}개", entity_count),
    ];

    if new_count == 0 {
        lines.push("신규 감사보고서: <b>없음</b>".to_string());
    } else {
        lines.push(format!("신규 감사보고서: <b>{}건</b>", new_count));
        lines.push(String::new());
        lines.push("<b>신규 공시 목록:</b>".to_string());

        for record in sample.iter().take(sample_limit) {
            lines.push(format!(
                "  • {} - {}",
                escape_html(&record.entity_name),
                escape_html(&record.report_title)
            ));
        }

        let listed = sample.len().min(sample_limit);
        if new_count > listed {
            lines.push(format!("  ... 외 {}건", new_count - listed));
        }
    }

    lines.push(String::new());
    lines.push(format!("<i>실행 시각: {}</i>", at.format(TIME_FORMAT)));

    lines.join("\n")
}

fn render_connection_test(at: NaiveDateTime) -> String {
    format!(
        "✅ <b>DART 모니터링 봇 연결 테스트</b>\n\n텔레그램 연동이 정상적으로 작동합니다.\n\n<i>테스트 시각: {}</i>",
        at.format(TIME_FORMAT)
    )
}

// ============================================================================
// TELEGRAM CLIENT
// ============================================================================

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
    summary_sample: usize,
}

impl TelegramClient {
    pub fn new(base_url: &str, bot_token: &str, chat_id: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(TelegramClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            summary_sample: DEFAULT_SUMMARY_SAMPLE,
        })
    }

    pub fn with_summary_sample(mut self, sample: usize) -> Self {
        self.summary_sample = sample;
        self
    }

    /// One sendMessage call. Succeeds only when the API answers `ok: true`.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let resp = self.client.post(&url).json(&request).send().await?;
        let status = resp.status();
        let body: SendMessageResponse = resp.json().await.map_err(|e| {
            MonitorError::Notification(format!("Unreadable sendMessage response ({}): {}", status, e))
        })?;

        if body.ok {
            Ok(())
        } else {
            Err(MonitorError::Notification(
                body.description
                    .unwrap_or_else(|| format!("sendMessage rejected with HTTP {}", status)),
            ))
        }
    }

    async fn deliver(&self, kind: &str, text: &str) -> bool {
        match self.send_message(text).await {
            Ok(()) => {
                debug!(kind, "Telegram message sent");
                true
            }
            Err(e) => {
                error!(kind, error = %e, "Telegram message failed");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn notify(&self, record: &DisclosureRecord) -> bool {
        let text = render_disclosure(record, Local::now().naive_local());
        self.deliver("disclosure", &text).await
    }

    async fn notify_summary(
        &self,
        entity_count: usize,
        new_count: usize,
        sample: &[DisclosureRecord],
    ) -> bool {
        let text = render_summary(
            entity_count,
            new_count,
            sample,
            self.summary_sample,
            Local::now().naive_local(),
        );
        self.deliver("summary", &text).await
    }

    async fn test_connection(&self) -> bool {
        let text = render_connection_test(Local::now().naive_local());
        self.deliver("connection-test", &text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_test_record(name: &str, title: &str, receipt_id: &str) -> DisclosureRecord {
        DisclosureRecord {
            entity_code: "00434003".to_string(),
            entity_name: name.to_string(),
            ticker_code: None,
            report_title: title.to_string(),
            receipt_id: receipt_id.to_string(),
            submitter_name: "회계법인".to_string(),
            receipt_date: "20250311".to_string(),
            remark: String::new(),
        }
    }

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 11)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_render_disclosure_escapes_fields() {
        let mut record = create_test_record("A&B <골프>", "감사보고서 (2024.12)", "20250311000123");
        record.ticker_code = Some("123450".to_string());

        let text = render_disclosure(&record, fixed_time());

        assert!(text.contains("<b>회사명:</b> A&amp;B &lt;골프&gt;"));
        assert!(text.contains("<b>종목코드:</b> 123450"));
        assert!(text.contains("<b>공시일자:</b> 2025-03-11"));
        assert!(text.contains("main.do?rcpNo=20250311000123"));
        assert!(text.contains("알림 시각: 2025-03-11 09:30:00"));
        assert!(!text.contains("<골프>"));
    }

    #[test]
    fn test_render_disclosure_without_ticker() {
        let record = create_test_record("가나골프", "감사보고서", "1");
        assert!(!render_disclosure(&record, fixed_time()).contains("종목코드"));
    }

    #[test]
    fn test_render_summary_zero_new() {
        let text = render_summary(42, 0, &[], 10, fixed_time());

        assert!(text.contains("모니터링 회사: 42개"));
        assert!(text.contains("신규 감사보고서: <b>없음</b>"));
        assert!(!text.contains("신규 공시 목록"));
    }

    #[test]
    fn test_render_summary_truncates_sample() {
        let sample: Vec<DisclosureRecord> = (0..12)
            .map(|i| create_test_record(&format!("회사{}", i), "감사보고서", &i.to_string()))
            .collect();

        let text = render_summary(30, 12, &sample, 10, fixed_time());

        assert!(text.contains("신규 감사보고서: <b>12건</b>"));
        assert!(text.contains("  • 회사9 - 감사보고서"));
        assert!(!text.contains("회사10"));
        assert!(text.contains("  ... 외 2건"));
    }
}
