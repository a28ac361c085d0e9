//! 节假日查询工具：拉取 iCalendar 日历，按 before_date / after_date / max_count 过滤

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::HolidaysSection;
use crate::tools::calendar::{filter_events, parse_calendar, HolidayFilter};
use crate::tools::retry::{RetryPolicy, RetryingFetcher};
use crate::tools::schema::parameters_schema_for;
use crate::tools::{Tool, ToolContext, ToolError};

const HOLIDAYS_FALLBACK: &str = "Failed to load holiday events";

/// 日历数据来源（HTTP 或固定文本）
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn load(&self, cancel: &CancellationToken) -> Result<String, ToolError>;
}

#[derive(Error, Debug)]
pub enum CalendarFetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("calendar returned {0}")]
    Status(u16),
}

/// 通过 HTTP 拉取日历，失败按 RetryPolicy 重试
pub struct HttpCalendarSource {
    url: String,
    client: Client,
    fetcher: RetryingFetcher,
}

impl HttpCalendarSource {
    pub fn new(url: impl Into<String>, timeout_secs: u64, policy: RetryPolicy) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
            fetcher: RetryingFetcher::new(policy, HOLIDAYS_FALLBACK),
        }
    }

    pub fn from_config(section: &HolidaysSection, policy: RetryPolicy) -> Self {
        Self::new(section.resolved_calendar_url(), section.timeout_secs, policy)
    }

    async fn fetch_once(&self) -> Result<String, CalendarFetchError> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CalendarFetchError::Status(status.as_u16()));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn load(&self, cancel: &CancellationToken) -> Result<String, ToolError> {
        let body = self
            .fetcher
            .fetch(cancel, |_attempt| self.fetch_once())
            .await?;
        Ok(body)
    }
}

/// 固定日历文本（测试与离线环境）
pub struct StaticCalendarSource(pub String);

#[async_trait]
impl CalendarSource for StaticCalendarSource {
    async fn load(&self, _cancel: &CancellationToken) -> Result<String, ToolError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct HolidaysArgs {
    /// Optional date in RFC3339 format to only list holidays before this date.
    #[serde(default)]
    pub before_date: Option<String>,
    /// Optional date in RFC3339 format to only list holidays after this date.
    #[serde(default)]
    pub after_date: Option<String>,
    /// Optional maximum number of holidays to list.
    #[serde(default)]
    pub max_count: Option<i64>,
}

impl HolidaysArgs {
    pub fn into_filter(self) -> Result<HolidayFilter, ToolError> {
        Ok(HolidayFilter {
            before: parse_bound("before_date", self.before_date.as_deref())?,
            after: parse_bound("after_date", self.after_date.as_deref())?,
            max_count: self
                .max_count
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok()),
        })
    }
}

/// 空字符串视为未设置
fn parse_bound(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ToolError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => DateTime::parse_from_rfc3339(v)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| ToolError::InvalidArguments(format!("invalid {field}: {e}"))),
    }
}

pub struct HolidaysTool {
    source: Arc<dyn CalendarSource>,
}

impl HolidaysTool {
    pub fn new(source: Arc<dyn CalendarSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for HolidaysTool {
    fn name(&self) -> &str {
        "get_holidays"
    }

    fn description(&self) -> &str {
        "Gets local bank and public holidays. Each line is a single holiday in the format 'YYYY-MM-DD: Holiday Name'."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<HolidaysArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<String, ToolError> {
        let args: HolidaysArgs = if arguments.trim().is_empty() {
            HolidaysArgs::default()
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        };
        let filter = args.into_filter()?;

        let feed = self.source.load(&ctx.cancel).await?;
        let events = parse_calendar(&feed);
        tracing::debug!(events = events.len(), "holiday calendar parsed");
        Ok(filter_events(&events, &filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\nDTSTART;VALUE=DATE:20240101\nSUMMARY:New Year\nEND:VEVENT\n\
BEGIN:VEVENT\nDTSTART;VALUE=DATE:20240615\nSUMMARY:Midsummer\nEND:VEVENT\n\
BEGIN:VEVENT\nDTSTART;VALUE=DATE:20241225\nSUMMARY:Christmas\nEND:VEVENT\n\
END:VCALENDAR\n";

    fn tool() -> HolidaysTool {
        HolidaysTool::new(Arc::new(StaticCalendarSource(FEED.to_string())))
    }

    #[tokio::test]
    async fn test_after_date_and_max_count() {
        let out = tool()
            .execute(
                &ToolContext::default(),
                r#"{"after_date":"2024-02-01T00:00:00Z","max_count":1}"#,
            )
            .await
            .unwrap();
        assert_eq!(out, "2024-06-15: Midsummer");
    }

    #[tokio::test]
    async fn test_empty_strings_are_unset() {
        let out = tool()
            .execute(&ToolContext::default(), r#"{"before_date":"","after_date":""}"#)
            .await
            .unwrap();
        assert_eq!(out.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_date_and_malformed_json() {
        let bad_date = tool()
            .execute(&ToolContext::default(), r#"{"before_date":"next tuesday"}"#)
            .await;
        assert!(matches!(bad_date, Err(ToolError::InvalidArguments(msg)) if msg.starts_with("invalid before_date")));

        let bad_json = tool().execute(&ToolContext::default(), "{not json").await;
        assert!(matches!(bad_json, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_unreachable_calendar_falls_back() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            multiplier: 2,
        };
        let source = HttpCalendarSource::new("http://127.0.0.1:9/holidays.ics", 1, policy);
        let err = HolidaysTool::new(Arc::new(source))
            .execute(&ToolContext::default(), "{}")
            .await
            .unwrap_err();
        assert_eq!(err.user_facing_text(), HOLIDAYS_FALLBACK);
    }

    #[test]
    fn test_schema_lists_optional_fields() {
        let schema = tool().parameters_schema();
        assert!(schema["properties"]["before_date"].is_object());
        assert!(schema["properties"]["max_count"].is_object());
        assert!(schema.get("required").map_or(true, |r| r.as_array().map_or(true, |a| a.is_empty())));
    }
}
