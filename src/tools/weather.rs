//! 天气查询工具（weatherapi.com 当前天气）
//!
//! 缺少 API Key 时立即失败不重试；请求失败按 RetryPolicy 重试，耗尽后返回降级文本。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::WeatherSection;
use crate::tools::retry::{RetryPolicy, RetryingFetcher};
use crate::tools::schema::parameters_schema_for;
use crate::tools::{Tool, ToolContext, ToolError};

pub const WEATHER_FALLBACK: &str =
    "Unable to fetch weather data at the moment. The weather is probably fine though! 🌤️";

/// 天气数据提供方
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// 返回格式化后的当前天气报告
    async fn current_weather(
        &self,
        cancel: &CancellationToken,
        location: &str,
    ) -> Result<String, ToolError>;
}

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WeatherResponse {
    pub location: WeatherLocation,
    pub current: CurrentWeather,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WeatherLocation {
    pub name: String,
    pub region: String,
    pub country: String,
    pub localtime: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CurrentWeather {
    pub temp_c: f64,
    pub feelslike_c: f64,
    pub is_day: i32,
    pub condition: WeatherCondition,
    pub wind_kph: f64,
    pub wind_dir: String,
    pub precip_mm: f64,
    pub humidity: i32,
    pub cloud: i32,
    pub uv: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WeatherCondition {
    pub text: String,
}

/// 将 API 响应格式化为多行文本报告
pub fn format_weather_report(resp: &WeatherResponse) -> String {
    let current = &resp.current;
    let time_of_day = if current.is_day == 1 {
        "during the day"
    } else {
        "at night"
    };

    let mut report = format!(
        "Current weather in {}, {} ({}):\n\
         Temperature: {:.1}°C (feels like {:.1}°C)\n\
         Conditions: {}\n\
         Wind: {:.1} km/h from {}\n\
         Humidity: {}%\n\
         Cloud coverage: {}%",
        resp.location.name,
        resp.location.country,
        time_of_day,
        current.temp_c,
        current.feelslike_c,
        current.condition.text,
        current.wind_kph,
        current.wind_dir,
        current.humidity,
        current.cloud,
    );

    if current.precip_mm > 0.0 {
        report.push_str(&format!("\nPrecipitation: {:.1} mm", current.precip_mm));
    }
    if current.uv > 6.0 {
        report.push_str(&format!("\nHigh UV index: {:.0} (use sun protection)", current.uv));
    }
    report
}

/// weatherapi.com 客户端
pub struct WeatherClient {
    api_key: Option<String>,
    base_url: String,
    http: Client,
    fetcher: RetryingFetcher,
}

impl WeatherClient {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
        policy: RetryPolicy,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            fetcher: RetryingFetcher::new(policy, WEATHER_FALLBACK),
        }
    }

    pub fn from_config(section: &WeatherSection, policy: RetryPolicy) -> Self {
        Self::new(
            section.resolved_api_key(),
            section.base_url.clone(),
            section.timeout_secs,
            policy,
        )
    }

    async fn fetch_once(&self, key: &str, location: &str) -> Result<WeatherResponse, WeatherError> {
        let url = format!("{}/current.json", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("key", key), ("q", location), ("aqi", "no")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WeatherError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<WeatherResponse>().await?)
    }
}

#[async_trait]
impl WeatherProvider for WeatherClient {
    async fn current_weather(
        &self,
        cancel: &CancellationToken,
        location: &str,
    ) -> Result<String, ToolError> {
        let key = self
            .fetcher
            .require_credential(self.api_key.as_deref(), "WEATHER_API_KEY")?;

        let resp = self
            .fetcher
            .fetch(cancel, |attempt| {
                tracing::debug!(attempt, location, "fetching weather");
                self.fetch_once(key, location)
            })
            .await?;
        Ok(format_weather_report(&resp))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WeatherArgs {
    /// City name or location
    pub location: String,
}

pub struct WeatherTool {
    provider: Arc<dyn WeatherProvider>,
}

impl WeatherTool {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get weather at the given location"
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<WeatherArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<String, ToolError> {
        let args: WeatherArgs = serde_json::from_str(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let location = args.location.trim();
        if location.is_empty() {
            return Err(ToolError::InvalidArguments("location is required".to_string()));
        }
        self.provider.current_weather(&ctx.cancel, location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(precip: f64, uv: f64, is_day: i32) -> WeatherResponse {
        serde_json::from_value(json!({
            "location": {"name": "Barcelona", "region": "Catalonia", "country": "Spain"},
            "current": {
                "temp_c": 21.04, "feelslike_c": 20.0, "is_day": is_day,
                "condition": {"text": "Partly cloudy"},
                "wind_kph": 11.16, "wind_dir": "SW",
                "precip_mm": precip, "humidity": 64, "cloud": 25, "uv": uv
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_format_basic_report() {
        let report = format_weather_report(&sample(0.0, 3.0, 1));
        assert_eq!(
            report,
            "Current weather in Barcelona, Spain (during the day):\n\
             Temperature: 21.0°C (feels like 20.0°C)\n\
             Conditions: Partly cloudy\n\
             Wind: 11.2 km/h from SW\n\
             Humidity: 64%\n\
             Cloud coverage: 25%"
        );
    }

    #[test]
    fn test_format_optional_lines() {
        let report = format_weather_report(&sample(1.25, 8.0, 0));
        assert!(report.contains("(at night)"));
        assert!(report.contains("\nPrecipitation: 1.2 mm") || report.contains("\nPrecipitation: 1.3 mm"));
        assert!(report.ends_with("\nHigh UV index: 8 (use sun protection)"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_retry() {
        let client = WeatherClient::new(None, "http://127.0.0.1:9", 1, RetryPolicy::default());
        let started = std::time::Instant::now();
        let err = client
            .current_weather(&CancellationToken::new(), "Barcelona")
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Unconfigured("WEATHER_API_KEY not set".to_string()));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_unreachable_api_falls_back() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            multiplier: 2,
        };
        let client = WeatherClient::new(Some("k".into()), "http://127.0.0.1:9/v1", 1, policy);
        let err = client
            .current_weather(&CancellationToken::new(), "Barcelona")
            .await
            .unwrap_err();
        assert_eq!(err.user_facing_text(), WEATHER_FALLBACK);
    }

    #[tokio::test]
    async fn test_tool_requires_location() {
        let client = WeatherClient::new(None, "http://127.0.0.1:9", 1, RetryPolicy::default());
        let tool = WeatherTool::new(Arc::new(client));
        let ctx = ToolContext::default();

        assert!(matches!(
            tool.execute(&ctx, r#"{"location":"  "}"#).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(&ctx, "{}").await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert_eq!(tool.parameters_schema()["required"], json!(["location"]));
    }
}
