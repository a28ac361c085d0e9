//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__LLM__MODEL=gpt-4.1`）。
//! 循环上限、重试次数与退避参数都是策略值，默认值与原有行为一致。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub llm: LlmSection,
    pub assistant: AssistantSection,
    pub tools: ToolsSection,
    pub storage: StorageSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [server] 段：监听地址与关闭等待时间
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

/// [llm] 段：后端选择、回复与标题使用的模型、超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 回复生成使用的模型
    #[serde(default = "default_model")]
    pub model: String,
    /// 标题生成使用的模型
    #[serde(default = "default_title_model")]
    pub title_model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            title_model: default_title_model(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}

fn default_title_model() -> String {
    "o1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [assistant] 段：回复循环上限、提示词与标题策略
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSection {
    /// 单次回复最多调用模型的次数（工具调用熔断）
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_title_instruction")]
    pub title_instruction: String,
    /// 新会话的占位标题（标题生成失败时保留）
    #[serde(default = "default_title")]
    pub default_title: String,
    /// 会话无消息时直接返回的标题
    #[serde(default = "default_empty_title")]
    pub empty_title: String,
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            system_prompt: default_system_prompt(),
            title_instruction: default_title_instruction(),
            default_title: default_title(),
            empty_title: default_empty_title(),
            max_title_chars: default_max_title_chars(),
        }
    }
}

fn default_max_tool_iterations() -> usize {
    15
}

fn default_system_prompt() -> String {
    "You are a helpful, concise AI assistant. Provide accurate, safe, and clear responses."
        .to_string()
}

fn default_title_instruction() -> String {
    "Generate a concise, descriptive title for the conversation based on the user message. \
     The title should be a single line, no more than 80 characters, and should not include \
     any special characters or emojis."
        .to_string()
}

fn default_title() -> String {
    "Untitled conversation".to_string()
}

fn default_empty_title() -> String {
    "An empty conversation".to_string()
}

fn default_max_title_chars() -> usize {
    80
}

/// [tools] 段：工具超时、外部数据重试策略、天气与节假日数据源
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）；低于数据源重试总耗时时按后者生效
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub weather: WeatherSection,
    #[serde(default)]
    pub holidays: HolidaysSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            retry: RetrySection::default(),
            weather: WeatherSection::default(),
            holidays: HolidaysSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    45
}

/// [tools.retry] 段：第 n 次重试前等待 base_delay_ms × multiplier^(n-1)
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySection {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_multiplier() -> u32 {
    2
}

/// [tools.weather] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherSection {
    /// 未设置时读取 WEATHER_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    #[serde(default = "default_weather_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_base_url(),
            timeout_secs: default_weather_timeout_secs(),
        }
    }
}

impl WeatherSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("WEATHER_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

fn default_weather_base_url() -> String {
    "http://api.weatherapi.com/v1".to_string()
}

fn default_weather_timeout_secs() -> u64 {
    5
}

/// [tools.holidays] 段
#[derive(Debug, Clone, Deserialize)]
pub struct HolidaysSection {
    /// 未设置时读取 HOLIDAY_CALENDAR_LINK，再回退到加泰罗尼亚日历
    pub calendar_url: Option<String>,
    #[serde(default = "default_holidays_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HolidaysSection {
    fn default() -> Self {
        Self {
            calendar_url: None,
            timeout_secs: default_holidays_timeout_secs(),
        }
    }
}

impl HolidaysSection {
    pub fn resolved_calendar_url(&self) -> String {
        self.calendar_url
            .clone()
            .or_else(|| std::env::var("HOLIDAY_CALENDAR_LINK").ok())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "https://www.officeholidays.com/ics/spain/catalonia".to_string())
    }
}

fn default_holidays_timeout_secs() -> u64 {
    10
}

/// [storage] 段：会话存储后端（memory / sqlite）
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("data/conversations.db")
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
