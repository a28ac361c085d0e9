//! 当前日期时间工具

use async_trait::async_trait;
use chrono::{Local, SecondsFormat};

use crate::tools::{Tool, ToolContext, ToolError};

/// 返回当前本地时间（RFC 3339），供模型计算相对日期
pub struct DateTool;

#[async_trait]
impl Tool for DateTool {
    fn name(&self) -> &str {
        "get_today_date"
    }

    fn description(&self) -> &str {
        "Get today's date and time in RFC3339 format"
    }

    async fn execute(&self, _ctx: &ToolContext, _arguments: &str) -> Result<String, ToolError> {
        Ok(Local::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}
