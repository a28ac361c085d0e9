//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(ctx, call) 在超时内调用 registry.execute，
//! 同时响应取消信号；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::llm::{ToolCall, ToolDefinition};
use crate::tools::{ToolContext, ToolError, ToolRegistry};

/// 工具执行器：对每次调用施加超时，超时映射为 ToolError::Timeout
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一次工具调用
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<String, ToolError> {
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
            r = timeout(self.timeout, self.registry.execute(ctx, &call.name, &call.arguments)) => {
                r.unwrap_or_else(|_| Err(ToolError::Timeout(call.name.clone())))
            }
        };

        let (ok, outcome): (bool, &str) = match &result {
            Ok(_) => (true, "ok"),
            Err(ToolError::Timeout(_)) => (false, "timeout"),
            Err(ToolError::NotFound(_)) => (false, "not_found"),
            Err(ToolError::Cancelled) => (false, "cancelled"),
            Err(_) => (false, "error"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}

fn args_preview(args: &str) -> String {
    if args.chars().count() > 200 {
        format!("{}...", args.chars().take(200).collect::<String>())
    } else {
        args.to_string()
    }
}
