//! 工具参数 JSON Schema 生成（schemars 自动从参数结构体生成）
//!
//! 去掉 `$schema` / `title` 等根级元信息，只保留模型需要的 object 描述。

use schemars::{schema_for, JsonSchema};
use serde_json::{json, Value};

/// 由参数结构体生成工具的 parameters schema
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("type").or_insert_with(|| json!("object"));
        obj.entry("properties").or_insert_with(|| json!({}));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Args {
        /// City name or location
        location: String,
        max_count: Option<i64>,
    }

    #[test]
    fn test_schema_shape() {
        let schema = parameters_schema_for::<Args>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
        assert_eq!(
            schema["properties"]["location"]["description"],
            "City name or location"
        );
        assert_eq!(schema["required"], json!(["location"]));
    }
}
