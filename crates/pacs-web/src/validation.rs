//! 请求字段校验
//!
//! 每条规则只记录错误、不中断，`finish` 时一次性返回全部字段错误；
//! 业务逻辑只在 `finish` 成功后才使用取到的值。

use pacs_core::{utils::is_iso8601, FieldError, PacsError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 解析 JSON 请求体；空请求体按空对象处理，交给字段规则报错
pub fn parse_body(bytes: &[u8]) -> Result<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(bytes).map_err(|e| {
        PacsError::Validation(vec![FieldError::new(
            "body",
            format!("Malformed JSON body: {}", e),
        )])
    })
}

/// 针对 JSON 对象（请求体或查询参数）的声明式校验器
#[derive(Debug)]
pub struct Validator {
    fields: Map<String, Value>,
    errors: Vec<FieldError>,
}

/// 把值转成字符串用于比较和报错，与 JSON 类型无关
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn display(value: &Value) -> String {
    as_text(value).unwrap_or_else(|| value.to_string())
}

impl Validator {
    /// 请求体必须是 JSON 对象，否则记录一条 `body` 错误
    pub fn from_body(body: &Value) -> Self {
        match body {
            Value::Object(map) => Self {
                fields: map.clone(),
                errors: Vec::new(),
            },
            _ => Self {
                fields: Map::new(),
                errors: vec![FieldError::new("body", "Request body must be a JSON object")],
            },
        }
    }

    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let fields = params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Self {
            fields,
            errors: Vec::new(),
        }
    }

    fn present(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    fn fail(&mut self, field: &str, message: &str, value: Option<&Value>) {
        let mut error = FieldError::new(field, message);
        if let Some(value) = value {
            error = error.with_value(display(value));
        }
        self.errors.push(error);
    }

    /// 必填且非空
    pub fn required_string(&mut self, field: &str, message: &str) -> String {
        match self.present(field).cloned() {
            Some(value) => match as_text(&value) {
                Some(text) if !text.is_empty() => text,
                _ => {
                    self.fail(field, message, Some(&value));
                    String::new()
                }
            },
            None => {
                self.fail(field, message, None);
                String::new()
            }
        }
    }

    /// 可选，出现时必须是字符串
    pub fn optional_string(&mut self, field: &str, message: &str) -> Option<String> {
        let value = self.present(field).cloned()?;
        match value {
            Value::String(s) => Some(s),
            other => {
                self.fail(field, message, Some(&other));
                None
            }
        }
    }

    /// 必填且长度不小于 `min`
    pub fn min_length(&mut self, field: &str, min: usize, message: &str) -> String {
        match self.present(field).cloned() {
            Some(value) => match as_text(&value) {
                Some(text) if text.chars().count() >= min => text,
                _ => {
                    self.fail(field, message, Some(&value));
                    String::new()
                }
            },
            None => {
                self.fail(field, message, None);
                String::new()
            }
        }
    }

    fn parse_int(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// 可选整数，可附带闭区间
    pub fn optional_int(
        &mut self,
        field: &str,
        range: Option<(i64, i64)>,
        message: &str,
    ) -> Option<i64> {
        let value = self.present(field).cloned()?;
        match Self::parse_int(&value) {
            Some(n) if range.map_or(true, |(lo, hi)| n >= lo && n <= hi) => Some(n),
            _ => {
                self.fail(field, message, Some(&value));
                None
            }
        }
    }

    /// 必填整数
    pub fn required_int(&mut self, field: &str, message: &str) -> i64 {
        self.required_int_in(field, None, message)
    }

    /// 必填整数，可附带闭区间
    pub fn required_int_in(&mut self, field: &str, range: Option<(i64, i64)>, message: &str) -> i64 {
        if self.present(field).is_none() {
            self.fail(field, message, None);
            return 0;
        }
        self.optional_int(field, range, message).unwrap_or_default()
    }

    /// 可选 ISO 8601 日期
    pub fn optional_iso8601(&mut self, field: &str, message: &str) -> Option<String> {
        let value = self.present(field).cloned()?;
        match &value {
            Value::String(s) if is_iso8601(s) => Some(s.clone()),
            _ => {
                self.fail(field, message, Some(&value));
                None
            }
        }
    }

    /// 必填 ISO 8601 日期
    pub fn required_iso8601(&mut self, field: &str, message: &str) -> String {
        if self.present(field).is_none() {
            self.fail(field, message, None);
            return String::new();
        }
        self.optional_iso8601(field, message).unwrap_or_default()
    }

    /// 可选，出现时必须是给定取值之一
    pub fn optional_one_of(&mut self, field: &str, allowed: &[&str], message: &str) -> Option<String> {
        let value = self.present(field).cloned()?;
        match &value {
            Value::String(s) if allowed.contains(&s.as_str()) => Some(s.clone()),
            _ => {
                self.fail(field, message, Some(&value));
                None
            }
        }
    }

    /// 必填且为给定取值之一
    pub fn required_one_of(&mut self, field: &str, allowed: &[&str], message: &str) -> String {
        if self.present(field).is_none() {
            self.fail(field, message, None);
            return String::new();
        }
        self.optional_one_of(field, allowed, message).unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 汇总：有任一规则失败即返回 `Validation`
    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(PacsError::Validation(self.errors))
        }
    }
}
