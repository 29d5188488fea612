//! 请求/响应帧
//!
//! 配置服务使用 JSON 文本帧。关联 ID 在线上以字符串编码的整数出现，
//! 部分固件版本会直接回传数字，因此解码时两种形式都接受。

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 关联 ID
///
/// 由命令通道在发送时分配，单调递增，从 100 开始。
/// 溢出后回绕到 100（调用方负责跳过仍在等待中的 ID）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// 第一个可分配的 ID
    pub const FIRST: CorrelationId = CorrelationId(100);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取原始整数值
    pub fn get(self) -> u64 {
        self.0
    }

    /// 下一个 ID（溢出时回绕到 `FIRST`）
    pub fn next(self) -> Self {
        match self.0.checked_add(1) {
            Some(value) => Self(value),
            None => Self::FIRST,
        }
    }

    /// 从线上字符串解析
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        text.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ProtocolError::InvalidId(text.to_string()))
    }

    /// 从 JSON 值解析（字符串或非负整数）
    fn from_json(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::String(text) => Self::parse(text),
            Value::Number(number) => number
                .as_u64()
                .map(Self)
                .ok_or_else(|| ProtocolError::InvalidId(number.to_string())),
            other => Err(ProtocolError::InvalidId(other.to_string())),
        }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 出站请求帧
///
/// ```rust
/// use cafebot_protocol::{CorrelationId, RequestFrame};
///
/// let frame = RequestFrame::new("get_world_offset_config", CorrelationId::FIRST, serde_json::json!({}));
/// let text = frame.encode().unwrap();
/// assert!(text.contains("\"id\":\"100\""));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// 命令名称
    pub cmd: String,
    /// 字符串编码的关联 ID
    pub id: String,
    /// 命令参数
    pub data: Value,
}

impl RequestFrame {
    pub fn new(cmd: impl Into<String>, id: CorrelationId, data: Value) -> Self {
        Self {
            cmd: cmd.into(),
            id: id.to_string(),
            data,
        }
    }

    /// 解析帧内的关联 ID
    pub fn correlation_id(&self) -> Result<CorrelationId, ProtocolError> {
        CorrelationId::parse(&self.id)
    }

    /// 编码为文本帧
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// 从文本帧解码（服务端/测试使用）
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// 入站响应帧
///
/// `id` 缺失或为 `null` 时为 `None`，这类帧是服务端主动推送，与任何请求无关。
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub id: Option<CorrelationId>,
    pub data: Value,
}

impl ResponseFrame {
    pub fn new(id: CorrelationId, data: Value) -> Self {
        Self { id: Some(id), data }
    }

    /// 从文本帧解码
    ///
    /// # 错误
    /// - `ProtocolError::Json`: 不是合法 JSON
    /// - `ProtocolError::NotAnObject`: 顶层不是对象
    /// - `ProtocolError::InvalidId`: `id` 存在但无法解析
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let id = match object.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(CorrelationId::from_json(raw)?),
        };
        let data = object.remove("data").unwrap_or(Value::Null);

        Ok(Self { id, data })
    }

    /// 编码为文本帧（ID 以字符串形式写出）
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut object = Map::new();
        if let Some(id) = self.id {
            object.insert("id".to_string(), Value::String(id.to_string()));
        }
        object.insert("data".to_string(), self.data.clone());
        Ok(serde_json::to_string(&Value::Object(object))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_correlation_id_sequence() {
        let id = CorrelationId::FIRST;
        assert_eq!(id.get(), 100);
        assert_eq!(id.next().get(), 101);
        assert_eq!(CorrelationId::new(u64::MAX).next(), CorrelationId::FIRST);
    }

    #[test]
    fn test_correlation_id_parse() {
        assert_eq!(CorrelationId::parse("123").unwrap().get(), 123);
        assert_eq!(CorrelationId::parse(" 7 ").unwrap().get(), 7);
        assert!(matches!(
            CorrelationId::parse("x1"),
            Err(ProtocolError::InvalidId(_))
        ));
        assert!(CorrelationId::parse("-1").is_err());
    }

    #[test]
    fn test_request_frame_encode() {
        let frame = RequestFrame::new(
            "get_tcp_offset_load_config",
            CorrelationId::new(105),
            json!({"userId": "test", "version": "xarm6"}),
        );
        let text = frame.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["cmd"], "get_tcp_offset_load_config");
        assert_eq!(value["id"], "105");
        assert_eq!(value["data"]["userId"], "test");
        assert_eq!(frame.correlation_id().unwrap().get(), 105);
    }

    #[test]
    fn test_response_frame_string_id() {
        let frame = ResponseFrame::decode(r#"{"id": "101", "data": {"ok": 1}}"#).unwrap();
        assert_eq!(frame.id, Some(CorrelationId::new(101)));
        assert_eq!(frame.data["ok"], 1);
    }

    #[test]
    fn test_response_frame_numeric_id() {
        let frame = ResponseFrame::decode(r#"{"id": 102, "data": []}"#).unwrap();
        assert_eq!(frame.id, Some(CorrelationId::new(102)));
    }

    #[test]
    fn test_response_frame_without_id_is_push() {
        let frame = ResponseFrame::decode(r#"{"type": "report", "data": {}}"#).unwrap();
        assert_eq!(frame.id, None);

        let frame = ResponseFrame::decode(r#"{"id": null}"#).unwrap();
        assert_eq!(frame.id, None);
        assert_eq!(frame.data, Value::Null);
    }

    #[test]
    fn test_response_frame_rejects_garbage() {
        assert!(matches!(
            ResponseFrame::decode("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ResponseFrame::decode("[1, 2]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            ResponseFrame::decode(r#"{"id": "abc"}"#),
            Err(ProtocolError::InvalidId(_))
        ));
    }

    #[test]
    fn test_response_frame_encode_uses_string_id() {
        let frame = ResponseFrame::new(CorrelationId::new(110), json!({"a": 1}));
        let text = frame.encode().unwrap();
        assert!(text.contains("\"id\":\"110\""), "{}", text);
        assert_eq!(ResponseFrame::decode(&text).unwrap(), frame);
    }
}
