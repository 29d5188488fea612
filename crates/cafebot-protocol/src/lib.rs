//! # Cafebot Protocol
//!
//! xArm 配置服务的 WebSocket 文本协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `frame`: 请求/响应帧与关联 ID
//! - `offsets`: TCP / 基座偏移配置的载荷解析
//! - `units`: 角度单位换算与舍入
//!
//! ## 帧格式
//!
//! ```text
//! 请求: {"cmd": "<name>", "id": "<u64>", "data": {...}}
//! 响应: {"id": "<u64>", "data": {...}}
//! ```
//!
//! 响应通过 `id` 与请求配对，服务端可以乱序返回。

pub mod frame;
pub mod offsets;
pub mod units;

// 重新导出常用类型
pub use frame::{CorrelationId, RequestFrame, ResponseFrame};
pub use offsets::{
    BaseOffsets, GET_BASE_OFFSETS, GET_TOOL_OFFSETS, Offset, QueryRequest, ToolOffsets,
    decode_base_offsets, decode_tool_offsets,
};
pub use units::{deg_to_rad, normalize_offset, rad_to_deg, round_to, to_driver_units};

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON 编解码失败
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// 帧顶层不是 JSON 对象
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// 关联 ID 无法解析为整数
    #[error("Invalid correlation id: {0}")]
    InvalidId(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    /// 偏移向量长度不是 6
    #[error("Invalid offset length for {field}: expected 6, got {actual}")]
    InvalidLength { field: String, actual: usize },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: String },
}

impl ProtocolError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidId("abc".to_string());
        assert_eq!(format!("{}", err), "Invalid correlation id: abc");

        let err = ProtocolError::InvalidLength {
            field: "tcp_offset.values".to_string(),
            actual: 5,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("expected 6") && msg.contains("got 5"), "{}", msg);

        let err = ProtocolError::missing("configs");
        assert_eq!(format!("{}", err), "Missing field: configs");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::Json(_)));
    }
}
