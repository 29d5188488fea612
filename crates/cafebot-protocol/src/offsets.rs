//! TCP / 基座偏移配置载荷
//!
//! 对应两条查询命令：
//! - `get_tcp_offset_load_config`：工具（TCP）偏移列表
//! - `get_world_offset_config`：基座（世界坐标）偏移列表
//!
//! 服务端返回的角度分量为「度」，解码后统一为弧度并舍入到 4 位小数。

use crate::{ProtocolError, units::normalize_offset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 查询工具偏移列表的命令名
pub const GET_TOOL_OFFSETS: &str = "get_tcp_offset_load_config";

/// 查询基座偏移列表的命令名
pub const GET_BASE_OFFSETS: &str = "get_world_offset_config";

/// 六分量刚体偏移（平移 mm，旋转 rad）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Offset {
    pub fn from_array(values: [f64; 6]) -> Self {
        let [x, y, z, roll, pitch, yaw] = values;
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
    }
}

/// 工具偏移：名称 → 偏移
pub type ToolOffsets = BTreeMap<String, Offset>;

/// 基座偏移查询结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BaseOffsets {
    /// 服务端当前激活的基座偏移
    pub current: Offset,
    /// 名称 → 偏移
    pub profiles: BTreeMap<String, Offset>,
}

/// 查询请求的 `data` 部分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub user_id: String,
    pub version: String,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            user_id: "test".to_string(),
            version: "xarm6".to_string(),
        }
    }
}

impl QueryRequest {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "userId": self.user_id,
            "version": self.version,
        })
    }
}

/// 解码工具偏移响应
///
/// `data.tcp_load_offset` 可以是对象（值为条目）或数组。只有带 `tcp_offset`
/// 对象的条目才是偏移配置，其余条目（负载配置等）被忽略。
pub fn decode_tool_offsets(data: &Value) -> Result<ToolOffsets, ProtocolError> {
    let entries: Vec<&Value> = match data.get("tcp_load_offset") {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(list)) => list.iter().collect(),
        Some(other) => {
            return Err(ProtocolError::InvalidValue {
                field: "tcp_load_offset".to_string(),
                value: other.to_string(),
            });
        },
        None => return Err(ProtocolError::missing("tcp_load_offset")),
    };

    let mut profiles = ToolOffsets::new();
    for entry in entries {
        let Some(Value::Object(offset)) = entry.get("tcp_offset") else {
            continue;
        };
        let name = decode_name(offset, "tcp_offset.name")?;
        let values = decode_values(offset.get("values"), "tcp_offset.values")?;
        profiles.insert(name, Offset::from_array(normalize_offset(values)));
    }
    Ok(profiles)
}

/// 解码基座偏移响应
///
/// `data.currentConfig` 为当前激活偏移（6 个数值），`data.configs` 为
/// `{name, values}` 列表。
pub fn decode_base_offsets(data: &Value) -> Result<BaseOffsets, ProtocolError> {
    let current = decode_values(data.get("currentConfig"), "currentConfig")?;

    let configs = match data.get("configs") {
        Some(Value::Array(list)) => list,
        Some(other) => {
            return Err(ProtocolError::InvalidValue {
                field: "configs".to_string(),
                value: other.to_string(),
            });
        },
        None => return Err(ProtocolError::missing("configs")),
    };

    let mut profiles = BTreeMap::new();
    for entry in configs {
        let Value::Object(object) = entry else {
            return Err(ProtocolError::InvalidValue {
                field: "configs[]".to_string(),
                value: entry.to_string(),
            });
        };
        let name = decode_name(object, "configs[].name")?;
        let values = decode_values(object.get("values"), "configs[].values")?;
        profiles.insert(name, Offset::from_array(normalize_offset(values)));
    }

    Ok(BaseOffsets {
        current: Offset::from_array(normalize_offset(current)),
        profiles,
    })
}

/// 名称字段：字符串，或按语言区分的对象（取 `en`）
fn decode_name(object: &Map<String, Value>, field: &str) -> Result<String, ProtocolError> {
    match object.get("name") {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(Value::Object(locales)) => match locales.get("en") {
            Some(Value::String(name)) => Ok(name.clone()),
            _ => Err(ProtocolError::missing(format!("{field}.en"))),
        },
        Some(other) => Err(ProtocolError::InvalidValue {
            field: field.to_string(),
            value: other.to_string(),
        }),
        None => Err(ProtocolError::missing(field)),
    }
}

fn decode_values(raw: Option<&Value>, field: &str) -> Result<[f64; 6], ProtocolError> {
    let Some(raw) = raw else {
        return Err(ProtocolError::missing(field));
    };
    let Value::Array(items) = raw else {
        return Err(ProtocolError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
        });
    };
    if items.len() != 6 {
        return Err(ProtocolError::InvalidLength {
            field: field.to_string(),
            actual: items.len(),
        });
    }

    let mut values = [0.0; 6];
    for (slot, item) in values.iter_mut().zip(items) {
        *slot = item.as_f64().ok_or_else(|| ProtocolError::InvalidValue {
            field: field.to_string(),
            value: item.to_string(),
        })?;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_request_wire_shape() {
        let value = QueryRequest::default().to_value();
        assert_eq!(value, json!({"userId": "test", "version": "xarm6"}));

        let parsed: QueryRequest = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, QueryRequest::default());
    }

    /// 测试 gripper_A 场景：角度分量从度转换为弧度
    #[test]
    fn test_decode_tool_offsets_gripper() {
        let data = json!({
            "tcp_load_offset": {
                "1": {"tcp_offset": {"name": "gripper_A", "values": [10, 20, 30, 90, 0, 180]}}
            }
        });
        let profiles = decode_tool_offsets(&data).unwrap();
        let gripper = profiles["gripper_A"];
        assert_eq!(gripper.to_array(), [10.0, 20.0, 30.0, 1.5708, 0.0, 3.1416]);
    }

    #[test]
    fn test_decode_tool_offsets_filters_and_locales() {
        let data = json!({
            "tcp_load_offset": [
                {"tcp_load": {"name": "payload", "values": [0.5, 0, 0, 0]}},
                {"tcp_offset": {"name": {"en": "cup", "cn": "杯子"}, "values": [0, 0, 120, 0, 0, 0]}},
                {"tcp_offset": {"name": "flat", "values": [1.5, 0, 0, 0, 0, 0]}}
            ]
        });
        let profiles = decode_tool_offsets(&data).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles["cup"].z, 120.0);
        assert_eq!(profiles["flat"].x, 1.5);
    }

    #[test]
    fn test_decode_tool_offsets_errors() {
        assert!(matches!(
            decode_tool_offsets(&json!({})),
            Err(ProtocolError::MissingField(_))
        ));

        let short = json!({"tcp_load_offset": [{"tcp_offset": {"name": "x", "values": [1, 2, 3]}}]});
        assert!(matches!(
            decode_tool_offsets(&short),
            Err(ProtocolError::InvalidLength { actual: 3, .. })
        ));

        let text = json!({"tcp_load_offset": [{"tcp_offset": {"name": "x", "values": [1, 2, 3, 4, 5, "6"]}}]});
        assert!(matches!(
            decode_tool_offsets(&text),
            Err(ProtocolError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_decode_base_offsets() {
        let data = json!({
            "currentConfig": [0, 0, 0, 0, 0, 90],
            "configs": [
                {"name": "table", "values": [100, 0, -5, 0, 0, 0]},
                {"name": {"en": "counter"}, "values": [0, 250, 0, 180, 0, 0]}
            ]
        });
        let offsets = decode_base_offsets(&data).unwrap();
        assert_eq!(offsets.current.yaw, 1.5708);
        assert_eq!(offsets.profiles.len(), 2);
        assert_eq!(offsets.profiles["table"].x, 100.0);
        assert_eq!(offsets.profiles["counter"].roll, 3.1416);
    }

    #[test]
    fn test_decode_base_offsets_missing_configs() {
        let data = json!({"currentConfig": [0, 0, 0, 0, 0, 0]});
        assert!(matches!(
            decode_base_offsets(&data),
            Err(ProtocolError::MissingField(field)) if field == "configs"
        ));
    }
}
