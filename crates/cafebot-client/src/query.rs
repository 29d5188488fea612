//! 配置服务查询
//!
//! 每次查询发送一条命名命令，阻塞等待应答（默认 2s），然后解码为命名偏移配置。
//! 结果不缓存：每次应用偏移都会重新查询。

use crate::QueryError;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use cafebot_channel::CommandChannel;
use cafebot_protocol::{
    BaseOffsets, GET_BASE_OFFSETS, GET_TOOL_OFFSETS, QueryRequest, ToolOffsets,
    decode_base_offsets, decode_tool_offsets,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 偏移配置来源
pub trait OffsetSource: Send + Sync {
    /// 获取全部工具偏移（名称 → 偏移，角度为弧度）
    fn tool_offsets(&self) -> Result<ToolOffsets, QueryError>;

    /// 获取当前基座偏移和全部命名基座偏移
    fn base_offsets(&self) -> Result<BaseOffsets, QueryError>;
}

/// 基于命令通道的配置查询客户端
pub struct ConfigQueryClient {
    channel: Arc<CommandChannel>,
    request: QueryRequest,
    timeout: Duration,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ConfigQueryClient {
    /// 默认应答超时
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(channel: Arc<CommandChannel>, retry: RetryPolicy) -> Self {
        Self {
            channel,
            request: QueryRequest::default(),
            timeout: Self::DEFAULT_TIMEOUT,
            retry,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// 设置请求身份（`userId` / `version`）
    pub fn with_request(mut self, request: QueryRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn run_blocking(&self, cmd: &str) -> Result<Value, QueryError> {
        let id = self.channel.send(cmd, self.request.to_value())?;
        let data = self.channel.await_response(id, self.timeout)?;
        debug!("'{}' answered by command {}", cmd, id);
        Ok(data)
    }
}

impl OffsetSource for ConfigQueryClient {
    fn tool_offsets(&self) -> Result<ToolOffsets, QueryError> {
        self.retry
            .with_channel_retry(self.sleeper.as_ref(), "tool offsets", || {
                let data = self.run_blocking(GET_TOOL_OFFSETS)?;
                let profiles = decode_tool_offsets(&data)?;
                info!("Fetched {} tool offset profile(s)", profiles.len());
                Ok(profiles)
            })
    }

    fn base_offsets(&self) -> Result<BaseOffsets, QueryError> {
        self.retry
            .with_channel_retry(self.sleeper.as_ref(), "base offsets", || {
                let data = self.run_blocking(GET_BASE_OFFSETS)?;
                let offsets = decode_base_offsets(&data)?;
                info!("Current base offset: {:?}", offsets.current);
                info!("Fetched {} base offset profile(s)", offsets.profiles.len());
                Ok(offsets)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::testing::RecordingSleeper;
    use cafebot_channel::{ChannelConfig, ChannelError, MockServer};
    use serde_json::json;

    fn client(server: &MockServer, attempts: u32) -> (ConfigQueryClient, Arc<RecordingSleeper>) {
        let config = ChannelConfig {
            connect_attempts: 2,
            connect_backoff: Duration::from_millis(1),
            receive_poll: Duration::from_millis(5),
        };
        let channel = Arc::new(CommandChannel::new(server.connector(), config));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = ConfigQueryClient::new(channel, RetryPolicy::new(attempts))
            .with_timeout(Duration::from_millis(200))
            .with_sleeper(sleeper.clone());
        (client, sleeper)
    }

    /// 测试 gripper_A 场景
    #[test]
    fn test_tool_offsets_gripper_scenario() {
        let server = MockServer::new();
        server.set_responder(|request| {
            assert_eq!(request.cmd, GET_TOOL_OFFSETS);
            assert_eq!(request.data, json!({"userId": "test", "version": "xarm6"}));
            Some(json!({
                "tcp_load_offset": {
                    "0": {"tcp_offset": {"name": "gripper_A", "values": [10, 20, 30, 90, 0, 180]}}
                }
            }))
        });
        let (client, _) = client(&server, 3);

        let profiles = client.tool_offsets().unwrap();
        let gripper = profiles["gripper_A"];
        assert_eq!([gripper.roll, gripper.pitch, gripper.yaw], [1.5708, 0.0, 3.1416]);
        assert_eq!([gripper.x, gripper.y, gripper.z], [10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_base_offsets() {
        let server = MockServer::new();
        server.set_responder(|request| {
            assert_eq!(request.cmd, GET_BASE_OFFSETS);
            Some(json!({
                "currentConfig": [0, 0, 0, 0, 0, 0],
                "configs": [{"name": "table", "values": [0, 0, 10, 0, 0, 90]}]
            }))
        });
        let (client, _) = client(&server, 3);
        let offsets = client.base_offsets().unwrap();
        assert_eq!(offsets.profiles["table"].yaw, 1.5708);
    }

    #[test]
    fn test_custom_request_identity() {
        let server = MockServer::new();
        server.set_responder(|request| {
            assert_eq!(request.data["userId"], "barista");
            Some(json!({"tcp_load_offset": []}))
        });
        let (client, _) = client(&server, 1);
        let client = client.with_request(QueryRequest {
            user_id: "barista".to_string(),
            version: "xarm7".to_string(),
        });
        assert!(client.tool_offsets().unwrap().is_empty());
    }

    /// 测试超时被通道重试策略重试
    #[test]
    fn test_timeout_is_retried() {
        let server = MockServer::new();
        let (client, sleeper) = client(&server, 3);

        let result = client.tool_offsets();
        assert!(matches!(
            result,
            Err(QueryError::Channel(ChannelError::Timeout { .. }))
        ));
        assert_eq!(sleeper.count(), 2);
        let mut sent = 0;
        while server.next_request(Duration::from_millis(10)).is_some() {
            sent += 1;
        }
        assert_eq!(sent, 3);
    }

    #[test]
    fn test_malformed_reply_not_retried() {
        let server = MockServer::new();
        server.set_responder(|_| Some(json!({"unexpected": true})));
        let (client, sleeper) = client(&server, 3);

        assert!(matches!(client.tool_offsets(), Err(QueryError::Protocol(_))));
        assert_eq!(sleeper.count(), 0);
    }
}
