//! 命令通道集成测试（基于 MockServer）

use cafebot_channel::{ChannelConfig, ChannelError, CommandChannel, CorrelationId, MockServer};
use serde_json::{Value, json};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn fast_config() -> ChannelConfig {
    ChannelConfig {
        connect_attempts: 5,
        connect_backoff: Duration::from_millis(5),
        receive_poll: Duration::from_millis(5),
    }
}

fn channel_with(server: &MockServer) -> CommandChannel {
    CommandChannel::new(server.connector(), fast_config())
}

/// 等待条件成立（接收线程异步清理连接）
fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// 测试应答只投递一次，之后 ID 从表中移除
#[test]
fn test_reply_delivered_once_and_removed() {
    let server = MockServer::new();
    let channel = channel_with(&server);

    let id = channel.send("get_world_offset_config", json!({})).unwrap();
    assert_eq!(id, CorrelationId::FIRST);
    assert!(server.reply(id, json!({"value": 1})));
    // 重复应答被丢弃
    assert!(server.reply(id, json!({"value": 2})));

    let data = channel.await_response(id, WAIT).unwrap();
    assert_eq!(data["value"], 1);
    assert_eq!(channel.pending_count(), 0);

    // 再次等待：ID 已不在表中
    assert!(matches!(
        channel.await_response(id, Duration::from_millis(20)),
        Err(ChannelError::CorrelationLost { .. })
    ));
}

/// 测试乱序应答按 ID 配对
#[test]
fn test_out_of_order_replies() {
    let server = MockServer::new();
    let channel = channel_with(&server);

    let first = channel.send("a", Value::Null).unwrap();
    let second = channel.send("b", Value::Null).unwrap();
    assert_eq!(second.get(), first.get() + 1);

    server.reply(second, json!("second"));
    server.reply(first, json!("first"));

    assert_eq!(channel.await_response(first, WAIT).unwrap(), json!("first"));
    assert_eq!(channel.await_response(second, WAIT).unwrap(), json!("second"));
}

/// 测试超时后 ID 被移除，迟到的应答被丢弃
#[test]
fn test_timeout_evicts_id() {
    let server = MockServer::new();
    let channel = channel_with(&server);

    let id = channel.send("slow", Value::Null).unwrap();
    let result = channel.await_response(id, Duration::from_millis(30));
    match result {
        Err(ChannelError::Timeout { id: timed_out, timeout_ms }) => {
            assert_eq!(timed_out, id);
            assert_eq!(timeout_ms, 30);
        },
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(channel.pending_count(), 0);

    // 迟到的应答不会重新创建条目
    server.reply(id, json!({"late": true}));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(channel.pending_count(), 0);
    assert!(channel.is_connected());
}

/// 测试自动应答函数
#[test]
fn test_request_with_responder() {
    let server = MockServer::new();
    server.set_responder(|request| Some(json!({"cmd": request.cmd})));
    let channel = channel_with(&server);

    let data = channel.request("get_tcp_offset_load_config", json!({}), WAIT).unwrap();
    assert_eq!(data["cmd"], "get_tcp_offset_load_config");

    let seen = server.next_request(WAIT).unwrap();
    assert_eq!(seen.cmd, "get_tcp_offset_load_config");
}

/// 测试重连使在途命令立即失败为 CorrelationLost
#[test]
fn test_reconnect_orphans_pending_commands() {
    let server = MockServer::new();
    let channel = Arc::new(channel_with(&server));

    let id = channel.send("pending", Value::Null).unwrap();
    let waiter = {
        let channel = channel.clone();
        thread::spawn(move || channel.await_response(id, Duration::from_secs(5)))
    };
    // 让等待方先进入等待
    thread::sleep(Duration::from_millis(20));

    channel.reconnect().unwrap();
    assert_eq!(server.connections(), 2);

    let started = Instant::now();
    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(ChannelError::CorrelationLost { id: lost }) if lost == id));
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// 测试未知 ID、无 ID 的帧被忽略，接收线程继续工作
#[test]
fn test_unknown_and_push_frames_are_ignored() {
    let server = MockServer::new();
    let channel = channel_with(&server);

    let id = channel.send("cmd", Value::Null).unwrap();
    server.reply(CorrelationId::new(4242), json!("stray"));
    server.push_raw(r#"{"type": "report", "data": {"temperature": 40}}"#);
    server.reply(id, json!("mine"));

    assert_eq!(channel.await_response(id, WAIT).unwrap(), json!("mine"));
    assert!(channel.is_connected());
}

/// 测试无法解码的帧终止接收线程，下一次发送重新建立连接
#[test]
fn test_receive_failure_triggers_reconnect() {
    let server = MockServer::new();
    let channel = channel_with(&server);

    let id = channel.send("cmd", Value::Null).unwrap();
    server.push_raw("this is not json");

    assert!(wait_until(|| !channel.is_connected()));
    assert!(matches!(
        channel.await_response(id, WAIT),
        Err(ChannelError::CorrelationLost { .. })
    ));

    server.set_responder(|_| Some(json!("fresh")));
    let data = channel.request("cmd", Value::Null, WAIT).unwrap();
    assert_eq!(data, json!("fresh"));
    assert_eq!(server.connections(), 2);
}

/// 测试服务端断开后重新连接
#[test]
fn test_server_disconnect_then_reconnect() {
    let server = MockServer::new();
    server.set_responder(|_| Some(json!("ok")));
    let channel = channel_with(&server);

    channel.request("first", Value::Null, WAIT).unwrap();
    server.disconnect();
    assert!(wait_until(|| !channel.is_connected()));

    channel.request("second", Value::Null, WAIT).unwrap();
    assert_eq!(server.connections(), 2);
}

/// 测试连接被拒绝 5 次后返回 Unavailable
#[test]
fn test_unavailable_after_bounded_attempts() {
    let server = MockServer::new();
    server.refuse_connections(u32::MAX);
    let channel = channel_with(&server);

    let result = channel.send("cmd", Value::Null);
    assert!(matches!(result, Err(ChannelError::Unavailable { attempts: 5 })));
    assert_eq!(server.connect_attempts(), 5);
    assert_eq!(channel.pending_count(), 0);
}

/// 测试前几次连接失败后仍能成功
#[test]
fn test_connect_succeeds_after_refusals() {
    let server = MockServer::new();
    server.refuse_connections(3);
    let channel = channel_with(&server);

    let id = channel.send("cmd", Value::Null).unwrap();
    assert_eq!(server.connect_attempts(), 4);
    assert!(channel.is_connected());
    assert_eq!(id, CorrelationId::FIRST);
}

/// 测试发送失败会丢弃连接并在下一次尝试时重建
#[test]
fn test_send_failure_drops_connection() {
    let server = MockServer::new();
    let channel = channel_with(&server);
    channel.send("warmup", Value::Null).unwrap();

    server.fail_sends(true);
    let result = channel.send("cmd", Value::Null);
    assert!(matches!(result, Err(ChannelError::Unavailable { attempts: 5 })));
    // 每次失败都丢弃连接，下一次尝试重新建立
    assert_eq!(server.connections(), 5);
    assert_eq!(channel.pending_count(), 0);

    server.fail_sends(false);
    channel.send("cmd", Value::Null).unwrap();
    assert_eq!(server.connections(), 6);
}

/// 测试关闭通道
#[test]
fn test_close_and_drop() {
    let server = MockServer::new();
    let channel = channel_with(&server);
    let id = channel.send("cmd", Value::Null).unwrap();

    channel.close();
    assert!(!channel.is_connected());
    assert!(matches!(
        channel.await_response(id, Duration::from_millis(10)),
        Err(ChannelError::CorrelationLost { .. })
    ));
    drop(channel);
}
