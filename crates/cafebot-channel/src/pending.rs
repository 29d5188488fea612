//! 在途命令表
//!
//! 每条已发送、尚未收到应答的命令对应一个容量为 1 的通知槽位。
//! 所有插入、填充、移除、重置都在同一把锁下完成，接收线程与调用方不会在同一条目上竞争。
//!
//! 重置会丢弃槽位中的发送端，仍在等待的调用方会观察到通道断开，
//! 由通道层报告为 `CorrelationLost`。

use cafebot_protocol::CorrelationId;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// 填充结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillOutcome {
    /// 应答已放入槽位
    Delivered,
    /// ID 不在表中（已超时移除、已被消费或从未发送）
    Unknown,
    /// 槽位已有应答，重复应答被丢弃
    AlreadyFilled,
}

struct Slot {
    tx: Sender<Value>,
    rx: Receiver<Value>,
}

struct Inner {
    next_id: CorrelationId,
    slots: HashMap<CorrelationId, Slot>,
}

pub struct PendingTable {
    inner: Mutex<Inner>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: CorrelationId::FIRST,
                slots: HashMap::new(),
            }),
        }
    }

    /// 分配一个新 ID 并创建空槽位
    ///
    /// ID 回绕后跳过仍在表中的 ID。
    pub fn register(&self) -> CorrelationId {
        let mut inner = self.inner.lock();
        let mut id = inner.next_id;
        while inner.slots.contains_key(&id) {
            id = id.next();
        }
        inner.next_id = id.next();

        let (tx, rx) = crossbeam_channel::bounded(1);
        inner.slots.insert(id, Slot { tx, rx });
        id
    }

    /// 填充应答（仅当 ID 在表中且槽位为空）
    pub fn fulfill(&self, id: CorrelationId, payload: Value) -> FulfillOutcome {
        let inner = self.inner.lock();
        let Some(slot) = inner.slots.get(&id) else {
            return FulfillOutcome::Unknown;
        };
        match slot.tx.try_send(payload) {
            Ok(()) => FulfillOutcome::Delivered,
            Err(TrySendError::Full(_)) => FulfillOutcome::AlreadyFilled,
            // 槽位自己持有接收端，不会断开
            Err(TrySendError::Disconnected(_)) => FulfillOutcome::Unknown,
        }
    }

    /// 获取等待端；ID 不在表中时返回 `None`
    pub fn waiter(&self, id: CorrelationId) -> Option<Receiver<Value>> {
        self.inner.lock().slots.get(&id).map(|slot| slot.rx.clone())
    }

    pub fn remove(&self, id: CorrelationId) -> bool {
        self.inner.lock().slots.remove(&id).is_some()
    }

    /// 清空表，返回被丢弃的在途命令数量
    pub fn reset(&self) -> usize {
        let mut inner = self.inner.lock();
        let orphaned = inner.slots.len();
        inner.slots.clear();
        orphaned
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.inner.lock().slots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::RecvTimeoutError;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_register_starts_at_first_id() {
        let table = PendingTable::new();
        assert_eq!(table.register().get(), 100);
        assert_eq!(table.register().get(), 101);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_fulfill_once() {
        let table = PendingTable::new();
        let id = table.register();
        let waiter = table.waiter(id).unwrap();

        assert_eq!(table.fulfill(id, json!({"n": 1})), FulfillOutcome::Delivered);
        assert_eq!(
            table.fulfill(id, json!({"n": 2})),
            FulfillOutcome::AlreadyFilled
        );

        assert_eq!(waiter.recv().unwrap(), json!({"n": 1}));
        assert!(waiter.try_recv().is_err());
    }

    #[test]
    fn test_fulfill_unknown_id() {
        let table = PendingTable::new();
        assert_eq!(
            table.fulfill(CorrelationId::new(999), json!(null)),
            FulfillOutcome::Unknown
        );
        assert!(table.is_empty());
    }

    /// 测试重置后等待端观察到断开
    #[test]
    fn test_reset_disconnects_waiters() {
        let table = PendingTable::new();
        let id = table.register();
        let waiter = table.waiter(id).unwrap();

        assert_eq!(table.reset(), 1);
        assert!(!table.contains(id));
        assert!(matches!(
            waiter.recv_timeout(Duration::from_millis(100)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn test_wrap_skips_ids_in_use() {
        let table = PendingTable::new();
        // 占用 100
        let first = table.register();
        assert_eq!(first, CorrelationId::FIRST);

        // 强制下一个 ID 回绕
        table.inner.lock().next_id = CorrelationId::new(u64::MAX);
        assert_eq!(table.register().get(), u64::MAX);

        // 回绕到 100，但 100 仍在表中，应跳到 101
        assert_eq!(table.register().get(), 101);
    }

    #[test]
    fn test_remove() {
        let table = PendingTable::new();
        let id = table.register();
        assert!(table.remove(id));
        assert!(!table.remove(id));
        assert!(table.waiter(id).is_none());
    }
}
