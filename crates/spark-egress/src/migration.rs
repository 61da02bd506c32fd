//! 连接迁移监听注册表。
//!
//! # 模块定位（Why）
//! - 外部的迁移决策组件判定某条连接的对端地址发生变化后，需要让所有关心该连接的组件
//!   （重新绑定出站路径、更新路由表等）在新流量发出之前完成切换。
//! - 注册表只保存监听器的弱引用：监听器的生命周期归订阅方所有，注册关系不延长其寿命。
//!
//! # 契约（What）
//! - [`MigrationRegistry::notify_migration`] 同步、按订阅顺序、对每个当前存活的监听器
//!   恰好调用一次 [`MigrationListener::on_migration`]，全部调用完成后才返回；
//! - 通知前对监听器集合做快照并释放锁，监听器可在回调中安全地订阅/退订；
//! - 迁移不影响已在途的写入，它们针对旧地址独立完成。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::addr::PeerAddress;

/// 连接标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{:016x}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// 迁移观察者。
pub trait MigrationListener: Send + Sync {
    /// 连接 `connection` 的有效对端地址已变更为 `new_peer`。
    fn on_migration(&self, connection: ConnectionId, new_peer: PeerAddress);
}

type ListenerRef = Weak<dyn MigrationListener>;

/// 按连接分组的迁移监听注册表。
#[derive(Default)]
pub struct MigrationRegistry {
    listeners: Mutex<HashMap<ConnectionId, Vec<ListenerRef>>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅指定连接；同一监听器重复订阅会被忽略。
    pub fn subscribe(&self, connection: ConnectionId, listener: &Arc<dyn MigrationListener>) {
        let weak = Arc::downgrade(listener);
        let mut listeners = self.listeners.lock();
        let entry = listeners.entry(connection).or_default();
        entry.retain(|existing| existing.strong_count() > 0);
        if entry.iter().any(|existing| Weak::ptr_eq(existing, &weak)) {
            return;
        }
        entry.push(weak);
    }

    /// 退订，返回该监听器此前是否处于订阅状态。
    pub fn unsubscribe(&self, connection: ConnectionId, listener: &Arc<dyn MigrationListener>) -> bool {
        let weak = Arc::downgrade(listener);
        let mut listeners = self.listeners.lock();
        let Some(entry) = listeners.get_mut(&connection) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|existing| !Weak::ptr_eq(existing, &weak));
        let removed = entry.len() != before;
        if entry.is_empty() {
            listeners.remove(&connection);
        }
        removed
    }

    /// 连接拆除时移除其全部订阅。
    pub fn remove_connection(&self, connection: ConnectionId) {
        self.listeners.lock().remove(&connection);
    }

    /// 当前存活的订阅数量。
    pub fn listener_count(&self, connection: ConnectionId) -> usize {
        self.listeners
            .lock()
            .get(&connection)
            .map(|entry| entry.iter().filter(|weak| weak.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// 通知迁移，返回被调用的监听器数量。
    ///
    /// # 执行步骤（How）
    /// 1. 持锁期间清理已失效的弱引用，并升级剩余监听器得到快照；
    /// 2. 释放锁后按订阅顺序依次同步调用 `on_migration`；
    /// 3. 全部返回后才结束，调用方随后即可针对新地址发起写入。
    pub fn notify_migration(&self, connection: ConnectionId, new_peer: PeerAddress) -> usize {
        let snapshot: Vec<Arc<dyn MigrationListener>> = {
            let mut listeners = self.listeners.lock();
            let Some(entry) = listeners.get_mut(&connection) else {
                tracing::debug!(%connection, %new_peer, "migration without listeners");
                return 0;
            };
            entry.retain(|weak| weak.strong_count() > 0);
            let snapshot = entry.iter().filter_map(Weak::upgrade).collect();
            if entry.is_empty() {
                listeners.remove(&connection);
            }
            snapshot
        };

        tracing::info!(%connection, %new_peer, listeners = snapshot.len(), "notifying migration");
        for listener in &snapshot {
            listener.on_migration(connection, new_peer);
        }
        snapshot.len()
    }
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("connections", &self.listeners.lock().len())
            .finish()
    }
}
