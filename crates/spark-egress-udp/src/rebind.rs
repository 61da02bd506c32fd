//! 迁移后的出站路径重绑定。
//!
//! # 模块定位（Why）
//! - 连接迁移后，发往新地址的流量改走一条独立绑定的套接字：它拥有自己的发送缓冲与
//!   写入器，因此拥有独立的背压状态，主套接字拥塞不会拖慢迁移连接，反之亦然。
//! - 新地址由外部的迁移决策组件给出，本模块只负责在 `on_migration` 返回前把路径准备好。
//!
//! # 契约（What）
//! - 每条连接至多一条活跃专用路径；再次迁移时旧路径转入“退役”集合而不是立即释放，
//!   其上的在途写入照常针对旧地址完成，回调仍会触发；
//! - 退役路径由拥有者经 [`EgressRebinder::retiring`] 取出并驱动，完成排空后由
//!   [`EgressRebinder::reap_drained`] 关闭回收；
//! - [`EgressRebinder::close_connection`] 在连接结束时关闭活跃与退役路径及其套接字。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use spark_egress::{ConnectionId, MigrationListener, PeerAddress, WriteMetrics};
use tokio::runtime::Handle;

use crate::config::UdpEgressConfig;
use crate::error::UdpError;
use crate::path::EgressPath;

/// 可在多个任务间共享的专用路径。
pub type SharedPath = Arc<tokio::sync::Mutex<EgressPath>>;

#[derive(Default)]
struct Paths {
    active: HashMap<ConnectionId, SharedPath>,
    retiring: HashMap<ConnectionId, Vec<SharedPath>>,
}

/// 按连接维护专用出站路径的迁移监听器。
pub struct EgressRebinder {
    config: UdpEgressConfig,
    metrics: Arc<dyn WriteMetrics>,
    runtime: Handle,
    paths: Mutex<Paths>,
}

impl EgressRebinder {
    /// 捕获当前运行时构造重绑定器。
    pub fn new(config: UdpEgressConfig, metrics: Arc<dyn WriteMetrics>) -> Result<Self, UdpError> {
        config.validate()?;
        Ok(Self::with_handle(config, metrics, Handle::try_current()?))
    }

    pub fn with_handle(config: UdpEgressConfig, metrics: Arc<dyn WriteMetrics>, runtime: Handle) -> Self {
        Self {
            config,
            metrics,
            runtime,
            paths: Mutex::new(Paths::default()),
        }
    }

    /// 为 `connection` 打开发往 `peer` 的专用路径。
    ///
    /// 已有路径若已排空则直接关闭，否则转入退役集合，等待在途写入完成。
    pub fn rebind(&self, connection: ConnectionId, peer: PeerAddress) -> Result<SharedPath, UdpError> {
        let path = EgressPath::dedicated(
            &self.config,
            peer,
            Arc::clone(&self.metrics),
            self.runtime.clone(),
        )?;
        let local = path.local_addr().ok();
        let path = Arc::new(tokio::sync::Mutex::new(path));

        let mut paths = self.paths.lock();
        let replaced = paths.active.insert(connection, Arc::clone(&path));
        let retired = match replaced {
            Some(old) if !close_if_drained(&old) => {
                paths.retiring.entry(connection).or_default().push(old);
                true
            }
            _ => false,
        };
        drop(paths);
        tracing::info!(%connection, %peer, ?local, retired, "egress path rebound");
        Ok(path)
    }

    /// 当前连接的活跃专用路径。
    pub fn path(&self, connection: ConnectionId) -> Option<SharedPath> {
        self.paths.lock().active.get(&connection).cloned()
    }

    /// 因再次迁移而退役、仍有在途写入的路径，拥有者需继续驱动其完成队列。
    pub fn retiring(&self, connection: ConnectionId) -> Vec<SharedPath> {
        self.paths
            .lock()
            .retiring
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    /// 关闭并移除已排空的退役路径，返回回收数量。
    pub fn reap_drained(&self) -> usize {
        let mut paths = self.paths.lock();
        let mut reaped = 0;
        paths.retiring.retain(|connection, retiring| {
            let before = retiring.len();
            retiring.retain(|path| !close_if_drained(path));
            let closed = before - retiring.len();
            if closed > 0 {
                tracing::debug!(%connection, closed, "retired egress paths reaped");
            }
            reaped += closed;
            !retiring.is_empty()
        });
        reaped
    }

    /// 连接结束时释放全部专用路径，返回是否存在活跃路径。
    pub fn close_connection(&self, connection: ConnectionId) -> bool {
        let (active, retiring) = {
            let mut paths = self.paths.lock();
            (
                paths.active.remove(&connection),
                paths.retiring.remove(&connection).unwrap_or_default(),
            )
        };
        for path in active.iter().chain(retiring.iter()) {
            // 路径正被其他任务持有时，由最后一个持有者释放时关闭。
            if let Ok(mut path) = path.try_lock() {
                path.close();
            }
        }
        if active.is_some() || !retiring.is_empty() {
            tracing::debug!(%connection, retiring = retiring.len(), "dedicated egress paths closed");
        }
        active.is_some()
    }

    /// 活跃专用路径数量。
    pub fn len(&self) -> usize {
        self.paths.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().active.is_empty()
    }
}

/// 路径已排空时关闭并返回 `true`；正被其他任务持有视为未排空。
fn close_if_drained(path: &SharedPath) -> bool {
    match path.try_lock() {
        Ok(mut guard) if guard.is_drained() => {
            guard.close();
            true
        }
        _ => false,
    }
}

impl MigrationListener for EgressRebinder {
    fn on_migration(&self, connection: ConnectionId, new_peer: PeerAddress) {
        if let Err(err) = self.rebind(connection, new_peer) {
            tracing::warn!(%connection, %new_peer, code = err.code(), error = %err, "egress rebind failed");
        }
    }
}

impl std::fmt::Debug for EgressRebinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths = self.paths.lock();
        f.debug_struct("EgressRebinder")
            .field("config", &self.config)
            .field("active", &paths.active.len())
            .field("retiring", &paths.retiring.values().map(Vec::len).sum::<usize>())
            .finish_non_exhaustive()
    }
}
