#![deny(unsafe_code)]
#![doc = r#"
# spark-egress

## 模块使命（Why）
- **出站写路径核心**：为 QUIC 风格服务端提供非阻塞的数据报写入器，跟踪内核级写背压，
  并把异步完成可靠地送回所属调度方。
- **单在途约束**：写入器保证任一时刻至多一个挂起的完成回调，调度方无需自行维护在途计数。
- **迁移感知**：连接的对端地址变化时，通过监听注册表让出站路径在新流量发出前完成重新绑定。

## 核心契约（What）
- [`PacketWriter`]：写入状态机，暴露 `write_packet_with_callback`/`write_packet`/
  `is_write_blocked`/`set_writable`/`max_packet_size`；
- [`DatagramSink`]：平台层发送能力，异步完成经 [`CompletionToken`] 回传；
- [`WriteDispatcher`]：写入器到调度方的“可写”通知；
- [`MigrationRegistry`]/[`MigrationListener`]：迁移通知；
- [`WriteMetrics`]：注入式的事件计数接收端。

## 实现策略（How）
- 所有状态转换都发生在拥有写入器的 IO 任务上，写入器本身不加锁；
- 完成处理拆分为“更新状态 + 取出回调”与“执行回调 + 通知调度方”两个阶段；
- 完成令牌只持有写入器租约的弱引用，写入器关闭后迟到的完成被静默丢弃。

本 crate 与运行时无关；基于 Tokio 的 UDP 平台层见 `spark-egress-udp`。
"#]

pub mod addr;
pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod migration;
pub mod options;
pub mod result;
pub mod sink;
pub mod writer;

pub use addr::{AddressFamily, PeerAddress};
pub use config::{ConfigError, WriterConfig};
pub use dispatcher::WriteDispatcher;
pub use metrics::{CountingMetrics, NoopMetrics, TracingMetrics, WriteMetrics};
pub use migration::{ConnectionId, MigrationListener, MigrationRegistry};
pub use options::PerPacketOptions;
pub use result::{WriteError, WriteResult, WriteStatus};
pub use sink::{CompletionToken, Datagram, DatagramSink, SendOutcome, WriteCompletionEvent};
pub use writer::{PacketWriter, WriteCallback, WriteCompletion};
