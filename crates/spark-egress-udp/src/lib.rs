#![deny(unsafe_code)]
#![doc = r#"
# spark-egress-udp

## 模块使命（Why）
- **平台落地**：把 `spark-egress` 与运行时无关的写入状态机接到真实的 Tokio `UdpSocket` 上，
  让“同步成功 / 背压挂起 / 同步失败”三态对应到内核的实际行为。
- **迁移重绑定**：连接迁移后为其开出一条独立绑定的出站路径，使迁移连接拥有自己的
  背压状态，不与主套接字互相牵连。

## 核心契约（What）
- [`UdpEgressSocket`]：`DatagramSink` 实现，`try_send_to` 命中 `WouldBlock` 时复制报文、
  在后台任务等待可写并重试，完成事件经无界队列回到路径所属任务；
- [`EgressPath`]：写入器与完成队列的组合，`drive_once`/`drain_ready` 在同一任务上处理完成；
- [`EgressRebinder`]：`MigrationListener` 实现，按连接维护独立的出站路径；
- [`UdpEgressConfig`]：绑定地址、收发缓冲与写入器配置，支持 TOML 加载；
- [`UdpError`]：绑定、配置与运行时上下文错误。

## 实现策略（How）
- 套接字统一经 `socket2` 创建：先设置缓冲区与非阻塞模式，再 `bind`/`connect`，
  最后 `UdpSocket::from_std` 交给 Tokio 反应器；
- 构造时捕获运行时 `Handle`，同步上下文（例如迁移回调）也能安全注册套接字与派生重试任务；
- 背压路径上的报文以 `bytes::Bytes` 持有，重试任务结束后立即释放。
"#]

pub mod config;
pub mod error;
pub mod path;
pub mod rebind;
pub mod socket;

pub use config::UdpEgressConfig;
pub use error::UdpError;
pub use path::EgressPath;
pub use rebind::{EgressRebinder, SharedPath};
pub use socket::UdpEgressSocket;
