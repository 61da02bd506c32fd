use std::io;
use std::net::SocketAddr;

use spark_egress::ConfigError;
use thiserror::Error;

/// UDP 平台层错误。
///
/// # Why
/// - 写路径本身的失败以 `WriteResult` 回报；这里只覆盖套接字生命周期内“无法建立出站路径”的情形，
///   供启动流程或迁移重绑定记录与降级。
///
/// # What
/// - 每个变体保留原始 `io::Error`，通过 [`UdpError::code`] 暴露稳定错误码。
#[derive(Debug, Error)]
pub enum UdpError {
    /// 创建或绑定套接字失败。
    #[error("无法绑定出站 UDP 套接字到 {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: io::Error,
    },
    /// 将专用路径连接到新对端失败。
    #[error("无法将出站 UDP 套接字连接到 {peer}: {source}")]
    Connect {
        peer: SocketAddr,
        source: io::Error,
    },
    /// 设置套接字选项失败。
    #[error("设置 UDP 套接字选项 `{option}` 失败: {source}")]
    Configure {
        option: &'static str,
        source: io::Error,
    },
    /// 查询本地地址失败。
    #[error("无法获取 UDP 套接字本地地址: {0}")]
    LocalAddr(#[source] io::Error),
    /// 当前线程不在 Tokio 运行时上下文中。
    #[error("当前线程未处于 Tokio 运行时上下文: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
    /// 配置非法。
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl UdpError {
    /// 稳定错误码，遵循 `spark.<area>.<reason>` 约定。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "spark.egress.udp.bind_failed",
            Self::Connect { .. } => "spark.egress.udp.connect_failed",
            Self::Configure { .. } => "spark.egress.udp.configure_failed",
            Self::LocalAddr(_) => "spark.egress.udp.local_addr_failed",
            Self::Runtime(_) => "spark.egress.udp.no_runtime",
            Self::Config(_) => "spark.egress.udp.invalid_config",
        }
    }
}
