use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use spark_egress::{AddressFamily, ConfigError, WriterConfig};

/// 主套接字与专用路径的默认收发缓冲（1 MiB）。
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 1024 * 1024;

/// UDP 出站路径配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 服务端主套接字与迁移后的专用套接字共享同一份缓冲区策略，避免迁移连接因默认缓冲过小
///   而频繁进入背压。
///
/// ## 契约（What）
/// - `bind_addr`：主套接字绑定地址；专用路径复用其 IP，端口由内核分配；
/// - `send_buffer_size` / `recv_buffer_size`：`SO_SNDBUF` / `SO_RCVBUF`，必须大于 0；
/// - `writer`：嵌套的 [`WriterConfig`]，对应 TOML 中的 `[writer]` 表。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UdpEgressConfig {
    pub bind_addr: SocketAddr,
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
    pub writer: WriterConfig,
}

impl Default for UdpEgressConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            send_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            recv_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

impl UdpEgressConfig {
    /// 从 TOML 文本加载并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "send_buffer_size",
                reason: "must be greater than zero".into(),
            });
        }
        if self.recv_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "recv_buffer_size",
                reason: "must be greater than zero".into(),
            });
        }
        self.writer.validate()
    }

    /// 发往 `family` 对端的专用路径应绑定的本地地址：沿用 `bind_addr` 的 IP，端口交给内核分配。
    ///
    /// 地址族不一致时退回到对应族的未指定地址。
    pub fn dedicated_bind_addr(&self, family: AddressFamily) -> SocketAddr {
        let ip = match (family, self.bind_addr.ip()) {
            (AddressFamily::V4, ip @ IpAddr::V4(_)) | (AddressFamily::V6, ip @ IpAddr::V6(_)) => ip,
            (AddressFamily::V4, IpAddr::V6(_)) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            (AddressFamily::V6, IpAddr::V4(_)) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        SocketAddr::new(ip, 0)
    }
}
