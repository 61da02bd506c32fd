use core::fmt;
use core::str::FromStr;
use std::net::{AddrParseError, IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// UDP 头部固定长度。
pub const UDP_HEADER_LEN: usize = 8;

/// `PeerAddress` 描述出站报文的目的端点（IP + 端口）。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 写路径上的每一次发送都绑定到一个确定的对端地址；连接迁移时产生的是**新的**
///   `PeerAddress`，而不是就地修改旧值，从而保证已在途的写操作不会被“改道”。
/// - 与 `std::net::SocketAddr` 相比额外暴露 [`AddressFamily`]，供
///   `PacketWriter::max_packet_size` 以纯函数方式推导报文上限。
///
/// ## 契约（What）
/// - 值类型、`Copy`，构造后不可变；
/// - `Display` 与 `SocketAddr` 格式保持一致（IPv6 带方括号），适合日志字段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(SocketAddr);

impl PeerAddress {
    /// 根据 IP 与端口构造对端地址。
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// 地址族，决定 IP 头部开销。
    pub fn family(&self) -> AddressFamily {
        match self.0 {
            SocketAddr::V4(_) => AddressFamily::V4,
            SocketAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// 转换为标准库表示，供平台层直接交给套接字。
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<PeerAddress> for SocketAddr {
    fn from(addr: PeerAddress) -> Self {
        addr.0
    }
}

impl From<(IpAddr, u16)> for PeerAddress {
    fn from((ip, port): (IpAddr, u16)) -> Self {
        Self::new(ip, port)
    }
}

impl FromStr for PeerAddress {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Self)
    }
}

/// IP 地址族。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// 不含扩展头/选项的 IP 头部长度。
    pub const fn ip_header_len(self) -> usize {
        match self {
            AddressFamily::V4 => 20,
            AddressFamily::V6 => 40,
        }
    }

    /// IP + UDP 头部的总开销。
    pub const fn datagram_overhead(self) -> usize {
        self.ip_header_len() + UDP_HEADER_LEN
    }
}
