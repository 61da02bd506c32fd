//! UDP 集成测试共享工具。

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use spark_egress::PeerAddress;
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

/// 安装测试日志：`RUST_LOG` 优先，默认 `info`。重复安装会被忽略。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn loopback() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// 绑定在回环地址上的接收端及其地址。
pub async fn receiver() -> (UdpSocket, PeerAddress) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind receiver");
    let addr = socket.local_addr().expect("receiver addr");
    (socket, addr.into())
}

/// 在超时内接收一个数据报，返回负载与来源。
pub async fn recv_one(socket: &UdpSocket) -> Option<(Vec<u8>, std::net::SocketAddr)> {
    let mut buf = vec![0u8; 2048];
    let received = tokio::time::timeout(Duration::from_millis(500), socket.recv_from(&mut buf)).await;
    match received {
        Ok(Ok((len, from))) => {
            buf.truncate(len);
            Some((buf, from))
        }
        _ => None,
    }
}
