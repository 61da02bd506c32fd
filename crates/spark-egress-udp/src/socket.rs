//! Tokio `UdpSocket` 之上的 [`DatagramSink`] 实现。
//!
//! # 模块定位（Why）
//! - 写入器要求平台层在 `WouldBlock` 时接管报文并稍后回报结果；Tokio 的 `try_send_to`
//!   恰好给出“立即成功 / 需要等待 / 立即失败”三态，本模块把它翻译为 [`SendOutcome`]。
//!
//! # 实现要点（How）
//! - 同步路径经 `socket2::SockRef` 直接发起一次内核调用（套接字已是非阻塞模式），不经过
//!   Tokio 缓存的可写就绪状态：新注册的套接字尚未观测到就绪事件，走 `try_send_to` 会在内核
//!   仍有空间时误报 `WouldBlock`；
//! - 只有内核真正返回 `EAGAIN` 时才复制报文到 `Bytes`，在后台任务中循环
//!   `writable().await` + `try_send_to`，直到成功或遇到非 `WouldBlock` 错误；
//! - 最终结果经 [`CompletionToken::resolve`] 转为完成事件，送入无界队列；写入器已关闭时
//!   令牌失效，结果被直接丢弃。

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use spark_egress::{CompletionToken, Datagram, DatagramSink, SendOutcome, WriteCompletionEvent};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::UdpEgressConfig;
use crate::error::UdpError;

/// 完成事件的接收端，由拥有写入器的任务持有。
pub type CompletionReceiver = mpsc::UnboundedReceiver<WriteCompletionEvent>;

/// 非阻塞 UDP 发送端。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 作为 `PacketWriter` 的唯一平台依赖，把内核发送缓冲满的信号转成写入器可理解的背压。
///
/// ## 契约（What）
/// - `send` 从不等待；返回 `Pending` 时报文已复制，完成事件恰好投递一次（写入器关闭时除外）；
/// - 所有派生任务都运行在构造时捕获的运行时上，调用线程不要求处于运行时上下文；
/// - `buffers_blocked_writes` 恒为真：背压期间提交的报文由后台任务持有直至发出；
/// - 已 `connect` 的专用套接字只向连接对端发送，目标不一致的写入同步返回 `InvalidInput`。
///
/// ## 注意事项（Trade-offs）
/// - `PerPacketOptions` 目前只记录到日志：单套接字上的逐包 TOS 需要 `sendmsg` 控制消息，
///   这里保持单次 `send_to` 的简单路径。
#[derive(Debug)]
pub struct UdpEgressSocket {
    socket: Arc<UdpSocket>,
    completions: mpsc::UnboundedSender<WriteCompletionEvent>,
    runtime: Handle,
    connected_peer: Option<SocketAddr>,
    #[cfg(test)]
    forced_would_block: usize,
}

impl UdpEgressSocket {
    /// 在当前运行时上绑定主出站套接字。
    pub fn bind(config: &UdpEgressConfig) -> Result<(Self, CompletionReceiver), UdpError> {
        let runtime = Handle::try_current()?;
        Self::open(config, config.bind_addr, None, runtime)
    }

    /// 创建套接字：设置缓冲区与非阻塞模式后绑定，可选地连接到固定对端。
    pub(crate) fn open(
        config: &UdpEgressConfig,
        local: SocketAddr,
        peer: Option<SocketAddr>,
        runtime: Handle,
    ) -> Result<(Self, CompletionReceiver), UdpError> {
        let bind_err = |source: io::Error| UdpError::Bind {
            addr: local,
            source,
        };
        let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))
            .map_err(bind_err)?;
        socket
            .set_send_buffer_size(config.send_buffer_size)
            .map_err(|source| UdpError::Configure {
                option: "SO_SNDBUF",
                source,
            })?;
        socket
            .set_recv_buffer_size(config.recv_buffer_size)
            .map_err(|source| UdpError::Configure {
                option: "SO_RCVBUF",
                source,
            })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| UdpError::Configure {
                option: "O_NONBLOCK",
                source,
            })?;
        socket.bind(&SockAddr::from(local)).map_err(bind_err)?;
        if let Some(peer) = peer {
            socket
                .connect(&SockAddr::from(peer))
                .map_err(|source| UdpError::Connect { peer, source })?;
        }

        let socket = {
            let _entered = runtime.enter();
            UdpSocket::from_std(socket.into()).map_err(bind_err)?
        };
        let (completions, receiver) = mpsc::unbounded_channel();
        let egress = Self {
            socket: Arc::new(socket),
            completions,
            runtime,
            connected_peer: peer,
            #[cfg(test)]
            forced_would_block: 0,
        };
        tracing::debug!(local = ?egress.socket.local_addr().ok(), ?peer, "egress socket ready");
        Ok((egress, receiver))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, UdpError> {
        self.socket.local_addr().map_err(UdpError::LocalAddr)
    }

    /// 专用路径连接的对端；主套接字为 `None`。
    pub fn connected_peer(&self) -> Option<SocketAddr> {
        self.connected_peer
    }

    /// 让接下来 `count` 次同步发送视为内核返回 `WouldBlock`。
    #[cfg(test)]
    pub(crate) fn force_would_block(&mut self, count: usize) {
        self.forced_would_block = count;
    }

    /// 直接向内核发起一次非阻塞发送。
    fn send_now(&mut self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        #[cfg(test)]
        if self.forced_would_block > 0 {
            self.forced_would_block -= 1;
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let sock = SockRef::from(&*self.socket);
        match self.connected_peer {
            Some(_) => sock.send(payload),
            None => sock.send_to(payload, &SockAddr::from(target)),
        }
    }

    fn defer(&self, payload: Bytes, target: SocketAddr, token: CompletionToken) {
        let socket = Arc::clone(&self.socket);
        let completions = self.completions.clone();
        let connected = self.connected_peer.is_some();
        self.runtime.spawn(async move {
            let sequence = token.sequence();
            let outcome = if connected {
                send_connected_when_writable(&socket, &payload).await
            } else {
                send_when_writable(&socket, &payload, target).await
            };
            let Some(event) = token.resolve(outcome) else {
                return;
            };
            if completions.send(event).is_err() {
                tracing::debug!(sequence, "egress path gone before completion delivery");
            }
        });
    }
}

impl DatagramSink for UdpEgressSocket {
    fn send(&mut self, datagram: Datagram<'_>, token: CompletionToken) -> SendOutcome {
        let target = datagram.peer.socket_addr();
        if datagram.options.traffic_class().is_some() || datagram.options.release_delay().is_some() {
            tracing::trace!(options = ?datagram.options, %target, "per-packet options not applied");
        }
        if let Some(connected) = self.connected_peer
            && connected != target
        {
            return SendOutcome::Failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("egress socket is connected to {connected}, not {target}"),
            ));
        }
        match self.send_now(datagram.payload, target) {
            Ok(written) => SendOutcome::Sent(written),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                self.defer(Bytes::copy_from_slice(datagram.payload), target, token);
                SendOutcome::Pending
            }
            Err(err) => SendOutcome::Failed(err),
        }
    }
}

/// 等待套接字可写后发送，直到成功或遇到非 `WouldBlock` 错误。
pub(crate) async fn send_when_writable(
    socket: &UdpSocket,
    payload: &[u8],
    target: SocketAddr,
) -> io::Result<usize> {
    loop {
        socket.writable().await?;
        match socket.try_send_to(payload, target) {
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            other => return other,
        }
    }
}

/// 已连接套接字的等待发送版本。
pub(crate) async fn send_connected_when_writable(socket: &UdpSocket, payload: &[u8]) -> io::Result<usize> {
    loop {
        socket.writable().await?;
        match socket.try_send(payload) {
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            other => return other,
        }
    }
}
