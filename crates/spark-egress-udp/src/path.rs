use std::net::SocketAddr;
use std::sync::Arc;

use spark_egress::{
    DatagramSink, PacketWriter, PeerAddress, WriteCompletionEvent, WriteDispatcher, WriteMetrics,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::UdpEgressConfig;
use crate::error::UdpError;
use crate::socket::UdpEgressSocket;

/// 出站路径：一个写入器加上它的完成队列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 写入器的全部状态转换必须在同一任务上发生；平台层的后台重试只负责把完成事件放进队列，
///   由持有本结构的任务取出并交回写入器。
///
/// ## 契约（What）
/// - [`EgressPath::drive_once`]：等待下一个完成事件并执行两阶段完成，队列关闭时返回 `false`；
/// - [`EgressPath::drain_ready`]：不等待，处理队列中已到达的全部事件；
/// - [`EgressPath::close`]：关闭写入器并关闭队列，迟到事件不会触发回调。
///
/// ## 注意事项（Trade-offs）
/// - 平台层持有队列发送端，写入器存活期间队列不会自然关闭；没有在途写入时 `drive_once`
///   会一直等待，调用方通常把它放进 `tokio::select!` 与其他事件源一起轮询。
pub struct EgressPath<S = UdpEgressSocket> {
    writer: PacketWriter<S>,
    completions: mpsc::UnboundedReceiver<WriteCompletionEvent>,
}

impl EgressPath<UdpEgressSocket> {
    /// 按配置绑定主出站路径。
    pub fn bind(config: &UdpEgressConfig, metrics: Arc<dyn WriteMetrics>) -> Result<Self, UdpError> {
        config.validate()?;
        let (socket, completions) = UdpEgressSocket::bind(config)?;
        Ok(Self::from_parts(
            PacketWriter::with_config(socket, config.writer.clone(), metrics),
            completions,
        ))
    }

    /// 为迁移后的连接打开专用路径：绑定新端口并连接到 `peer`。
    pub(crate) fn dedicated(
        config: &UdpEgressConfig,
        peer: PeerAddress,
        metrics: Arc<dyn WriteMetrics>,
        runtime: Handle,
    ) -> Result<Self, UdpError> {
        let local = config.dedicated_bind_addr(peer.family());
        let (socket, completions) =
            UdpEgressSocket::open(config, local, Some(peer.socket_addr()), runtime)?;
        Ok(Self::from_parts(
            PacketWriter::with_config(socket, config.writer.clone(), metrics),
            completions,
        ))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, UdpError> {
        self.writer.sink().local_addr()
    }
}

impl<S: DatagramSink> EgressPath<S> {
    pub fn from_parts(
        writer: PacketWriter<S>,
        completions: mpsc::UnboundedReceiver<WriteCompletionEvent>,
    ) -> Self {
        Self {
            writer,
            completions,
        }
    }

    pub fn writer(&self) -> &PacketWriter<S> {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut PacketWriter<S> {
        &mut self.writer
    }

    /// 等待下一个完成事件并交给写入器处理。
    pub async fn drive_once<D>(&mut self, dispatcher: &mut D) -> bool
    where
        D: WriteDispatcher<S> + ?Sized,
    {
        match self.completions.recv().await {
            Some(event) => {
                self.writer.on_write_complete(event, dispatcher);
                true
            }
            None => false,
        }
    }

    /// 处理已到达的完成事件，返回处理数量。
    pub fn drain_ready<D>(&mut self, dispatcher: &mut D) -> usize
    where
        D: WriteDispatcher<S> + ?Sized,
    {
        let mut handled = 0;
        while let Ok(event) = self.completions.try_recv() {
            self.writer.on_write_complete(event, dispatcher);
            handled += 1;
        }
        handled
    }

    /// 没有背压也没有挂起回调：路径上的写入都已完成，可以安全关闭。
    pub fn is_drained(&self) -> bool {
        !self.writer.is_write_blocked() && !self.writer.has_pending_callback()
    }

    pub fn close(&mut self) {
        self.writer.close();
        self.completions.close();
    }
}

impl<S> std::fmt::Debug for EgressPath<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressPath")
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}
