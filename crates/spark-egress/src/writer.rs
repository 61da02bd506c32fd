use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::addr::PeerAddress;
use crate::config::WriterConfig;
use crate::dispatcher::WriteDispatcher;
use crate::metrics::{NoopMetrics, WriteMetrics};
use crate::options::PerPacketOptions;
use crate::result::{WriteError, WriteResult};
use crate::sink::{CompletionToken, Datagram, DatagramSink, SendOutcome, WriteCompletionEvent, WriterLease};

/// 一次性完成回调。
pub type WriteCallback = Box<dyn FnOnce(WriteResult) + Send + 'static>;

/// 挂起回调与其所属发送序号。
struct PendingWrite {
    sequence: u64,
    callback: WriteCallback,
}

/// 单占位槽：同一时刻最多保存一个挂起回调。
///
/// 重复填充属于调用方的契约违背，直接 panic，而不是静默排队。
#[derive(Default)]
struct CompletionSlot {
    occupant: Option<PendingWrite>,
}

impl CompletionSlot {
    fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    fn fill(&mut self, sequence: u64, callback: WriteCallback) {
        assert!(
            self.occupant.is_none(),
            "packet writer already holds a pending completion callback"
        );
        self.occupant = Some(PendingWrite { sequence, callback });
    }

    /// 仅当序号匹配时取出回调。
    fn take_for(&mut self, sequence: u64) -> Option<WriteCallback> {
        match &self.occupant {
            Some(pending) if pending.sequence == sequence => {
                self.occupant.take().map(|pending| pending.callback)
            }
            _ => None,
        }
    }

    /// 丢弃回调而不调用，返回是否确有回调被丢弃。
    fn discard(&mut self) -> bool {
        self.occupant.take().is_some()
    }
}

/// 完成处理的第一阶段产物。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“清除背压 + 取出回调”与“执行回调 + 通知调度方”拆成两个阶段：写入器在第一阶段
///   只修改自身状态，回调与通知在第二阶段执行时写入器已处于一致状态，调度方发起的后续
///   写入不会看到半更新的标志位。
///
/// ## 契约（What）
/// - `run_callback` 消耗内部回调，多次调用只有第一次生效；
/// - `can_write` 为真表示调度方应收到一次 `on_can_write`；写入器关闭后为假。
#[must_use = "a completion must run its callback and notify the dispatcher"]
pub struct WriteCompletion {
    result: Option<WriteResult>,
    callback: Option<WriteCallback>,
    can_write: bool,
}

impl WriteCompletion {
    fn discarded() -> Self {
        Self {
            result: None,
            callback: None,
            can_write: false,
        }
    }

    /// 翻译后的完成结果；写入器已关闭时为 `None`。
    pub fn result(&self) -> Option<&WriteResult> {
        self.result.as_ref()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn can_write(&self) -> bool {
        self.can_write
    }

    /// 执行回调（若存在），返回是否真正执行。
    pub fn run_callback(&mut self) -> bool {
        match (self.callback.take(), self.result.as_ref()) {
            (Some(callback), Some(result)) => {
                callback(result.clone());
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for WriteCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteCompletion")
            .field("result", &self.result)
            .field("has_callback", &self.callback.is_some())
            .field("can_write", &self.can_write)
            .finish()
    }
}

/// 非阻塞数据报写入器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 作为服务端套接字的唯一出站口，跟踪内核级背压（write-blocked），并保证任一时刻至多一个
///   挂起的完成回调，使调度方无需自行维护在途计数。
/// - 异步完成通过 [`CompletionToken`] 回到写入器；写入器关闭后令牌失效，迟到的完成被丢弃。
///
/// ## 逻辑（How）
/// 1. `write_packet` 依次检查：是否已关闭、是否处于背压、报文是否超限；全部通过后分配发送序号、
///    签发令牌并交给 [`DatagramSink`]；
/// 2. 平台层返回 `Pending` 时置位 `write_blocked` 并记录在途序号；`write_packet_with_callback`
///    随后把回调与该序号一并放入单占位槽；
/// 3. 完成事件经 [`PacketWriter::complete`] 清除背压、按序号取出回调（第一阶段），再由
///    [`PacketWriter::on_write_complete`] 执行回调并通知调度方（第二阶段）。
///
/// ## 契约（What）
/// - 同步成功/失败：不保留回调，`write_blocked` 保持为假；
/// - `Blocked`：`write_blocked` 为真直至匹配的完成事件或 `set_writable`；
/// - 背压期间的写入返回 `Error(WriteBlocked)`，报文不会交给平台层；
/// - 已有挂起回调时再次调用 `write_packet_with_callback` 会 panic；
/// - 关闭或析构时挂起回调被丢弃、永不执行。
///
/// ## 注意事项（Trade-offs）
/// - `set_writable` 之后旧写入的完成仍会到达：它只执行属于自己的回调，并且不会清除之后新写入
///   造成的背压。
pub struct PacketWriter<S> {
    sink: S,
    config: WriterConfig,
    metrics: Arc<dyn WriteMetrics>,
    lease: Option<Arc<WriterLease>>,
    write_blocked: bool,
    in_flight: Option<u64>,
    next_sequence: u64,
    slot: CompletionSlot,
}

impl<S: DatagramSink> PacketWriter<S> {
    /// 使用默认配置与空指标构造写入器。
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, WriterConfig::default(), Arc::new(NoopMetrics))
    }

    pub fn with_config(sink: S, config: WriterConfig, metrics: Arc<dyn WriteMetrics>) -> Self {
        Self {
            sink,
            config,
            metrics,
            lease: Some(Arc::new(WriterLease)),
            write_blocked: false,
            in_flight: None,
            next_sequence: 0,
            slot: CompletionSlot::default(),
        }
    }

    /// 发送数据报并在背压时登记完成回调。
    ///
    /// # 前置条件
    /// - 不存在挂起回调，否则 panic。
    ///
    /// # 后置条件
    /// - 仅当返回 `Blocked` 时回调被保存；其余结果下回调被直接丢弃、不会执行。
    pub fn write_packet_with_callback(
        &mut self,
        buffer: &[u8],
        self_ip: IpAddr,
        peer: PeerAddress,
        options: PerPacketOptions,
        callback: WriteCallback,
    ) -> WriteResult {
        assert!(
            !self.slot.is_occupied(),
            "write_packet_with_callback called while a completion callback is pending"
        );
        let result = self.write_packet(buffer, self_ip, peer, options);
        if result.is_blocked()
            && let Some(sequence) = self.in_flight
        {
            self.slot.fill(sequence, callback);
        }
        result
    }

    /// 发送数据报，不登记完成回调。
    pub fn write_packet(
        &mut self,
        buffer: &[u8],
        self_ip: IpAddr,
        peer: PeerAddress,
        options: PerPacketOptions,
    ) -> WriteResult {
        let Some(lease) = self.lease.as_ref() else {
            return self.fail(WriteError::Closed);
        };
        if self.write_blocked {
            return self.fail(WriteError::WriteBlocked);
        }
        let max = self.max_packet_size(peer);
        if buffer.len() > max {
            return self.fail(WriteError::MessageTooLarge {
                len: buffer.len(),
                max,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let token = CompletionToken::new(sequence, lease);
        let datagram = Datagram {
            payload: buffer,
            self_ip,
            peer,
            options,
        };

        match self.sink.send(datagram, token) {
            SendOutcome::Sent(written) => {
                tracing::trace!(sequence, %peer, written, "datagram sent");
                WriteResult::Ok(written)
            }
            SendOutcome::Pending => {
                self.write_blocked = true;
                self.in_flight = Some(sequence);
                self.metrics.record_write_blocked();
                tracing::debug!(sequence, %peer, len = buffer.len(), "write blocked");
                WriteResult::Blocked
            }
            SendOutcome::Failed(err) => {
                tracing::warn!(sequence, %peer, error = %err, "datagram send failed");
                self.fail(WriteError::from_io(&err))
            }
        }
    }

    /// 完成处理第一阶段：更新状态并取出回调。
    pub fn complete(&mut self, event: WriteCompletionEvent) -> WriteCompletion {
        let sequence = event.sequence();
        if self.lease.is_none() {
            tracing::debug!(sequence, "completion after close discarded");
            return WriteCompletion::discarded();
        }

        if self.in_flight == Some(sequence) {
            self.in_flight = None;
            self.write_blocked = false;
        } else {
            tracing::debug!(
                sequence,
                in_flight = ?self.in_flight,
                "completion for a write superseded by set_writable"
            );
        }

        let result = event.to_write_result();
        if let WriteResult::Error(err) = &result {
            tracing::warn!(sequence, error = %err, "asynchronous write failed");
            self.metrics.record_write_error(err);
        }

        WriteCompletion {
            callback: self.slot.take_for(sequence),
            result: Some(result),
            can_write: true,
        }
    }

    /// 完成处理全流程：第一阶段后执行回调，再通知调度方。
    pub fn on_write_complete<D>(&mut self, event: WriteCompletionEvent, dispatcher: &mut D)
    where
        D: WriteDispatcher<S> + ?Sized,
    {
        let mut completion = self.complete(event);
        completion.run_callback();
        if completion.can_write() {
            dispatcher.on_can_write(self);
        }
    }

    pub fn is_write_blocked(&self) -> bool {
        self.write_blocked
    }

    /// 管理性清除背压标志，不触发挂起回调。
    pub fn set_writable(&mut self) {
        self.write_blocked = false;
        self.in_flight = None;
    }

    /// 背压期间提交的数据是否已由平台层缓冲。
    pub fn is_write_blocked_data_buffered(&self) -> bool {
        self.sink.buffers_blocked_writes()
    }

    /// 发往 `peer` 的单个数据报最大负载，仅取决于地址族。
    pub fn max_packet_size(&self, peer: PeerAddress) -> usize {
        self.config.max_packet_size_for(peer.family())
    }

    pub fn has_pending_callback(&self) -> bool {
        self.slot.is_occupied()
    }

    pub fn is_closed(&self) -> bool {
        self.lease.is_none()
    }

    /// 关闭写入器：丢弃挂起回调、撤销全部令牌，之后的写入返回 `Error(Closed)`。
    pub fn close(&mut self) {
        if self.lease.take().is_none() {
            return;
        }
        let discarded = self.slot.discard();
        self.write_blocked = false;
        self.in_flight = None;
        tracing::debug!(discarded_callback = discarded, "packet writer closed");
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn fail(&self, error: WriteError) -> WriteResult {
        self.metrics.record_write_error(&error);
        WriteResult::Error(error)
    }
}

impl<S> fmt::Debug for PacketWriter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketWriter")
            .field("write_blocked", &self.write_blocked)
            .field("in_flight", &self.in_flight)
            .field("pending_callback", &self.slot.is_occupied())
            .field("closed", &self.lease.is_none())
            .finish_non_exhaustive()
    }
}
