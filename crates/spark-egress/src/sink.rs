//! 套接字抽象：写入器向平台层提交数据报的唯一出口。
//!
//! # 模块定位（Why）
//! - 写入器只关心“同步完成 / 挂起等待 / 同步失败”三种结果，不关心底层是 Tokio、
//!   io_uring 还是测试桩；本模块把这条边界收敛为 [`DatagramSink`] trait。
//! - 异步完成需要跨越写入器的生命周期：平台层可能在写入器销毁后才拿到内核的完成信号。
//!   [`CompletionToken`] 以可撤销句柄表达这一关系，写入器销毁即撤销，迟到的完成被丢弃。
//!
//! # 契约（What）
//! - `DatagramSink::send` 返回 [`SendOutcome::Pending`] 时，平台层必须复制或持有报文，
//!   并在容量恢复后**恰好一次**调用 [`CompletionToken::resolve`]，把得到的
//!   [`WriteCompletionEvent`] 送回写入器所在的线程/任务；
//! - 返回 `Sent`/`Failed` 时令牌直接丢弃即可，不会产生任何通知。

use std::io;
use std::net::IpAddr;
use std::sync::{Arc, Weak};

use crate::addr::PeerAddress;
use crate::options::PerPacketOptions;
use crate::result::{WriteError, WriteResult};

/// 一次待发送的数据报视图。
#[derive(Clone, Copy, Debug)]
pub struct Datagram<'a> {
    pub payload: &'a [u8],
    /// 期望的本端源地址；单套接字实现通常只用于诊断。
    pub self_ip: IpAddr,
    pub peer: PeerAddress,
    pub options: PerPacketOptions,
}

/// 平台层对一次发送尝试的即时答复。
#[derive(Debug)]
pub enum SendOutcome {
    /// 内核已同步接受全部字节。
    Sent(usize),
    /// 发送缓冲已满，报文已由平台层接管，完成结果稍后经令牌送回。
    Pending,
    /// 同步失败。
    Failed(io::Error),
}

/// 发送能力。
///
/// 由写入器独占持有；所有方法都在写入器所属的 IO 线程上调用。
pub trait DatagramSink {
    /// 尝试立即发送一个数据报。
    fn send(&mut self, datagram: Datagram<'_>, token: CompletionToken) -> SendOutcome;

    /// 背压期间提交的数据是否由平台层缓冲。
    fn buffers_blocked_writes(&self) -> bool {
        true
    }
}

impl<S: DatagramSink + ?Sized> DatagramSink for Box<S> {
    fn send(&mut self, datagram: Datagram<'_>, token: CompletionToken) -> SendOutcome {
        (**self).send(datagram, token)
    }

    fn buffers_blocked_writes(&self) -> bool {
        (**self).buffers_blocked_writes()
    }
}

/// 写入器存活期间持有的租约，令牌只保存其弱引用。
#[derive(Debug)]
pub(crate) struct WriterLease;

/// 可撤销的完成句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 平台层的异步完成可能晚于写入器销毁；若直接持有写入器引用，要么延长其生命周期，
///   要么访问已释放的状态。令牌只保存写入器租约的 `Weak`，写入器关闭或析构后
///   `resolve` 自动返回 `None`。
///
/// ## 契约（What）
/// - 每个令牌携带发送序号 `sequence`，写入器据此把完成结果匹配回对应的回调；
/// - `resolve` 消耗令牌，保证同一次挂起操作最多产生一个完成事件；
/// - 令牌可跨线程移动（`Send + Sync`），但事件必须回到写入器所在任务处理。
#[derive(Debug)]
pub struct CompletionToken {
    sequence: u64,
    lease: Weak<WriterLease>,
}

impl CompletionToken {
    pub(crate) fn new(sequence: u64, lease: &Arc<WriterLease>) -> Self {
        Self {
            sequence,
            lease: Arc::downgrade(lease),
        }
    }

    /// 发送序号。
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// 写入器是否已经关闭或销毁。
    pub fn is_revoked(&self) -> bool {
        self.lease.strong_count() == 0
    }

    /// 把平台层的最终发送结果转换为完成事件。
    ///
    /// 写入器已撤销租约时返回 `None`，调用方应直接丢弃结果。
    pub fn resolve(self, outcome: io::Result<usize>) -> Option<WriteCompletionEvent> {
        if self.is_revoked() {
            tracing::debug!(
                sequence = self.sequence,
                "dropping completion for a closed packet writer"
            );
            return None;
        }
        Some(WriteCompletionEvent {
            sequence: self.sequence,
            outcome: outcome.map_err(|err| WriteError::from_io(&err)),
        })
    }
}

/// 异步发送的完成事件，由平台层投递回写入器所在任务。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteCompletionEvent {
    sequence: u64,
    outcome: Result<usize, WriteError>,
}

impl WriteCompletionEvent {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn outcome(&self) -> &Result<usize, WriteError> {
        &self.outcome
    }

    /// 翻译为交给回调的 [`WriteResult`]。
    pub fn to_write_result(&self) -> WriteResult {
        WriteResult::from(self.outcome.clone())
    }
}
