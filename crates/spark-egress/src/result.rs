use std::io;

use thiserror::Error;

/// 一次写操作的状态标签，与 [`WriteResult`] 一一对应。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteStatus {
    Ok,
    Blocked,
    Error,
}

/// 写操作结果。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将“成功 / 背压 / 失败”三态显式建模，避免调用方通过负数返回码推断语义；
/// - `Blocked` 不是错误：它表示报文已经交由平台层排队，调用方只需等待完成通知。
///
/// ## 契约（What）
/// - `Ok(n)`：内核已接受 `n` 字节；
/// - `Blocked`：写路径进入背压，报文由平台层持有，**禁止**调用方重发同一缓冲；
/// - `Error(e)`：同步或异步失败，写入器不做任何自动重试。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteResult {
    Ok(usize),
    Blocked,
    Error(WriteError),
}

impl WriteResult {
    pub fn status(&self) -> WriteStatus {
        match self {
            WriteResult::Ok(_) => WriteStatus::Ok,
            WriteResult::Blocked => WriteStatus::Blocked,
            WriteResult::Error(_) => WriteStatus::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, WriteResult::Ok(_))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, WriteResult::Blocked)
    }

    /// 成功时返回写入字节数。
    pub fn bytes_written(&self) -> Option<usize> {
        match self {
            WriteResult::Ok(written) => Some(*written),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&WriteError> {
        match self {
            WriteResult::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Result<usize, WriteError>> for WriteResult {
    fn from(outcome: Result<usize, WriteError>) -> Self {
        match outcome {
            Ok(written) => WriteResult::Ok(written),
            Err(err) => WriteResult::Error(err),
        }
    }
}

/// 写路径错误分类。
///
/// # 契约（What）
/// - `MessageTooLarge`：调用方错误，同步返回，永不重试；
/// - `Io`：平台报告的发送失败，原样透传 `ErrorKind` 与系统错误码，由调度方决定重试、丢弃或断开；
/// - `WriteBlocked`：在背压期间再次提交写入，报文未被接受，调用方仍持有缓冲；
/// - `Closed`：写入器已被关闭。
///
/// 每个分支都有稳定错误码（[`WriteError::code`]），遵循 `spark.<域>.<语义>` 约定，
/// 适合作为指标标签。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WriteError {
    /// 报文超过当前地址族允许的上限。
    #[error("报文长度 {len} 超过写路径上限 {max}")]
    MessageTooLarge { len: usize, max: usize },
    /// 底层套接字发送失败。
    #[error("发送 UDP 报文失败: {kind} (os error {os_code:?})")]
    Io {
        kind: io::ErrorKind,
        os_code: Option<i32>,
    },
    /// 写路径处于背压状态，拒绝新的写入。
    #[error("写路径处于背压状态，需等待完成通知后再写入")]
    WriteBlocked,
    /// 写入器已关闭。
    #[error("写入器已关闭")]
    Closed,
}

impl WriteError {
    /// 从 IO 错误提取可克隆的描述。
    pub fn from_io(error: &io::Error) -> Self {
        WriteError::Io {
            kind: error.kind(),
            os_code: error.raw_os_error(),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            WriteError::MessageTooLarge { .. } => "spark.egress.message_too_large",
            WriteError::Io { .. } => "spark.egress.io_failed",
            WriteError::WriteBlocked => "spark.egress.write_blocked",
            WriteError::Closed => "spark.egress.closed",
        }
    }
}

impl From<io::Error> for WriteError {
    fn from(error: io::Error) -> Self {
        WriteError::from_io(&error)
    }
}
