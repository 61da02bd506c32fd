//! 写路径事件计数。
//!
//! 写入器与调度方只把事件“投递”给注入的 [`WriteMetrics`]，不读取返回值，也不因记录失败
//! 而改变控制流。直方图节流、上报周期等策略属于外部记录器。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::result::WriteError;

/// 写路径指标接收端。
pub trait WriteMetrics: Send + Sync {
    /// 记录一次写失败（同步或异步）。
    fn record_write_error(&self, error: &WriteError);

    /// 记录一次进入背压。
    fn record_write_blocked(&self) {}
}

/// 丢弃所有事件。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl WriteMetrics for NoopMetrics {
    fn record_write_error(&self, _error: &WriteError) {}
}

/// 以 `tracing` 事件形式输出，交由订阅方聚合。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingMetrics;

impl WriteMetrics for TracingMetrics {
    fn record_write_error(&self, error: &WriteError) {
        tracing::info!(
            target: "spark.egress.metrics",
            code = error.code(),
            %error,
            "write error recorded"
        );
    }

    fn record_write_blocked(&self) {
        tracing::trace!(target: "spark.egress.metrics", "write blocked recorded");
    }
}

/// 进程内计数器，按错误码聚合。
#[derive(Debug, Default)]
pub struct CountingMetrics {
    blocked: AtomicU64,
    errors: Mutex<BTreeMap<&'static str, u64>>,
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// 指定错误码的累计次数。
    pub fn errors_for(&self, code: &str) -> u64 {
        self.errors.lock().get(code).copied().unwrap_or(0)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.lock().values().sum()
    }
}

impl WriteMetrics for CountingMetrics {
    fn record_write_error(&self, error: &WriteError) {
        *self.errors.lock().entry(error.code()).or_insert(0) += 1;
    }

    fn record_write_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }
}
