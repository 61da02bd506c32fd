use crate::sink::DatagramSink;
use crate::writer::PacketWriter;

/// 写入器到调度方的唯一回调：“现在可以继续写了”。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 调度方在背压期间排队报文，收到该通知后立即排空队列；通知携带 `&mut PacketWriter`，
///   因此后续写入直接复用同一借用，不需要任何共享可变状态或回调重入。
///
/// ## 契约（What）
/// - 每次完成事件恰好调用一次，且发生在写入器把控制权交还给完成源之前；
/// - 调度方可在其中发起零个或多个写入，写入器照常执行单挂起回调约束：
///   若某次写入返回 `Blocked`，其后的写入会得到 `WriteError::WriteBlocked`。
pub trait WriteDispatcher<S: DatagramSink> {
    fn on_can_write(&mut self, writer: &mut PacketWriter<S>);
}

impl<S, F> WriteDispatcher<S> for F
where
    S: DatagramSink,
    F: FnMut(&mut PacketWriter<S>),
{
    fn on_can_write(&mut self, writer: &mut PacketWriter<S>) {
        self(writer)
    }
}
