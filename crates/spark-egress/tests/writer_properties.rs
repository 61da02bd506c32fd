//! 写入器状态机性质验证。
//!
//! - **核心目标 (Why)**：以随机操作序列驱动 `PacketWriter`，并与影子模型逐步比对，验证
//!   1. 回调至多触发一次，且当其完成先于关闭到达时恰好触发一次；
//!   2. `is_write_blocked` 与 `has_pending_callback` 始终与模型一致；
//!   3. 每个被接受的完成事件都让调度方恰好收到一次通知。
//! - **设计手法 (How)**：`Op` 描述调度方可能的动作；模型记录当前代表背压的在途写入、
//!   挂起回调归属与所有尚未完成的令牌。已有挂起回调时跳过 `WriteWithCallback`，
//!   因为那属于契约违背（由 `writer_contract.rs` 单独覆盖 panic 行为）。

mod support;

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use spark_egress::{CompletionToken, PacketWriter, PerPacketOptions, WriteResult};
use support::{Reply, ScriptedSink, peer, self_ip};

#[derive(Clone, Debug)]
enum Op {
    Write {
        len: usize,
        reply: Reply,
        with_callback: bool,
    },
    CompleteOldest {
        ok: bool,
    },
    SetWritable,
    Close,
}

fn reply() -> impl Strategy<Value = Reply> {
    prop_oneof![
        3 => Just(Reply::Sent),
        3 => Just(Reply::Pending),
        1 => Just(Reply::Fail(io::ErrorKind::ConnectionRefused)),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (1usize..1600, reply(), any::<bool>()).prop_map(|(len, reply, with_callback)| Op::Write {
            len,
            reply,
            with_callback,
        }),
        4 => any::<bool>().prop_map(|ok| Op::CompleteOldest { ok }),
        1 => Just(Op::SetWritable),
        1 => Just(Op::Close),
    ]
}

/// 尚未完成的挂起写入。
struct Parked {
    id: u32,
    token: CompletionToken,
    has_callback: bool,
}

#[derive(Default)]
struct Model {
    blocked_by: Option<u32>,
    pending_callback: Option<u32>,
    closed: bool,
    expected_fired: BTreeMap<u32, usize>,
}

proptest! {
    #[test]
    fn writer_matches_shadow_model(ops in prop::collection::vec(op(), 1..64)) {
        let mut writer = PacketWriter::new(ScriptedSink::new([]));
        let fired: Arc<Mutex<BTreeMap<u32, usize>>> = Arc::default();
        let mut parked: Vec<Parked> = Vec::new();
        let mut model = Model::default();
        let mut next_id = 0u32;
        let max = writer.max_packet_size(peer());

        for op in ops {
            match op {
                Op::Write { with_callback: true, .. } if model.pending_callback.is_some() => {}
                Op::Write { len, reply, with_callback } => {
                    let id = next_id;
                    next_id += 1;
                    writer.sink_mut().push(reply);
                    let payload = vec![0u8; len];
                    let result = if with_callback {
                        let fired = Arc::clone(&fired);
                        writer.write_packet_with_callback(
                            &payload,
                            self_ip(),
                            peer(),
                            PerPacketOptions::default(),
                            Box::new(move |_| {
                                *fired.lock().expect("fired").entry(id).or_insert(0) += 1;
                            }),
                        )
                    } else {
                        writer.write_packet(&payload, self_ip(), peer(), PerPacketOptions::default())
                    };

                    if model.closed || model.blocked_by.is_some() || len > max {
                        prop_assert!(matches!(result, WriteResult::Error(_)));
                        writer.sink_mut().clear_script();
                        continue;
                    }
                    match reply {
                        Reply::Sent => prop_assert_eq!(result, WriteResult::Ok(len)),
                        Reply::Fail(_) => prop_assert!(matches!(result, WriteResult::Error(_))),
                        Reply::Pending => {
                            prop_assert_eq!(result, WriteResult::Blocked);
                            model.blocked_by = Some(id);
                            if with_callback {
                                model.pending_callback = Some(id);
                            }
                            parked.push(Parked {
                                id,
                                token: writer.sink_mut().take_parked(),
                                has_callback: with_callback,
                            });
                        }
                    }
                }
                Op::CompleteOldest { ok } => {
                    if parked.is_empty() {
                        continue;
                    }
                    let Parked { id, token, has_callback } = parked.remove(0);
                    let outcome = if ok {
                        Ok(3)
                    } else {
                        Err(io::Error::from(io::ErrorKind::HostUnreachable))
                    };
                    match token.resolve(outcome) {
                        None => prop_assert!(model.closed),
                        Some(event) => {
                            prop_assert!(!model.closed);
                            let mut notified = 0;
                            writer.on_write_complete(
                                event,
                                &mut |_: &mut PacketWriter<ScriptedSink>| notified += 1,
                            );
                            prop_assert_eq!(notified, 1);
                            if model.blocked_by == Some(id) {
                                model.blocked_by = None;
                            }
                            if has_callback {
                                model.expected_fired.insert(id, 1);
                                model.pending_callback = None;
                            }
                        }
                    }
                }
                Op::SetWritable => {
                    writer.set_writable();
                    model.blocked_by = None;
                }
                Op::Close => {
                    writer.close();
                    model.closed = true;
                    model.blocked_by = None;
                    model.pending_callback = None;
                }
            }

            prop_assert_eq!(writer.is_write_blocked(), model.blocked_by.is_some());
            prop_assert_eq!(writer.has_pending_callback(), model.pending_callback.is_some());
        }

        let fired = fired.lock().expect("fired");
        prop_assert_eq!(&*fired, &model.expected_fired);
    }
}
