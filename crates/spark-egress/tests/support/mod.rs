//! 集成测试共享的脚本化发送桩。

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;

use spark_egress::{CompletionToken, Datagram, DatagramSink, PeerAddress, SendOutcome};

/// 发送桩对单次发送的预设答复。
#[derive(Clone, Copy, Debug)]
pub enum Reply {
    Sent,
    Pending,
    Fail(io::ErrorKind),
}

/// 按脚本答复的发送桩；脚本耗尽后默认同步成功。
#[derive(Default)]
pub struct ScriptedSink {
    script: VecDeque<Reply>,
    pub parked: VecDeque<CompletionToken>,
    pub sent: Vec<(Vec<u8>, PeerAddress)>,
}

impl ScriptedSink {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, reply: Reply) {
        self.script.push_back(reply);
    }

    /// 丢弃尚未消费的脚本答复。
    pub fn clear_script(&mut self) {
        self.script.clear();
    }

    pub fn take_parked(&mut self) -> CompletionToken {
        self.parked.pop_front().expect("no parked completion token")
    }
}

impl DatagramSink for ScriptedSink {
    fn send(&mut self, datagram: Datagram<'_>, token: CompletionToken) -> SendOutcome {
        self.sent.push((datagram.payload.to_vec(), datagram.peer));
        match self.script.pop_front().unwrap_or(Reply::Sent) {
            Reply::Sent => SendOutcome::Sent(datagram.payload.len()),
            Reply::Pending => {
                self.parked.push_back(token);
                SendOutcome::Pending
            }
            Reply::Fail(kind) => SendOutcome::Failed(io::Error::from(kind)),
        }
    }
}

pub fn peer() -> PeerAddress {
    "10.0.0.1:4433".parse().expect("peer address")
}

pub fn self_ip() -> std::net::IpAddr {
    "10.0.0.254".parse().expect("self ip")
}
