use std::time::Duration;

/// 逐包发送指令。
///
/// 写入器不解释其中任何字段，只负责原样转交给 [`DatagramSink`](crate::DatagramSink)；
/// 平台层按自身能力决定是否落实（例如 DSCP/ECN 标记、节拍发送）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerPacketOptions {
    traffic_class: Option<u8>,
    release_delay: Option<Duration>,
}

impl PerPacketOptions {
    /// 设置流量类别（IPv4 TOS / IPv6 Traffic Class）。
    pub fn with_traffic_class(mut self, traffic_class: u8) -> Self {
        self.traffic_class = Some(traffic_class);
        self
    }

    /// 设置期望的延迟发送时间，供支持节拍发送的平台层使用。
    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = Some(delay);
        self
    }

    pub fn traffic_class(&self) -> Option<u8> {
        self.traffic_class
    }

    pub fn release_delay(&self) -> Option<Duration> {
        self.release_delay
    }
}
