use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::addr::AddressFamily;

/// QUIC 默认最大报文长度（1500 字节以太网 MTU 扣除 IPv6 + UDP 头部）。
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1452;
/// 默认路径 MTU。
pub const DEFAULT_PATH_MTU: usize = 1500;
/// IPv6 要求的最小链路 MTU，低于该值的配置视为无效。
pub const MIN_PATH_MTU: usize = 1280;

/// 写入器配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 报文上限既受协议约定（`max_packet_size`）约束，也受路径 MTU 与地址族头部开销约束；
///   两者取小，保证 `PacketWriter::max_packet_size` 对同一地址族恒定且无副作用。
///
/// ## 契约（What）
/// - `max_packet_size`：协议层允许的最大 UDP 负载，必须大于 0；
/// - `path_mtu`：出站链路 MTU，必须不小于 [`MIN_PATH_MTU`]；
/// - 通过 [`WriterConfig::from_toml_str`] 加载时会执行 [`WriterConfig::validate`]。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterConfig {
    pub max_packet_size: usize,
    pub path_mtu: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            path_mtu: DEFAULT_PATH_MTU,
        }
    }
}

impl WriterConfig {
    /// 从 TOML 文本加载并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn with_path_mtu(mut self, path_mtu: usize) -> Self {
        self.path_mtu = path_mtu;
        self
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_packet_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_packet_size",
                reason: "must be greater than zero".into(),
            });
        }
        if self.path_mtu < MIN_PATH_MTU {
            return Err(ConfigError::Invalid {
                field: "path_mtu",
                reason: format!("must be at least {MIN_PATH_MTU}"),
            });
        }
        Ok(())
    }

    /// 指定地址族下单个数据报允许的最大负载。
    pub fn max_packet_size_for(&self, family: AddressFamily) -> usize {
        let ceiling = self.path_mtu.saturating_sub(family.datagram_overhead());
        self.max_packet_size.min(ceiling)
    }
}

/// 配置加载错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 语法或类型错误。
    #[error("解析写路径配置失败: {0}")]
    Parse(#[from] toml::de::Error),
    /// 字段取值非法。
    #[error("写路径配置字段 `{field}` 非法: {reason}")]
    Invalid { field: &'static str, reason: String },
}
