//! 统一错误类型定义.
//!
//! 所有 Qin crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Qin 框架统一错误类型
#[derive(Debug, Error)]
pub enum QinError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 编解码器错误
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// 容器格式错误
    #[error("格式错误: {0}")]
    Format(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 码流结构损坏 (标记位错误、索引越界等), 仅影响当前数据包
    #[error("码流损坏: {0}")]
    CorruptStream(String),

    /// 容器层页面校验和不匹配, 处理方式与 `CorruptStream` 相同
    #[error("校验和不匹配: 期望 0x{expected:08X}, 实际 0x{actual:08X}")]
    ChecksumMismatch {
        /// 页面中记录的校验值
        expected: u32,
        /// 重新计算得到的校验值
        actual: u32,
    },

    /// 配置错误 (声道数变化、流序列号不一致等), 对整条流致命
    #[error("配置错误: {0}")]
    Config(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl QinError {
    /// 是否只影响当前数据包
    ///
    /// 返回 true 时调用方可以丢弃该包继续解码 (解码器已重置重叠状态),
    /// 也可以选择终止整条流.
    pub fn is_packet_fatal(&self) -> bool {
        matches!(self, Self::CorruptStream(_) | Self::ChecksumMismatch { .. })
    }
}

/// Qin 框架统一 Result 类型
pub type QinResult<T> = Result<T, QinError>;
