//! # qin-format
//!
//! Qin 音频解码框架容器格式库, 从 Ogg 容器中读出完整的压缩数据包.

pub mod ogg;

// 重导出常用类型
pub use ogg::OggReader;

use qin_codec::Packet;
use qin_core::QinResult;

/// 数据包来源
///
/// 使用流程:
/// 1. 循环调用 `next_packet()` 读取数据包并送入解码器
/// 2. 返回 `Ok(None)` 表示没有更多数据包
/// 3. 返回 `is_packet_fatal()` 为 true 的错误时, 坏数据已被跳过, 可以继续读取
pub trait PacketSource {
    /// 读取下一个完整的数据包
    fn next_packet(&mut self) -> QinResult<Option<Packet>>;
}
