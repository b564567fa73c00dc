//! 解码器 trait 定义.

use qin_core::QinResult;

use crate::frame::AudioFrame;
use crate::packet::Packet;

/// 解码器 trait
///
/// 解码流程:
/// 1. 调用 `send_packet()` 送入压缩数据
/// 2. 调用 `receive_frame()` 取出解码后的帧
/// 3. 重复以上步骤直到所有数据处理完毕
/// 4. 送入空包 (flush) 后继续取帧, 直到返回 `Eof`
pub trait Decoder: Send {
    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 送入一个压缩数据包进行解码
    ///
    /// # 返回
    /// - `Ok(())`: 数据包已接受
    /// - `Err(e)` 且 `e.is_packet_fatal()`: 该包损坏, 已丢弃, 可继续送入后续包
    /// - 其他错误: 整条流无法继续解码
    fn send_packet(&mut self, packet: &Packet) -> QinResult<()>;

    /// 从解码器取出一帧解码数据
    ///
    /// # 返回
    /// - `Ok(frame)`: 成功取出一帧
    /// - `Err(QinError::NeedMoreData)`: 需要送入更多数据包
    /// - `Err(QinError::Eof)`: 已 flush 且所有帧已取出
    fn receive_frame(&mut self) -> QinResult<AudioFrame>;

    /// 刷新解码器, 丢弃缓存帧与跨包状态
    ///
    /// 之后的第一个音频包视为流中断后的首包.
    fn flush(&mut self);
}
