//! 压缩数据包 (Packet).
//!
//! 由容器层 (Ogg) 读出的一个完整 Vorbis 包, 送入解码器进行解码.

use bytes::Bytes;

/// 压缩数据包
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 所属逻辑流的序列号
    pub serial: u32,
    /// 是否为流的最后一个包
    pub end_of_stream: bool,
    /// 容器层在本包之前丢失过数据 (页面序号跳变、孤立的续包数据等)
    pub discontinuity: bool,
}

impl Packet {
    /// 创建空数据包 (flush 信号)
    pub fn empty() -> Self {
        Self::default()
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包 (flush packet)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_空包与数据包() {
        let flush = Packet::empty();
        assert!(flush.is_empty());
        assert!(!flush.discontinuity);

        let packet = Packet::from_data(vec![1u8, 2, 3]);
        assert_eq!(packet.size(), 3);
        assert!(!packet.is_empty());
        assert_eq!(packet.serial, 0);
    }
}
