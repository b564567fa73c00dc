//! 单个数据包的 LSB 优先位读取器.
//!
//! 读取越过包尾时不报错, 缺失部分按 0 位返回. 音频包允许被读到名义内容之后
//! (尾部填充), 这一行为直接影响码字解析结果, 不可改为报错.

use qin_core::{QinError, QinResult};

pub(crate) struct LsbBitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> LsbBitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    pub(crate) fn read_flag(&mut self) -> bool {
        let bit = self.bit_at(self.bit_pos);
        self.bit_pos += 1;
        bit != 0
    }

    /// 读取 `n` (0..=32) 位, 低位在前.
    pub(crate) fn read_bits(&mut self, n: u8) -> QinResult<u32> {
        if n > 32 {
            return Err(QinError::InvalidArgument(format!(
                "Vorbis read_bits 位数非法: {}",
                n,
            )));
        }
        if n == 0 {
            return Ok(0);
        }

        let mut out = 0u64;
        let mut filled = 0u32;
        let mut pos = self.bit_pos;
        let end = self.bit_pos + n as usize;
        while pos < end {
            let byte_idx = pos / 8;
            let bit_off = pos % 8;
            let take = (8 - bit_off).min(end - pos);
            let byte = self.data.get(byte_idx).copied().unwrap_or(0);
            let chunk = (u64::from(byte) >> bit_off) & ((1u64 << take) - 1);
            out |= chunk << filled;
            filled += take as u32;
            pos += take;
        }
        self.bit_pos = end;
        Ok(out as u32)
    }

    /// 读取 `n` (0..=64) 位, 用于 floor0 振幅等超过 32 位的字段.
    pub(crate) fn read_bits_u64(&mut self, n: u8) -> QinResult<u64> {
        if n > 64 {
            return Err(QinError::InvalidArgument(format!(
                "Vorbis read_bits_u64 位数非法: {}",
                n,
            )));
        }
        let low_bits = n.min(32);
        let low = u64::from(self.read_bits(low_bits)?);
        let high = u64::from(self.read_bits(n - low_bits)?);
        Ok(low | (high << 32))
    }

    pub(crate) fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// 是否已越过包尾 (此后读出的均为填充的 0 位)
    #[cfg(test)]
    pub(crate) fn is_exhausted(&self) -> bool {
        self.bit_pos >= self.data.len().saturating_mul(8)
    }

    /// 是否读到了包尾之后. 头包不允许截断, setup 解析据此报错.
    pub(crate) fn is_overrun(&self) -> bool {
        self.bit_pos > self.data.len().saturating_mul(8)
    }

    pub(crate) fn remaining_bits(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    fn bit_at(&self, pos: usize) -> u8 {
        self.data
            .get(pos / 8)
            .map(|byte| (byte >> (pos % 8)) & 1)
            .unwrap_or(0)
    }
}

/// 表示 `v` 所需的位数 (ilog(0) = 0).
pub(crate) fn ilog(v: u32) -> u8 {
    if v == 0 {
        return 0;
    }
    (32 - v.leading_zeros()) as u8
}
