//! 输出采样格式定义.
//!
//! 解码器内部统一输出 32 位浮点平面数据, 交错与格式转换由调用方完成.
//! 这里定义调用方可选的交错输出格式及其转换规则.

use std::fmt;
use std::str::FromStr;

use crate::error::QinError;

/// 交错输出采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// 有符号 16 位整数, 交错
    #[default]
    S16,
    /// 32 位浮点, 交错
    F32,
}

impl SampleFormat {
    /// 每个采样点占用的字节数
    pub const fn bytes_per_sample(&self) -> u32 {
        match self {
            Self::S16 => 2,
            Self::F32 => 4,
        }
    }

    /// 是否为浮点格式
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F32)
    }

    /// 将 [-1.0, 1.0] 浮点采样按小端序写入 `out`
    ///
    /// 超出范围的值在整数格式下饱和截断.
    pub fn write_sample(&self, sample: f32, out: &mut Vec<u8>) {
        match self {
            Self::S16 => {
                let scaled = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
                out.extend_from_slice(&scaled.to_le_bytes());
            }
            Self::F32 => out.extend_from_slice(&sample.to_le_bytes()),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::S16 => "s16",
            Self::F32 => "f32",
        };
        write!(f, "{name}")
    }
}

impl FromStr for SampleFormat {
    type Err = QinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s16" | "s16le" => Ok(Self::S16),
            "f32" | "f32le" | "flt" => Ok(Self::F32),
            other => Err(QinError::InvalidArgument(format!(
                "不支持的输出采样格式: {other}"
            ))),
        }
    }
}
