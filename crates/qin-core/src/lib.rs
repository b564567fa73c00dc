//! # qin-core
//!
//! Qin 音频解码框架核心库, 提供错误类型、校验和与输出采样格式.

pub mod crc;
pub mod error;
pub mod sample_format;

// 重导出常用类型
pub use error::{QinError, QinResult};
pub use sample_format::SampleFormat;
