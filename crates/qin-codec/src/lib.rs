//! # qin-codec
//!
//! Qin 音频解码框架编解码器库, 提供 Packet/AudioFrame 抽象、解码器 trait
//! 以及纯 Rust 的 Vorbis I 解码器.
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use qin_codec::{Decoder, Packet, VorbisDecoder};
//!
//! let mut decoder = VorbisDecoder::new();
//! # let packets: Vec<Packet> = Vec::new();
//! for packet in &packets {
//!     decoder.send_packet(packet).unwrap();
//!     while let Ok(frame) = decoder.receive_frame() {
//!         println!("{} 个采样", frame.nb_samples);
//!     }
//! }
//! ```

pub mod decoder;
pub mod decoders;
pub mod frame;
pub mod packet;

// 重导出常用类型
pub use decoder::Decoder;
pub use decoders::vorbis::{IdentificationHeader, VorbisComments, VorbisDecoder};
pub use frame::AudioFrame;
pub use packet::Packet;
