//! # Qin (琴)
//!
//! 纯 Rust 实现的 Ogg Vorbis 音频解码框架.
//!
//! - **容器**: Ogg 页面校验、跨页拼包、逻辑流锁定
//! - **解码**: Vorbis I (floor 0/1, residue 0/1/2, 声道耦合, IMDCT 重叠相加)
//! - **日志**: 控制台 + 按日滚动的文件日志
//!
//! # 快速开始
//!
//! ```rust,no_run
//! let mut frames = 0usize;
//! qin::decode_file("music.ogg", |frame| frames += frame.nb_samples as usize).unwrap();
//! println!("共 {frames} 个采样");
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `qin-core` | 错误类型、CRC、输出采样格式 |
//! | `qin-codec` | 解码器框架与 Vorbis 解码器 |
//! | `qin-format` | Ogg 容器读取 |

pub mod logging;

use std::io::Read;
use std::path::Path;

/// 核心类型与工具
pub use qin_core as core;

/// 编解码器框架
pub use qin_codec as codec;

/// 容器格式
pub use qin_format as format;

use qin_codec::{AudioFrame, Decoder, Packet, VorbisDecoder};
use qin_core::{QinError, QinResult};
use qin_format::{OggReader, PacketSource};

/// 获取 Qin 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 把 `source` 中的全部数据包送入 `decoder`, 每解出一帧调用一次 `on_frame`.
///
/// 任何错误都会终止解码; 需要跳过损坏包时应自行驱动解码循环.
pub fn decode_packets<S, F>(
    source: &mut S,
    decoder: &mut dyn Decoder,
    mut on_frame: F,
) -> QinResult<()>
where
    S: PacketSource + ?Sized,
    F: FnMut(AudioFrame),
{
    while let Some(packet) = source.next_packet()? {
        decoder.send_packet(&packet)?;
        drain_frames(decoder, &mut on_frame)?;
    }
    decoder.send_packet(&Packet::empty())?;
    drain_frames(decoder, &mut on_frame)
}

fn drain_frames<F: FnMut(AudioFrame)>(
    decoder: &mut dyn Decoder,
    on_frame: &mut F,
) -> QinResult<()> {
    loop {
        match decoder.receive_frame() {
            Ok(frame) => on_frame(frame),
            Err(QinError::NeedMoreData | QinError::Eof) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// 解码任意 Ogg Vorbis 输入
pub fn decode_reader<R: Read, F: FnMut(AudioFrame)>(
    reader: R,
    on_frame: F,
) -> QinResult<VorbisDecoder> {
    let mut source = OggReader::new(reader);
    let mut decoder = VorbisDecoder::new();
    decode_packets(&mut source, &mut decoder, on_frame)?;
    Ok(decoder)
}

/// 解码 Ogg Vorbis 文件, 返回解码器以便查询头信息
pub fn decode_file<F: FnMut(AudioFrame)>(
    path: impl AsRef<Path>,
    on_frame: F,
) -> QinResult<VorbisDecoder> {
    let file = std::fs::File::open(path)?;
    decode_reader(file, on_frame)
}
