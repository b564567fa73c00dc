//! Vorbis I 音频解码器.
//!
//! 三个头包 (identification/comment/setup) 依次解析后构建只读的流解码表,
//! 之后每个音频包经 `pipeline::decode_packet` 解码为各声道浮点 PCM.
//!
//! 错误处理:
//! - 损坏的音频包返回 `CorruptStream`, 本包不输出采样, 重叠状态被丢弃,
//!   下一个包按流中断后的首包处理 (只建立重叠状态, 不输出).
//! - 序列号不一致等配置错误返回 `Config`, 整条流无法继续.

mod bitreader;
mod codebook;
mod coupling;
mod floor;
mod floor0;
mod floor1;
mod headers;
mod imdct;
mod pipeline;
mod residue;
mod setup;
mod tables;
#[cfg(test)]
mod test_util;
mod window;

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};
use qin_core::{QinError, QinResult};

use crate::decoder::Decoder;
use crate::frame::AudioFrame;
use crate::packet::Packet;

use self::headers::{parse_comment_header, parse_identification_header};
use self::pipeline::{OverlapState, ScratchArena, decode_packet};
use self::setup::parse_setup_packet;
use self::tables::StreamTables;

pub use self::headers::{IdentificationHeader, VorbisComments};
pub use self::imdct::ImdctLookup;
pub use self::window::build_window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStage {
    Identification,
    Comment,
    Setup,
    Audio,
}

/// Vorbis 解码器
///
/// 每条逻辑流一个实例. 不同实例之间不共享可变状态, 可在不同线程中并行使用.
pub struct VorbisDecoder {
    stage: HeaderStage,
    flushing: bool,
    serial: Option<u32>,
    ident: Option<IdentificationHeader>,
    comments: Option<VorbisComments>,
    tables: Option<Arc<StreamTables>>,
    scratch: ScratchArena,
    overlap: Option<OverlapState>,
    pending: VecDeque<AudioFrame>,
}

impl Default for VorbisDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VorbisDecoder {
    /// 创建解码器, 等待 identification 头包
    pub fn new() -> Self {
        Self {
            stage: HeaderStage::Identification,
            flushing: false,
            serial: None,
            ident: None,
            comments: None,
            tables: None,
            scratch: ScratchArena::default(),
            overlap: None,
            pending: VecDeque::new(),
        }
    }

    /// 创建解码器 (工厂函数)
    pub fn create() -> QinResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new()))
    }

    /// identification 头包内容, 头包解析前为 `None`
    pub fn info(&self) -> Option<&IdentificationHeader> {
        self.ident.as_ref()
    }

    /// comment 头包内容
    pub fn comments(&self) -> Option<&VorbisComments> {
        self.comments.as_ref()
    }

    /// 三个头包是否均已解析
    pub fn headers_complete(&self) -> bool {
        self.stage == HeaderStage::Audio
    }

    /// 创建共享同一组解码表的新解码器.
    ///
    /// 新实例已越过头包阶段, 重叠状态为空, 适合对同一条流的不同片段并行解码.
    pub fn fork(&self) -> QinResult<Self> {
        let tables = self
            .tables
            .clone()
            .ok_or_else(|| QinError::Codec("Vorbis 头包尚未解析完成".into()))?;
        Ok(Self {
            stage: HeaderStage::Audio,
            flushing: false,
            serial: self.serial,
            ident: self.ident.clone(),
            comments: self.comments.clone(),
            scratch: ScratchArena::new(tables.channels(), tables.blocksize(true)),
            tables: Some(tables),
            overlap: None,
            pending: VecDeque::new(),
        })
    }

    fn handle_identification(&mut self, data: &[u8]) -> QinResult<()> {
        let ident = parse_identification_header(data)?;
        debug!(
            "Vorbis identification: channels={}, sample_rate={}, blocksize={}/{}",
            ident.channels, ident.sample_rate, ident.blocksize0, ident.blocksize1,
        );
        self.ident = Some(ident);
        self.stage = HeaderStage::Comment;
        Ok(())
    }

    fn handle_comment(&mut self, data: &[u8]) -> QinResult<()> {
        let comments = parse_comment_header(data)?;
        debug!(
            "Vorbis comment: vendor={}, {} 条注释",
            comments.vendor,
            comments.user_comments.len()
        );
        self.comments = Some(comments);
        self.stage = HeaderStage::Setup;
        Ok(())
    }

    fn handle_setup(&mut self, data: &[u8]) -> QinResult<()> {
        let ident = self
            .ident
            .clone()
            .ok_or_else(|| QinError::Internal("Vorbis setup 前缺少 identification 头".into()))?;
        let blocksizes = [
            usize::from(ident.blocksize0),
            usize::from(ident.blocksize1),
        ];
        let setup = parse_setup_packet(data, ident.channels, blocksizes)?;
        let tables = StreamTables::new(ident, setup)?;
        self.scratch = ScratchArena::new(tables.channels(), tables.blocksize(true));
        self.tables = Some(Arc::new(tables));
        self.overlap = None;
        self.stage = HeaderStage::Audio;
        Ok(())
    }

    fn handle_audio(&mut self, data: &[u8]) -> QinResult<()> {
        let tables = self
            .tables
            .as_ref()
            .ok_or_else(|| QinError::Internal("Vorbis 解码表未就绪".into()))?;

        let prev = self.overlap.take();
        let (samples, state) = match decode_packet(tables, data, prev, &mut self.scratch) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Vorbis 音频包解码失败, 重叠状态已重置: {}", e);
                return Err(e);
            }
        };
        self.overlap = Some(state);

        if samples.first().is_some_and(|ch| !ch.is_empty()) {
            self.pending
                .push_back(AudioFrame::new(samples, tables.ident.sample_rate));
        }
        Ok(())
    }
}

impl Decoder for VorbisDecoder {
    fn name(&self) -> &str {
        "vorbis"
    }

    fn send_packet(&mut self, packet: &Packet) -> QinResult<()> {
        if packet.is_empty() {
            self.flushing = true;
            return Ok(());
        }
        if self.flushing {
            return Err(QinError::Codec(
                "Vorbis 解码器已进入 flush 状态, 需先调用 flush()".into(),
            ));
        }

        match self.serial {
            None => self.serial = Some(packet.serial),
            Some(serial) if serial != packet.serial => {
                return Err(QinError::Config(format!(
                    "Vorbis 流序列号不一致: 期望 0x{:08X}, 实际 0x{:08X}",
                    serial, packet.serial
                )));
            }
            Some(_) => {}
        }

        if packet.discontinuity && self.overlap.take().is_some() {
            warn!("Vorbis 数据包不连续, 丢弃重叠状态");
        }

        let data = packet.data.as_ref();
        let result = match self.stage {
            HeaderStage::Identification => self.handle_identification(data),
            HeaderStage::Comment => self.handle_comment(data),
            HeaderStage::Setup => self.handle_setup(data),
            HeaderStage::Audio => self.handle_audio(data),
        };

        // 流结束后不再有新包, 剩余帧取完即返回 Eof
        if packet.end_of_stream {
            self.flushing = true;
        }
        result
    }

    fn receive_frame(&mut self) -> QinResult<AudioFrame> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        if self.flushing {
            return Err(QinError::Eof);
        }
        Err(QinError::NeedMoreData)
    }

    fn flush(&mut self) {
        self.flushing = false;
        self.pending.clear();
        self.overlap = None;
    }
}
