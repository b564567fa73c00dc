//! WAV (RIFF WAVE) 输出.
//!
//! 写入流程:
//! 1. `WavWriter::new()` - 写入 RIFF 和 fmt 块, data 块大小先填 0
//! 2. `write_frame()` - 交错并转换采样后追加到 data 块
//! 3. `finalize()` - 回填 RIFF 大小和 data 块大小

use std::io::{Seek, SeekFrom, Write};

use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, WriteBytesExt};
use qin_codec::AudioFrame;
use qin_core::SampleFormat;
use tracing::debug;

/// WAV 音频格式码: PCM 整数
const WAV_FORMAT_PCM: u16 = 0x0001;
/// WAV 音频格式码: IEEE 浮点
const WAV_FORMAT_IEEE_FLOAT: u16 = 0x0003;

/// RIFF 大小字段偏移
const RIFF_SIZE_OFFSET: u64 = 4;
/// data 块大小字段偏移: 12 (RIFF) + 24 (fmt) + 4 (data tag)
const DATA_SIZE_OFFSET: u64 = 40;

pub struct WavWriter<W: Write + Seek> {
    inner: W,
    format: SampleFormat,
    channels: u8,
    data_written: u64,
    buf: Vec<u8>,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut inner: W, channels: u8, sample_rate: u32, format: SampleFormat) -> Result<Self> {
        if channels == 0 {
            bail!("WAV 声道数不能为 0");
        }
        let audio_format = if format.is_float() {
            WAV_FORMAT_IEEE_FLOAT
        } else {
            WAV_FORMAT_PCM
        };
        let bytes_per_sample = format.bytes_per_sample() as u16;
        let block_align = u16::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(block_align);

        inner.write_all(b"RIFF")?;
        inner.write_u32::<LittleEndian>(0)?;
        inner.write_all(b"WAVE")?;

        inner.write_all(b"fmt ")?;
        inner.write_u32::<LittleEndian>(16)?;
        inner.write_u16::<LittleEndian>(audio_format)?;
        inner.write_u16::<LittleEndian>(u16::from(channels))?;
        inner.write_u32::<LittleEndian>(sample_rate)?;
        inner.write_u32::<LittleEndian>(byte_rate)?;
        inner.write_u16::<LittleEndian>(block_align)?;
        inner.write_u16::<LittleEndian>(bytes_per_sample * 8)?;

        inner.write_all(b"data")?;
        inner.write_u32::<LittleEndian>(0)?;

        debug!(
            "WAV 写入头部: {} Hz, {} 声道, {}",
            sample_rate, channels, format
        );
        Ok(Self {
            inner,
            format,
            channels,
            data_written: 0,
            buf: Vec::new(),
        })
    }

    /// 追加一帧, 帧声道数必须与头部一致
    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if frame.channels != self.channels {
            bail!(
                "帧声道数与 WAV 头不一致: 帧 {}, 头 {}",
                frame.channels,
                self.channels
            );
        }
        self.buf.clear();
        for sample in frame.interleaved() {
            self.format.write_sample(sample, &mut self.buf);
        }
        self.inner.write_all(&self.buf)?;
        self.data_written += self.buf.len() as u64;
        Ok(())
    }

    /// 已写入的 data 字节数
    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    /// 回填大小字段, 交还底层写入端
    pub fn finalize(mut self) -> Result<W> {
        let data_size =
            u32::try_from(self.data_written).context("WAV data 块超过 4 GiB")?;
        let riff_size = data_size
            .checked_add(36)
            .context("WAV 文件超过 4 GiB")?;

        self.inner.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        self.inner.write_u32::<LittleEndian>(riff_size)?;
        self.inner.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        self.inner.write_u32::<LittleEndian>(data_size)?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;

        debug!("WAV 写入尾部: riff_size={}, data_size={}", riff_size, data_size);
        Ok(self.inner)
    }
}
