//! Ogg 容器读取器.
//!
//! # Ogg 页面结构
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes
//! Num segments:    1 byte
//! Segment table:   N bytes (each 1 byte, packet sizes)
//! Page data:       sum(segment_table) bytes
//! ```
//!
//! 段表中连续的 255 段与其后第一个非 255 段组合成一个完整的 packet,
//! 以 255 结尾的页面表示 packet 延续到下一页.
//!
//! 读取器锁定遇到的第一条逻辑流, 其他序列号的页面直接跳过.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use log::{debug, warn};
use qin_codec::Packet;
use qin_core::crc::crc32_update;
use qin_core::{QinError, QinResult};

use crate::PacketSource;

/// Ogg 同步字 (capture pattern)
const OGG_SYNC: &[u8; 4] = b"OggS";

/// 页面头部标志
const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// 同步字之后的固定头长度
const PAGE_HEADER_REST: usize = 23;

/// 已解析的 Ogg 页面
#[derive(Debug)]
struct OggPage {
    header_type: u8,
    granule_position: i64,
    serial_number: u32,
    page_sequence: u32,
    segment_table: Vec<u8>,
    data: Vec<u8>,
}

impl OggPage {
    fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    fn is_eos(&self) -> bool {
        self.header_type & FLAG_EOS != 0
    }

    fn is_continued(&self) -> bool {
        self.header_type & FLAG_CONTINUED != 0
    }
}

/// Ogg 数据包读取器
pub struct OggReader<R: Read> {
    reader: BufReader<R>,
    /// 锁定的逻辑流序列号
    serial: Option<u32>,
    last_page_sequence: Option<u32>,
    last_granule: Option<u64>,
    /// 跨页面累积的不完整 packet
    partial_packet: Vec<u8>,
    /// 正在丢弃缺少起始片段的续包
    discarding_orphan_continued: bool,
    /// 下一个输出的 packet 需要标记 discontinuity
    pending_discontinuity: bool,
    packet_queue: VecDeque<Packet>,
    ended: bool,
    eof: bool,
    pages_read: u64,
    pages_skipped: u64,
}

impl OggReader<File> {
    /// 打开文件
    pub fn open(path: impl AsRef<Path>) -> QinResult<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> OggReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            serial: None,
            last_page_sequence: None,
            last_granule: None,
            partial_packet: Vec::new(),
            discarding_orphan_continued: false,
            pending_discontinuity: false,
            packet_queue: VecDeque::new(),
            ended: false,
            eof: false,
            pages_read: 0,
            pages_skipped: 0,
        }
    }

    /// 锁定的逻辑流序列号, 读到第一个页面之前为 `None`
    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    /// 锁定流最近一个带有效 granule 的页面位置 (Vorbis 中为累计采样数)
    pub fn granule_position(&self) -> Option<u64> {
        self.last_granule
    }

    /// 已读取的有效页面数与因序列号不符而跳过的页面数
    pub fn page_counts(&self) -> (u64, u64) {
        (self.pages_read, self.pages_skipped)
    }

    /// 搜索下一个同步字, 返回 false 表示输入已结束
    fn sync_to_page(&mut self) -> QinResult<bool> {
        let mut window = [0u8; 4];
        let mut filled = 0usize;
        let mut skipped = 0u64;
        loop {
            let byte = match self.reader.read_u8() {
                Ok(b) => b,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    if skipped > 0 || filled > 0 {
                        warn!("Ogg: 文件末尾有 {} 字节无法识别的数据", skipped + filled as u64);
                    }
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };
            if filled < 4 {
                window[filled] = byte;
                filled += 1;
            } else {
                window.rotate_left(1);
                window[3] = byte;
                skipped += 1;
            }
            if filled == 4 && &window == OGG_SYNC {
                if skipped > 0 {
                    warn!("Ogg: 跳过 {} 字节后重新同步", skipped);
                    if self.serial.is_some() {
                        self.pending_discontinuity = true;
                    }
                }
                return Ok(true);
            }
        }
    }

    /// 读取一个页面, 返回 `Ok(None)` 表示输入已结束 (包括末尾被截断的页面)
    fn read_page(&mut self) -> QinResult<Option<OggPage>> {
        if !self.sync_to_page()? {
            return Ok(None);
        }

        let mut header = [0u8; PAGE_HEADER_REST];
        if !self.read_or_truncated(&mut header)? {
            return Ok(None);
        }

        let mut fields = &header[..];
        let version = fields.read_u8()?;
        let header_type = fields.read_u8()?;
        let granule_position = fields.read_i64::<LittleEndian>()?;
        let serial_number = fields.read_u32::<LittleEndian>()?;
        let page_sequence = fields.read_u32::<LittleEndian>()?;
        let crc = fields.read_u32::<LittleEndian>()?;
        let num_segments = usize::from(fields.read_u8()?);

        if version != 0 {
            self.pending_discontinuity = true;
            return Err(QinError::CorruptStream(format!(
                "不支持的 Ogg 版本: {}",
                version,
            )));
        }

        let mut segment_table = vec![0u8; num_segments];
        if !self.read_or_truncated(&mut segment_table)? {
            return Ok(None);
        }
        let data_size: usize = segment_table.iter().map(|&s| usize::from(s)).sum();
        let mut data = vec![0u8; data_size];
        if !self.read_or_truncated(&mut data)? {
            return Ok(None);
        }

        // CRC 覆盖整个页面, 其中 CRC 字段本身按 0 参与计算
        let mut crc_header = header;
        crc_header[18..22].fill(0);
        let mut crc_calc = crc32_update(0, OGG_SYNC);
        crc_calc = crc32_update(crc_calc, &crc_header);
        crc_calc = crc32_update(crc_calc, &segment_table);
        crc_calc = crc32_update(crc_calc, &data);
        if crc != crc_calc {
            // 坏页已被完整消费, 跨越它的 packet 无法恢复
            self.partial_packet.clear();
            self.pending_discontinuity = true;
            return Err(QinError::ChecksumMismatch {
                expected: crc,
                actual: crc_calc,
            });
        }

        Ok(Some(OggPage {
            header_type,
            granule_position,
            serial_number,
            page_sequence,
            segment_table,
            data,
        }))
    }

    fn read_or_truncated(&mut self, buf: &mut [u8]) -> QinResult<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("Ogg: 最后一个页面被截断");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn process_page(&mut self, page: OggPage) {
        match self.serial {
            None => {
                if !page.is_bos() {
                    debug!("Ogg: 首个页面缺少 BOS 标志, serial=0x{:08X}", page.serial_number);
                }
                debug!("Ogg: 锁定逻辑流 serial=0x{:08X}", page.serial_number);
                self.serial = Some(page.serial_number);
            }
            Some(serial) if serial != page.serial_number => {
                self.pages_skipped += 1;
                return;
            }
            Some(_) => {}
        }
        self.pages_read += 1;

        if let Some(prev_seq) = self.last_page_sequence
            && page.page_sequence != prev_seq.wrapping_add(1)
        {
            warn!(
                "Ogg: 页面序号不连续: 期望 {}, 实际 {}",
                prev_seq.wrapping_add(1),
                page.page_sequence
            );
            self.partial_packet.clear();
            self.pending_discontinuity = true;
        }
        self.last_page_sequence = Some(page.page_sequence);

        if page.is_continued() {
            if self.partial_packet.is_empty() && !self.discarding_orphan_continued {
                debug!("Ogg: 遇到无头续包, 丢弃其剩余片段");
                self.discarding_orphan_continued = true;
                self.pending_discontinuity = true;
            }
        } else {
            if !self.partial_packet.is_empty() {
                warn!(
                    "Ogg: 缺少续页, 丢弃 {} 字节未完成数据",
                    self.partial_packet.len()
                );
                self.partial_packet.clear();
                self.pending_discontinuity = true;
            }
            self.discarding_orphan_continued = false;
        }

        let complete_count = page.segment_table.iter().filter(|&&s| s < 255).count();
        let mut completed = 0usize;
        let mut packet_start = 0usize;
        let mut offset = 0usize;
        for &seg_size in &page.segment_table {
            offset += usize::from(seg_size);
            if seg_size == 255 {
                continue;
            }
            let chunk = &page.data[packet_start..offset];
            packet_start = offset;
            completed += 1;

            if self.discarding_orphan_continued {
                self.discarding_orphan_continued = false;
                continue;
            }
            self.partial_packet.extend_from_slice(chunk);
            let data = std::mem::take(&mut self.partial_packet);
            let end_of_stream = page.is_eos() && completed == complete_count;
            self.emit_packet(data, end_of_stream);
        }

        if packet_start < page.data.len() && !self.discarding_orphan_continued {
            self.partial_packet
                .extend_from_slice(&page.data[packet_start..]);
        }

        if page.granule_position >= 0 {
            self.last_granule = Some(page.granule_position as u64);
        }

        if page.is_eos() {
            debug!(
                "Ogg: 逻辑流 serial=0x{:08X} 结束, 共 {} 个页面",
                page.serial_number, self.pages_read
            );
            self.ended = true;
        }
    }

    fn emit_packet(&mut self, data: Vec<u8>, end_of_stream: bool) {
        // 空包在解码器接口中表示 flush, 不向上传递
        if data.is_empty() {
            debug!("Ogg: 跳过长度为 0 的 packet");
            return;
        }
        self.packet_queue.push_back(Packet {
            data: Bytes::from(data),
            serial: self.serial.unwrap_or_default(),
            end_of_stream,
            discontinuity: std::mem::take(&mut self.pending_discontinuity),
        });
    }
}

impl<R: Read> PacketSource for OggReader<R> {
    fn next_packet(&mut self) -> QinResult<Option<Packet>> {
        loop {
            if let Some(packet) = self.packet_queue.pop_front() {
                return Ok(Some(packet));
            }
            if self.eof || self.ended {
                return Ok(None);
            }
            match self.read_page()? {
                Some(page) => self.process_page(page),
                None => {
                    if !self.partial_packet.is_empty() {
                        warn!(
                            "Ogg: 输入结束, 丢弃 {} 字节未完成数据",
                            self.partial_packet.len()
                        );
                        self.partial_packet.clear();
                    }
                    self.eof = true;
                }
            }
        }
    }
}
