//! 集成测试共用的码流构造工具.
//!
//! Vorbis 部分构造一条最小但完整的流: 一个 2 条目码本, floor1 (无分区),
//! residue type 1 覆盖频点 `[0, 32)`, 短块 64 / 长块 128.
//! Ogg 部分把数据包按真实页面格式打包, 含正确的 CRC.

#![allow(dead_code)]

use qin::core::crc::crc32;

pub const BLOCKSIZE0_EXP: u8 = 6;
pub const BLOCKSIZE1_EXP: u8 = 7;

/// LSB 优先位写入器
#[derive(Debug, Default)]
pub struct BitWriter {
    pub bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn put(&mut self, value: u32, bits: u8) {
        for i in 0..bits {
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 != 0 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 1 << (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    pub fn flag(&mut self, v: bool) {
        self.put(u32::from(v), 1);
    }
}

fn ilog(v: u32) -> u8 {
    (32 - v.leading_zeros()) as u8
}

pub fn ident_packet(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut v = vec![0x01];
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&0u32.to_le_bytes());
    v.push(channels);
    v.extend_from_slice(&sample_rate.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.extend_from_slice(&128_000i32.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.push((BLOCKSIZE1_EXP << 4) | BLOCKSIZE0_EXP);
    v.push(1);
    v
}

pub fn comment_packet(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut v = vec![0x03];
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    v.extend_from_slice(vendor.as_bytes());
    v.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for c in comments {
        v.extend_from_slice(&(c.len() as u32).to_le_bytes());
        v.extend_from_slice(c.as_bytes());
    }
    v.push(1);
    v
}

/// 所有声道共用一个 submap; `coupled` 为 true 时声道 0/1 组成耦合对.
pub fn setup_packet(channels: u8, coupled: bool) -> Vec<u8> {
    let mut w = BitWriter::default();

    // 码本: 2 条目, 1 维, 码长均为 1, lookup type 1 取值 {0.0, 1.0}
    w.put(0, 8);
    w.put(0x56_43_42, 24);
    w.put(1, 16);
    w.put(2, 24);
    w.flag(false);
    w.flag(false);
    w.put(0, 5);
    w.put(0, 5);
    w.put(1, 4);
    w.put(0, 32);
    w.put((788 << 21) | 1, 32);
    w.put(0, 4);
    w.flag(false);
    w.put(0, 1);
    w.put(1, 1);

    // time domain transforms
    w.put(0, 6);
    w.put(0, 16);

    // floor1
    w.put(0, 6);
    w.put(1, 16);
    w.put(0, 5);
    w.put(0, 2);
    w.put(7, 4);

    // residue type 1, [0, 32), 分区 16
    w.put(0, 6);
    w.put(1, 16);
    w.put(0, 24);
    w.put(32, 24);
    w.put(15, 24);
    w.put(0, 6);
    w.put(0, 8);
    w.put(1, 3);
    w.flag(false);
    w.put(0, 8);

    // mapping
    w.put(0, 6);
    w.put(0, 16);
    w.flag(false);
    w.flag(coupled);
    if coupled {
        w.put(0, 8);
        let bits = ilog(u32::from(channels) - 1);
        w.put(0, bits);
        w.put(1, bits);
    }
    w.put(0, 2);
    w.put(0, 8);
    w.put(0, 8);
    w.put(0, 8);

    // mode 0 短块, mode 1 长块
    w.put(1, 6);
    for block_flag in [false, true] {
        w.flag(block_flag);
        w.put(0, 16);
        w.put(0, 16);
        w.put(0, 8);
    }
    w.flag(true);

    let mut packet = vec![0x05];
    packet.extend_from_slice(b"vorbis");
    packet.extend_from_slice(&w.bytes);
    packet
}

/// 块类型: 短块, 或带前后相邻块类型的长块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Short,
    Long { prev_long: bool, next_long: bool },
}

/// 构造音频包, 所有声道 floor 端点取 `amplitude`, residue 按 `pattern` 的位取值.
pub fn audio_packet(block: Block, channels: u8, amplitude: u8, pattern: u32) -> Vec<u8> {
    let mut w = BitWriter::default();
    w.flag(false);
    match block {
        Block::Short => w.flag(false),
        Block::Long {
            prev_long,
            next_long,
        } => {
            w.flag(true);
            w.flag(prev_long);
            w.flag(next_long);
        }
    }
    for _ in 0..channels {
        w.flag(true);
        w.put(u32::from(amplitude), 8);
        w.put(u32::from(amplitude), 8);
    }
    for partition in 0..2 {
        for _ in 0..channels {
            w.flag(false);
        }
        for _ in 0..channels {
            for i in 0..16 {
                w.flag((pattern >> ((partition * 16 + i) % 32)) & 1 != 0);
            }
        }
    }
    w.bytes
}

/// 块序列对应的音频包, 长块的前后标志由相邻块推导
pub fn audio_packets(blocks: &[bool], channels: u8) -> Vec<Vec<u8>> {
    (0..blocks.len())
        .map(|i| {
            let block = if blocks[i] {
                Block::Long {
                    prev_long: i > 0 && blocks[i - 1],
                    next_long: blocks.get(i + 1).copied().unwrap_or(false),
                }
            } else {
                Block::Short
            };
            audio_packet(block, channels, 180, 0x5A5A_0F0F ^ (i as u32 * 0x0101_0101))
        })
        .collect()
}

/// 第 `i` 个包输出的每声道采样数 (首包为 0)
pub fn packet_samples(blocks: &[bool], i: usize) -> usize {
    if i == 0 {
        return 0;
    }
    let bs0 = 1usize << BLOCKSIZE0_EXP;
    let bs1 = 1usize << BLOCKSIZE1_EXP;
    if !blocks[i] {
        return bs0 / 2;
    }
    let offset = bs1 / 4 - bs0 / 4;
    let start = if blocks[i - 1] { 0 } else { offset };
    let center = bs1 / 2 + if blocks.get(i + 1).copied().unwrap_or(false) { 0 } else { offset };
    center - start
}

/// 整条块序列应输出的每声道采样数
pub fn expected_samples(blocks: &[bool]) -> usize {
    (0..blocks.len()).map(|i| packet_samples(blocks, i)).sum()
}

pub const PAGE_CONTINUED: u8 = 0x01;
pub const PAGE_BOS: u8 = 0x02;
pub const PAGE_EOS: u8 = 0x04;

/// Ogg 页面写入器, 负责序号与 CRC
#[derive(Debug)]
pub struct OggWriter {
    pub bytes: Vec<u8>,
    serial: u32,
    sequence: u32,
}

impl OggWriter {
    pub fn new(serial: u32) -> Self {
        Self {
            bytes: Vec::new(),
            serial,
            sequence: 0,
        }
    }

    /// 写一个页面, `segments` 为 lacing 表, `body` 为页面数据
    pub fn raw_page(&mut self, header_type: u8, granule: u64, segments: &[u8], body: &[u8]) {
        let start = self.bytes.len();
        self.bytes.extend_from_slice(b"OggS");
        self.bytes.push(0);
        self.bytes.push(header_type);
        self.bytes.extend_from_slice(&granule.to_le_bytes());
        self.bytes.extend_from_slice(&self.serial.to_le_bytes());
        self.bytes.extend_from_slice(&self.sequence.to_le_bytes());
        self.bytes.extend_from_slice(&[0; 4]);
        self.bytes.push(segments.len() as u8);
        self.bytes.extend_from_slice(segments);
        self.bytes.extend_from_slice(body);
        let crc = crc32(&self.bytes[start..]);
        self.bytes[start + 22..start + 26].copy_from_slice(&crc.to_le_bytes());
        self.sequence += 1;
    }

    /// 把若干完整的包写入一个页面
    pub fn page<P: AsRef<[u8]>>(&mut self, header_type: u8, granule: u64, packets: &[P]) {
        let mut segments = Vec::new();
        let mut body = Vec::new();
        for packet in packets {
            let packet = packet.as_ref();
            segments.extend(lacing(packet.len()));
            body.extend_from_slice(packet);
        }
        self.raw_page(header_type, granule, &segments, &body);
    }

    /// 把一个包拆到两个页面, 第一页只含前 `255 * first_segments` 字节
    pub fn split_packet(&mut self, granule: u64, packet: &[u8], first_segments: usize) {
        let split = 255 * first_segments;
        assert!(split < packet.len(), "拆分位置超出包长");
        self.raw_page(0, u64::MAX, &vec![255; first_segments], &packet[..split]);
        let rest = &packet[split..];
        self.raw_page(PAGE_CONTINUED, granule, &lacing(rest.len()), rest);
    }

    /// 已写入的字节数, 可记下某一页的起点以便测试中破坏数据
    pub fn position(&self) -> usize {
        self.bytes.len()
    }
}

pub fn lacing(len: usize) -> Vec<u8> {
    let mut segments = vec![255u8; len / 255];
    segments.push((len % 255) as u8);
    segments
}

/// 完整的 Ogg Vorbis 流: 头包各占一页, 每个音频包一页, 最后一页带 EOS
pub fn ogg_stream(serial: u32, channels: u8, blocks: &[bool]) -> Vec<u8> {
    let mut ogg = OggWriter::new(serial);
    ogg.page(PAGE_BOS, 0, &[&ident_packet(channels, 8000)]);
    ogg.page(
        0,
        0,
        &[
            &comment_packet("qin-test", &["TITLE=synthetic"]),
            &setup_packet(channels, channels > 1),
        ],
    );
    let packets = audio_packets(blocks, channels);
    let mut granule = 0u64;
    for (i, packet) in packets.iter().enumerate() {
        granule += packet_samples(blocks, i) as u64;
        let flags = if i + 1 == packets.len() { PAGE_EOS } else { 0 };
        ogg.page(flags, granule, &[packet]);
    }
    ogg.bytes
}
