//! 单元测试共用的码流构造工具.
//!
//! 构造的最小流: 1 个 2 条目 1 维码本 (1 位码字, 取值 0.0/1.0), floor1 无分区,
//! residue type 1 覆盖频点 `[0, 32)` 分 2 个分区, 短/长两个 mode.

use super::bitreader::ilog;

/// LSB 优先位写入器
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    pub(crate) bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub(crate) fn put(&mut self, value: u32, bits: u8) {
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

    pub(crate) fn flag(&mut self, v: bool) {
        self.put(u32::from(v), 1);
    }
}

pub(crate) fn ident_packet(channels: u8, sample_rate: u32, bs0_exp: u8, bs1_exp: u8) -> Vec<u8> {
    let mut v = vec![0x01];
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&0u32.to_le_bytes());
    v.push(channels);
    v.extend_from_slice(&sample_rate.to_le_bytes());
    v.extend_from_slice(&[0; 12]);
    v.push((bs1_exp << 4) | bs0_exp);
    v.push(1);
    v
}

pub(crate) fn comment_packet(vendor: &str, comments: &[&str]) -> Vec<u8> {
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

fn write_vq_book(w: &mut BitWriter) {
    w.put(0x56_43_42, 24);
    w.put(1, 16);
    w.put(2, 24);
    w.flag(false); // ordered
    w.flag(false); // sparse
    w.put(0, 5);
    w.put(0, 5);
    w.put(1, 4); // lookup type 1
    w.put(0, 32); // minimum 0.0
    w.put((788 << 21) | 1, 32); // delta 1.0
    w.put(0, 4); // value_bits = 1
    w.flag(false);
    w.put(0, 1);
    w.put(1, 1);
}

/// `coupled` 为 true 时声明一个耦合步骤 (magnitude=0, angle=1).
pub(crate) fn setup_packet(channels: u8, coupled: bool) -> Vec<u8> {
    let mut w = BitWriter::default();
    w.put(0, 8);
    write_vq_book(&mut w);
    w.put(0, 6);
    w.put(0, 16);
    // floor1: 无分区, multiplier 1, range_bits 7
    w.put(0, 6);
    w.put(1, 16);
    w.put(0, 5);
    w.put(0, 2);
    w.put(7, 4);
    // residue type 1
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

/// 构造音频包.
///
/// `floors[ch]` 为 `Some(y)` 时该声道 floor 两端点均为 `y`, `None` 表示无信号.
/// `residues` 按声道顺序给出需要解码 residue 的声道的 32 个取值 (0/1).
pub(crate) fn audio_packet(
    long: Option<(bool, bool)>,
    floors: &[Option<u8>],
    residues: &[[bool; 32]],
) -> Vec<u8> {
    let mut w = BitWriter::default();
    w.flag(false);
    w.flag(long.is_some());
    if let Some((prev_long, next_long)) = long {
        w.flag(prev_long);
        w.flag(next_long);
    }
    for floor in floors {
        match floor {
            Some(y) => {
                w.flag(true);
                w.put(u32::from(*y), 8);
                w.put(u32::from(*y), 8);
            }
            None => w.flag(false),
        }
    }
    for partition in 0..2 {
        for _ in residues {
            w.flag(false);
        }
        for values in residues {
            for &v in &values[partition * 16..(partition + 1) * 16] {
                w.flag(v);
            }
        }
    }
    w.bytes
}
