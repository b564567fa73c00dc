use qin_core::{QinError, QinResult};

/// identification 头包内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationHeader {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    pub blocksize0: u16,
    pub blocksize1: u16,
}

/// comment 头包内容, 字符串按 UTF-8 有损解码
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComments {
    pub vendor: String,
    /// 原始 `KEY=value` 项, 保持码流中的顺序
    pub user_comments: Vec<String>,
}

impl VorbisComments {
    /// 按键名 (不区分大小写) 查找所有取值
    pub fn get<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// 拆分为 `(键, 值)`, 缺少 `=` 的项被忽略
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.user_comments
            .iter()
            .filter_map(|c| c.split_once('='))
    }
}

fn check_header_type(packet: &[u8], packet_type: u8, what: &str) -> QinResult<()> {
    if packet.len() < 7 || packet[0] != packet_type || &packet[1..7] != b"vorbis" {
        return Err(QinError::CorruptStream(format!("Vorbis {what} 头包标识无效")));
    }
    Ok(())
}

pub(crate) fn parse_identification_header(packet: &[u8]) -> QinResult<IdentificationHeader> {
    check_header_type(packet, 0x01, "identification")?;
    if packet.len() < 30 {
        return Err(QinError::CorruptStream(format!(
            "Vorbis identification 头包长度不足: {}",
            packet.len(),
        )));
    }

    let mut pos = 7usize;
    let version = read_le_u32(packet, &mut pos)?;
    if version != 0 {
        return Err(QinError::Unsupported(format!(
            "Vorbis 版本不支持: {}",
            version,
        )));
    }

    let channels = packet[pos];
    pos += 1;
    if channels == 0 {
        return Err(QinError::CorruptStream("Vorbis 声道数不能为 0".into()));
    }

    let sample_rate = read_le_u32(packet, &mut pos)?;
    if sample_rate == 0 {
        return Err(QinError::CorruptStream("Vorbis 采样率不能为 0".into()));
    }
    let bitrate_maximum = read_le_u32(packet, &mut pos)? as i32;
    let bitrate_nominal = read_le_u32(packet, &mut pos)? as i32;
    let bitrate_minimum = read_le_u32(packet, &mut pos)? as i32;

    let bs = packet[pos];
    let bs0_exp = bs & 0x0F;
    let bs1_exp = bs >> 4;
    if !(6..=13).contains(&bs0_exp) || !(6..=13).contains(&bs1_exp) || bs1_exp < bs0_exp {
        return Err(QinError::CorruptStream(format!(
            "Vorbis blocksize 非法: bs0_exp={}, bs1_exp={}",
            bs0_exp, bs1_exp,
        )));
    }

    if packet[pos + 1] & 0x01 == 0 {
        return Err(QinError::CorruptStream(
            "Vorbis identification 头包 framing_flag 非法".into(),
        ));
    }

    Ok(IdentificationHeader {
        channels,
        sample_rate,
        bitrate_maximum,
        bitrate_nominal,
        bitrate_minimum,
        blocksize0: 1u16 << bs0_exp,
        blocksize1: 1u16 << bs1_exp,
    })
}

pub(crate) fn parse_comment_header(packet: &[u8]) -> QinResult<VorbisComments> {
    check_header_type(packet, 0x03, "comment")?;

    let mut pos = 7usize;
    let vendor = read_string(packet, &mut pos, "Vorbis vendor 字段")?;

    let comment_count = read_le_u32(packet, &mut pos)? as usize;
    // 每项至少占 4 字节长度字段, 先按剩余长度约束预分配
    let mut user_comments = Vec::with_capacity(comment_count.min((packet.len() - pos) / 4));
    for _ in 0..comment_count {
        user_comments.push(read_string(packet, &mut pos, "Vorbis comment 项")?);
    }

    ensure_left(packet, pos, 1, "Vorbis comment framing_flag")?;
    if packet[pos] & 0x01 == 0 {
        return Err(QinError::CorruptStream(
            "Vorbis comment 头包 framing_flag 非法".into(),
        ));
    }

    Ok(VorbisComments {
        vendor,
        user_comments,
    })
}

fn ensure_left(data: &[u8], pos: usize, need: usize, what: &str) -> QinResult<()> {
    if pos.saturating_add(need) > data.len() {
        return Err(QinError::CorruptStream(format!(
            "{} 超读取越界: pos={}, need={}, len={}",
            what,
            pos,
            need,
            data.len(),
        )));
    }
    Ok(())
}

fn read_le_u32(data: &[u8], pos: &mut usize) -> QinResult<u32> {
    ensure_left(data, *pos, 4, "Vorbis u32")?;
    let v = u32::from_le_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

fn read_string(data: &[u8], pos: &mut usize, what: &str) -> QinResult<String> {
    let len = read_le_u32(data, pos)? as usize;
    ensure_left(data, *pos, len, what)?;
    let s = String::from_utf8_lossy(&data[*pos..*pos + len]).into_owned();
    *pos += len;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ident_header() -> Vec<u8> {
        let mut v = Vec::new();
        v.push(0x01);
        v.extend_from_slice(b"vorbis");
        v.extend_from_slice(&0u32.to_le_bytes());
        v.push(2);
        v.extend_from_slice(&44100u32.to_le_bytes());
        v.extend_from_slice(&0i32.to_le_bytes());
        v.extend_from_slice(&128000i32.to_le_bytes());
        v.extend_from_slice(&0i32.to_le_bytes());
        v.push((11 << 4) | 8);
        v.push(1);
        v
    }

    fn build_comment_header(vendor: &str, comments: &[&str]) -> Vec<u8> {
        let mut v = Vec::new();
        v.push(0x03);
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

    #[test]
    fn test_parse_identification_success() {
        let h = parse_identification_header(&build_ident_header()).unwrap();
        assert_eq!(h.sample_rate, 44100);
        assert_eq!(h.channels, 2);
        assert_eq!(h.bitrate_nominal, 128000);
        assert_eq!(h.blocksize0, 256);
        assert_eq!(h.blocksize1, 2048);
    }

    #[test]
    fn test_identification_非法字段() {
        let mut bad_bs = build_ident_header();
        bad_bs[28] = (6 << 4) | 8;
        assert!(parse_identification_header(&bad_bs).is_err());

        let mut too_big = build_ident_header();
        too_big[28] = (14 << 4) | 8;
        assert!(parse_identification_header(&too_big).is_err());

        let mut no_framing = build_ident_header();
        no_framing[29] = 0;
        assert!(parse_identification_header(&no_framing).is_err());

        let mut version = build_ident_header();
        version[7] = 1;
        assert!(matches!(
            parse_identification_header(&version),
            Err(QinError::Unsupported(_))
        ));

        assert!(parse_identification_header(&build_comment_header("x", &[])).is_err());
    }

    #[test]
    fn test_parse_comment_success() {
        let packet =
            build_comment_header("qin test", &["TITLE=Song", "artist=A", "Artist=B", "junk"]);
        let comments = parse_comment_header(&packet).unwrap();
        assert_eq!(comments.vendor, "qin test");
        assert_eq!(comments.user_comments.len(), 4);
        assert_eq!(comments.get("title").collect::<Vec<_>>(), vec!["Song"]);
        assert_eq!(comments.get("ARTIST").collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(comments.pairs().count(), 3);
    }

    #[test]
    fn test_comment_长度越界() {
        let mut packet = build_comment_header("vendor", &["A=1"]);
        // 把条目长度改大
        let len_pos = 7 + 4 + 6 + 4;
        packet[len_pos] = 200;
        assert!(matches!(
            parse_comment_header(&packet),
            Err(QinError::CorruptStream(_))
        ));
    }
}
