//! setup 头包解析.
//!
//! 这里完成全部范围校验 (码本/floor/residue 下标, 耦合声道, mux 等),
//! 音频包解码阶段据此可以直接索引.

use log::debug;
use qin_core::{QinError, QinResult};

use super::bitreader::{LsbBitReader, ilog};
use super::codebook::{Codebook, CodebookDecode, float32_unpack, lookup1_values};
use super::coupling::CouplingStep;
use super::floor::FloorConfig;
use super::floor0::Floor0Config;
use super::floor1::{Floor1Class, Floor1Config};
use super::residue::{ResidueConfig, ResidueKind};

const CODEBOOK_SYNC: u32 = 0x56_43_42;

#[derive(Debug, Clone)]
pub(crate) struct CodebookConfig {
    pub(crate) dimensions: u16,
    pub(crate) entries: u32,
    /// 每个条目的码长, 0 表示稀疏 codebook 中未使用
    pub(crate) lengths: Vec<u8>,
    pub(crate) lookup: Option<CodebookLookupConfig>,
}

#[derive(Debug, Clone)]
pub(crate) struct CodebookLookupConfig {
    pub(crate) lookup_type: u8,
    pub(crate) minimum_value: f32,
    pub(crate) delta_value: f32,
    pub(crate) sequence_p: bool,
    pub(crate) lookup_values: u32,
    pub(crate) multiplicands: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Submap {
    pub(crate) floor: u8,
    pub(crate) residue: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct MappingConfig {
    pub(crate) coupling: Vec<CouplingStep>,
    /// 声道 -> submap
    pub(crate) mux: Vec<u8>,
    pub(crate) submaps: Vec<Submap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ModeConfig {
    pub(crate) block_flag: bool,
    pub(crate) mapping: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct ParsedSetup {
    pub(crate) codebooks: Vec<Codebook>,
    pub(crate) floors: Vec<FloorConfig>,
    pub(crate) residues: Vec<ResidueConfig>,
    pub(crate) mappings: Vec<MappingConfig>,
    pub(crate) modes: Vec<ModeConfig>,
}

pub(crate) fn parse_setup_packet(
    packet: &[u8],
    channels: u8,
    blocksizes: [usize; 2],
) -> QinResult<ParsedSetup> {
    if packet.len() < 8 || packet[0] != 0x05 || &packet[1..7] != b"vorbis" {
        return Err(QinError::CorruptStream("Vorbis setup 头包标识无效".into()));
    }

    let mut br = LsbBitReader::new(&packet[7..]);
    let codebooks = parse_codebooks(&mut br).map_err(|e| stage_error("codebooks", &br, e))?;
    parse_time_domain_transforms(&mut br).map_err(|e| stage_error("time", &br, e))?;
    let floors =
        parse_floors(&mut br, &codebooks, blocksizes).map_err(|e| stage_error("floors", &br, e))?;
    let residues =
        parse_residues(&mut br, &codebooks).map_err(|e| stage_error("residues", &br, e))?;
    let mappings = parse_mappings(&mut br, channels, floors.len(), residues.len())
        .map_err(|e| stage_error("mappings", &br, e))?;
    let modes = parse_modes(&mut br, mappings.len()).map_err(|e| stage_error("modes", &br, e))?;

    if !br.read_flag() || br.is_overrun() {
        return Err(QinError::CorruptStream(
            "Vorbis setup 头包 framing_flag 非法".into(),
        ));
    }

    debug!(
        "Vorbis setup: codebooks={}, floors={}, residues={}, mappings={}, modes={}",
        codebooks.len(),
        floors.len(),
        residues.len(),
        mappings.len(),
        modes.len(),
    );

    Ok(ParsedSetup {
        codebooks,
        floors,
        residues,
        mappings,
        modes,
    })
}

fn stage_error(stage: &str, br: &LsbBitReader<'_>, e: QinError) -> QinError {
    QinError::CorruptStream(format!(
        "Vorbis setup {} 解析失败(bit={}): {}",
        stage,
        br.bit_position(),
        e
    ))
}

/// 头包不允许读到包尾之后
fn ensure_in_packet(br: &LsbBitReader<'_>, what: &str) -> QinResult<()> {
    if br.is_overrun() {
        return Err(QinError::CorruptStream(format!("{what} 超出头包长度")));
    }
    Ok(())
}

fn parse_codebooks(br: &mut LsbBitReader<'_>) -> QinResult<Vec<Codebook>> {
    let codebook_count = br.read_bits(8)? + 1;
    let mut codebooks = Vec::with_capacity(codebook_count as usize);
    for _ in 0..codebook_count {
        let config = parse_codebook(br)?;
        codebooks.push(Codebook::from_config(&config)?);
    }
    Ok(codebooks)
}

fn parse_codebook(br: &mut LsbBitReader<'_>) -> QinResult<CodebookConfig> {
    let sync = br.read_bits(24)?;
    if sync != CODEBOOK_SYNC {
        return Err(QinError::CorruptStream(format!(
            "Vorbis codebook 同步字错误: 0x{sync:06X}",
        )));
    }

    let dimensions = br.read_bits(16)? as u16;
    if dimensions == 0 {
        return Err(QinError::CorruptStream(
            "Vorbis codebook dimensions 不能为 0".into(),
        ));
    }

    let entries = br.read_bits(24)?;
    if entries == 0 {
        return Err(QinError::CorruptStream(
            "Vorbis codebook entries 不能为 0".into(),
        ));
    }

    let ordered = br.read_flag();
    let lengths = if ordered {
        read_ordered_lengths(br, entries)?
    } else {
        read_unordered_lengths(br, entries)?
    };
    ensure_in_packet(br, "Vorbis codebook 码长表")?;

    let lookup_type = br.read_bits(4)? as u8;
    let lookup = match lookup_type {
        0 => None,
        1 | 2 => Some(read_lookup(br, lookup_type, entries, dimensions)?),
        other => {
            return Err(QinError::CorruptStream(format!(
                "Vorbis codebook lookup_type 非法: {}",
                other,
            )));
        }
    };
    ensure_in_packet(br, "Vorbis codebook lookup")?;

    Ok(CodebookConfig {
        dimensions,
        entries,
        lengths,
        lookup,
    })
}

fn read_ordered_lengths(br: &mut LsbBitReader<'_>, entries: u32) -> QinResult<Vec<u8>> {
    let mut lengths = Vec::with_capacity(entries as usize);
    let mut current_length = br.read_bits(5)? + 1;
    while (lengths.len() as u32) < entries {
        if current_length > 32 {
            return Err(QinError::CorruptStream(
                "Vorbis codebook ordered 码长超过 32".into(),
            ));
        }
        let left = entries - lengths.len() as u32;
        let number = br.read_bits(ilog(left))?;
        if number > left {
            return Err(QinError::CorruptStream(
                "Vorbis codebook ordered 长度组无效".into(),
            ));
        }
        lengths.extend(std::iter::repeat_n(current_length as u8, number as usize));
        current_length += 1;
        ensure_in_packet(br, "Vorbis codebook ordered 长度组")?;
    }
    Ok(lengths)
}

fn read_unordered_lengths(br: &mut LsbBitReader<'_>, entries: u32) -> QinResult<Vec<u8>> {
    let sparse = br.read_flag();
    // 每个条目至少占 1 位, 条目数超出剩余位数时必然截断
    if entries as usize > br.remaining_bits() {
        return Err(QinError::CorruptStream(
            "Vorbis codebook 条目数超出头包长度".into(),
        ));
    }
    let mut lengths = Vec::with_capacity(entries as usize);
    for _ in 0..entries {
        let used = if sparse { br.read_flag() } else { true };
        let length = if used { br.read_bits(5)? as u8 + 1 } else { 0 };
        lengths.push(length);
    }
    Ok(lengths)
}

fn read_lookup(
    br: &mut LsbBitReader<'_>,
    lookup_type: u8,
    entries: u32,
    dimensions: u16,
) -> QinResult<CodebookLookupConfig> {
    let minimum_value = float32_unpack(br.read_bits(32)?);
    let delta_value = float32_unpack(br.read_bits(32)?);
    let value_bits = br.read_bits(4)? as u8 + 1;
    let sequence_p = br.read_flag();

    let lookup_values = if lookup_type == 1 {
        lookup1_values(entries, dimensions)
    } else {
        entries
            .checked_mul(u32::from(dimensions))
            .ok_or_else(|| QinError::CorruptStream("Vorbis quant_values 溢出".into()))?
    };
    if (lookup_values as usize).saturating_mul(usize::from(value_bits)) > br.remaining_bits() {
        return Err(QinError::CorruptStream(
            "Vorbis codebook multiplicands 超出头包长度".into(),
        ));
    }
    let multiplicands = (0..lookup_values)
        .map(|_| br.read_bits(value_bits))
        .collect::<QinResult<Vec<_>>>()?;

    Ok(CodebookLookupConfig {
        lookup_type,
        minimum_value,
        delta_value,
        sequence_p,
        lookup_values,
        multiplicands,
    })
}

fn parse_time_domain_transforms(br: &mut LsbBitReader<'_>) -> QinResult<()> {
    let count = br.read_bits(6)? + 1;
    for _ in 0..count {
        let value = br.read_bits(16)?;
        if value != 0 {
            return Err(QinError::CorruptStream(
                "Vorbis time domain transform 必须为 0".into(),
            ));
        }
    }
    ensure_in_packet(br, "Vorbis time domain transform")
}

fn parse_floors(
    br: &mut LsbBitReader<'_>,
    codebooks: &[Codebook],
    blocksizes: [usize; 2],
) -> QinResult<Vec<FloorConfig>> {
    let floor_count = br.read_bits(6)? + 1;
    let mut floors = Vec::with_capacity(floor_count as usize);
    for floor_idx in 0..floor_count {
        let floor_type = br.read_bits(16)?;
        let floor = match floor_type {
            0 => FloorConfig::Floor0(parse_floor0(br, codebooks, blocksizes)?),
            1 => FloorConfig::Floor1(parse_floor1(br, codebooks)?),
            _ => {
                return Err(QinError::CorruptStream(format!(
                    "Vorbis floor_type 不支持: {} (floor_idx={}, floor_count={})",
                    floor_type, floor_idx, floor_count,
                )));
            }
        };
        ensure_in_packet(br, "Vorbis floor")?;
        floors.push(floor);
    }
    Ok(floors)
}

fn check_book(codebooks: &[Codebook], idx: u32, need_vq: bool, what: &str) -> QinResult<u8> {
    let book = codebooks.get(idx as usize).ok_or_else(|| {
        QinError::CorruptStream(format!("{what} codebook 索引越界: {idx}"))
    })?;
    if need_vq && !book.has_vq() {
        return Err(QinError::CorruptStream(format!(
            "{what} codebook {idx} 缺少 VQ 查找表"
        )));
    }
    Ok(idx as u8)
}

fn parse_floor0(
    br: &mut LsbBitReader<'_>,
    codebooks: &[Codebook],
    blocksizes: [usize; 2],
) -> QinResult<Floor0Config> {
    let order = br.read_bits(8)? as u8;
    let rate = br.read_bits(16)? as u16;
    let bark_map_size = br.read_bits(16)? as u16;
    let amplitude_bits = br.read_bits(6)? as u8;
    let amplitude_offset = br.read_bits(8)? as u8;
    let book_count = br.read_bits(4)? + 1;
    let books = (0..book_count)
        .map(|_| check_book(codebooks, br.read_bits(8)?, true, "Vorbis floor0"))
        .collect::<QinResult<Vec<_>>>()?;
    Floor0Config::new(
        order,
        rate,
        bark_map_size,
        amplitude_bits,
        amplitude_offset,
        books,
        blocksizes,
    )
}

fn parse_floor1(br: &mut LsbBitReader<'_>, codebooks: &[Codebook]) -> QinResult<Floor1Config> {
    let partitions = br.read_bits(5)?;
    let partition_classes = (0..partitions)
        .map(|_| br.read_bits(4).map(|v| v as u8))
        .collect::<QinResult<Vec<_>>>()?;
    let class_count = partition_classes.iter().copied().max().map_or(0, |m| m + 1);

    let mut classes = Vec::with_capacity(usize::from(class_count));
    for _ in 0..class_count {
        let dimensions = br.read_bits(3)? as u8 + 1;
        let subclasses = br.read_bits(2)? as u8;
        let masterbook = if subclasses > 0 {
            Some(check_book(codebooks, br.read_bits(8)?, false, "Vorbis floor1 masterbook")?)
        } else {
            None
        };
        let subclass_books = (0..1u32 << subclasses)
            .map(|_| {
                // 码流中存储 book + 1, 0 表示无 book
                match br.read_bits(8)? {
                    0 => Ok(None),
                    v => check_book(codebooks, v - 1, false, "Vorbis floor1 subclass").map(Some),
                }
            })
            .collect::<QinResult<Vec<_>>>()?;
        classes.push(Floor1Class {
            dimensions,
            subclasses,
            masterbook,
            subclass_books,
        });
    }

    let multiplier = br.read_bits(2)? as u8 + 1;
    let range_bits = br.read_bits(4)? as u8;
    // X=0 与 X=(1<<range_bits) 为隐式端点, 不占用位流
    let mut x_list = vec![0u32, 1u32 << range_bits];
    for &class_num in &partition_classes {
        let dim = classes[usize::from(class_num)].dimensions;
        for _ in 0..dim {
            x_list.push(br.read_bits(range_bits)?);
        }
    }

    Floor1Config::new(partition_classes, classes, multiplier, x_list)
}

fn parse_residues(
    br: &mut LsbBitReader<'_>,
    codebooks: &[Codebook],
) -> QinResult<Vec<ResidueConfig>> {
    let residue_count = br.read_bits(6)? + 1;
    let mut residues = Vec::with_capacity(residue_count as usize);
    for _ in 0..residue_count {
        let kind = ResidueKind::from_type(br.read_bits(16)?)?;
        let begin = br.read_bits(24)?;
        let end = br.read_bits(24)?;
        let partition_size = br.read_bits(24)? + 1;
        let classifications = br.read_bits(6)? as u8 + 1;
        let classbook = check_book(codebooks, br.read_bits(8)?, false, "Vorbis residue classbook")?;
        if codebooks[usize::from(classbook)].dimensions() == 0 {
            return Err(QinError::CorruptStream(
                "Vorbis residue classbook 维数为 0".into(),
            ));
        }

        let mut cascades = Vec::with_capacity(usize::from(classifications));
        for _ in 0..classifications {
            let low_bits = br.read_bits(3)?;
            let high_bits = if br.read_flag() { br.read_bits(5)? } else { 0 };
            cascades.push((high_bits << 3) | low_bits);
        }

        let mut books = Vec::with_capacity(cascades.len());
        for cascade in cascades {
            let mut passes = [None; 8];
            for (bit, slot) in passes.iter_mut().enumerate() {
                if cascade & (1 << bit) != 0 {
                    *slot = Some(check_book(codebooks, br.read_bits(8)?, true, "Vorbis residue")?);
                }
            }
            books.push(passes);
        }
        ensure_in_packet(br, "Vorbis residue")?;

        residues.push(ResidueConfig {
            kind,
            begin,
            end,
            partition_size,
            classifications,
            classbook,
            books,
        });
    }
    Ok(residues)
}

fn parse_mappings(
    br: &mut LsbBitReader<'_>,
    channels: u8,
    floor_count: usize,
    residue_count: usize,
) -> QinResult<Vec<MappingConfig>> {
    let mapping_count = br.read_bits(6)? + 1;
    let mut mappings = Vec::with_capacity(mapping_count as usize);
    for _ in 0..mapping_count {
        let mapping_type = br.read_bits(16)?;
        if mapping_type != 0 {
            return Err(QinError::CorruptStream(format!(
                "Vorbis mapping_type 不支持: {}",
                mapping_type,
            )));
        }

        let submap_count = if br.read_flag() {
            br.read_bits(4)? + 1
        } else {
            1
        };

        let mut coupling = Vec::new();
        if br.read_flag() {
            let coupling_steps = br.read_bits(8)? + 1;
            let ch_bits = ilog(u32::from(channels) - 1);
            for _ in 0..coupling_steps {
                let magnitude = br.read_bits(ch_bits)?;
                let angle = br.read_bits(ch_bits)?;
                if magnitude == angle
                    || magnitude >= u32::from(channels)
                    || angle >= u32::from(channels)
                {
                    return Err(QinError::CorruptStream("Vorbis coupling 参数非法".into()));
                }
                coupling.push(CouplingStep {
                    magnitude: magnitude as u8,
                    angle: angle as u8,
                });
            }
        }

        let reserved = br.read_bits(2)?;
        if reserved != 0 {
            return Err(QinError::CorruptStream(
                "Vorbis mapping reserved bits 必须为 0".into(),
            ));
        }

        let mut mux = vec![0u8; usize::from(channels)];
        if submap_count > 1 {
            for slot in &mut mux {
                let v = br.read_bits(4)?;
                if v >= submap_count {
                    return Err(QinError::CorruptStream("Vorbis mapping mux 值越界".into()));
                }
                *slot = v as u8;
            }
        }

        let mut submaps = Vec::with_capacity(submap_count as usize);
        for _ in 0..submap_count {
            let _time_submap = br.read_bits(8)?;
            let floor = br.read_bits(8)?;
            let residue = br.read_bits(8)?;
            if floor as usize >= floor_count || residue as usize >= residue_count {
                return Err(QinError::CorruptStream(
                    "Vorbis mapping floor/residue 索引越界".into(),
                ));
            }
            submaps.push(Submap {
                floor: floor as u8,
                residue: residue as u8,
            });
        }
        ensure_in_packet(br, "Vorbis mapping")?;

        mappings.push(MappingConfig {
            coupling,
            mux,
            submaps,
        });
    }
    Ok(mappings)
}

fn parse_modes(br: &mut LsbBitReader<'_>, mapping_count: usize) -> QinResult<Vec<ModeConfig>> {
    let mode_count = br.read_bits(6)? + 1;
    let mut modes = Vec::with_capacity(mode_count as usize);
    for _ in 0..mode_count {
        let block_flag = br.read_flag();
        let window_type = br.read_bits(16)?;
        let transform_type = br.read_bits(16)?;
        if window_type != 0 || transform_type != 0 {
            return Err(QinError::CorruptStream(
                "Vorbis mode window/transform 必须为 0".into(),
            ));
        }

        let mapping = br.read_bits(8)?;
        if mapping as usize >= mapping_count {
            return Err(QinError::CorruptStream("Vorbis mode mapping 索引越界".into()));
        }

        modes.push(ModeConfig {
            block_flag,
            mapping: mapping as u8,
        });
    }
    ensure_in_packet(br, "Vorbis mode")?;
    Ok(modes)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{BitWriter, setup_packet};
    use super::*;

    #[test]
    fn test_完整_setup_解析() {
        let setup = parse_setup_packet(&setup_packet(2, true), 2, [64, 128]).unwrap();
        assert_eq!(setup.codebooks.len(), 1);
        assert_eq!(setup.codebooks[0].entries(), 2);
        assert!(setup.codebooks[0].has_vq());
        assert!(matches!(setup.floors[0], FloorConfig::Floor1(_)));
        let residue = &setup.residues[0];
        assert_eq!(residue.kind, ResidueKind::Sequential);
        assert_eq!((residue.begin, residue.end, residue.partition_size), (0, 32, 16));
        assert_eq!(residue.books[0][0], Some(0));
        assert_eq!(residue.books[0][1], None);
        assert_eq!(
            setup.mappings[0].coupling,
            vec![CouplingStep {
                magnitude: 0,
                angle: 1
            }]
        );
        assert_eq!(setup.mappings[0].mux, vec![0, 0]);
        assert_eq!(setup.modes.len(), 2);
        assert!(!setup.modes[0].block_flag);
        assert!(setup.modes[1].block_flag);
    }

    #[test]
    fn test_截断的_setup() {
        let packet = setup_packet(1, false);
        let truncated = &packet[..packet.len() - 3];
        assert!(matches!(
            parse_setup_packet(truncated, 1, [64, 128]),
            Err(QinError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_头包标识错误() {
        let mut packet = setup_packet(1, false);
        packet[0] = 0x03;
        assert!(parse_setup_packet(&packet, 1, [64, 128]).is_err());
    }

    #[test]
    fn test_ordered_码长() {
        let mut w = BitWriter::default();
        w.put(0, 5); // 起始码长 1
        w.put(2, ilog(4)); // 2 个码长 1
        w.put(2, ilog(2)); // 2 个码长 2
        let mut br = LsbBitReader::new(&w.bytes);
        assert_eq!(read_ordered_lengths(&mut br, 4).unwrap(), vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_sparse_码长() {
        let mut w = BitWriter::default();
        w.flag(true);
        w.flag(true);
        w.put(0, 5);
        w.flag(false);
        w.flag(true);
        w.put(0, 5);
        let mut br = LsbBitReader::new(&w.bytes);
        assert_eq!(read_unordered_lengths(&mut br, 3).unwrap(), vec![1, 0, 1]);
    }
}
