//! Vorbis codebook: Huffman 前缀码 + VQ 向量查找表.
//!
//! 码长表在 setup 阶段构建为二叉树, VQ 向量按条目预先展开,
//! 音频包解码时只做树遍历和切片借用, 不再分配内存.

use qin_core::{QinError, QinResult};

use super::bitreader::LsbBitReader;
use super::setup::{CodebookConfig, CodebookLookupConfig};

/// 展开后的 VQ 表上限 (浮点数个数), 超出视为恶意或损坏的 setup.
const MAX_VQ_TABLE_LEN: usize = 1 << 24;

/// codebook 解码能力.
///
/// residue 与 floor 只依赖此接口, 测试中可用固定向量的桩实现替换.
pub(crate) trait CodebookDecode {
    /// 每个 VQ 向量的维数
    fn dimensions(&self) -> usize;

    /// 读取一个 Huffman 码字, 返回条目号
    fn decode_scalar(&self, br: &mut LsbBitReader<'_>) -> QinResult<u32>;

    /// 读取一个 Huffman 码字, 返回对应的 VQ 向量 (长度为 `dimensions()`)
    fn decode_vector(&self, br: &mut LsbBitReader<'_>) -> QinResult<&[f32]>;
}

#[derive(Debug, Clone)]
pub(crate) struct Codebook {
    dimensions: usize,
    entries: u32,
    huffman: CodebookHuffman,
    vq: Option<Vec<f32>>,
}

impl Codebook {
    pub(crate) fn from_config(config: &CodebookConfig) -> QinResult<Self> {
        let huffman = CodebookHuffman::from_lengths(&config.lengths)?;
        let dimensions = usize::from(config.dimensions);
        let vq = match &config.lookup {
            Some(lookup) => Some(build_vq_table(config.entries, dimensions, lookup)?),
            None => None,
        };
        Ok(Self {
            dimensions,
            entries: config.entries,
            huffman,
            vq,
        })
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> u32 {
        self.entries
    }

    pub(crate) fn has_vq(&self) -> bool {
        self.vq.is_some()
    }
}

impl CodebookDecode for Codebook {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn decode_scalar(&self, br: &mut LsbBitReader<'_>) -> QinResult<u32> {
        let sym = self.huffman.decode_symbol(br)?;
        if sym >= self.entries {
            return Err(QinError::CorruptStream(
                "Vorbis codebook 符号超出 entries".into(),
            ));
        }
        Ok(sym)
    }

    fn decode_vector(&self, br: &mut LsbBitReader<'_>) -> QinResult<&[f32]> {
        let vq = self.vq.as_deref().ok_or_else(|| {
            QinError::CorruptStream("Vorbis 向量 codebook 缺少 value mapping".into())
        })?;
        let sym = self.decode_scalar(br)? as usize;
        let start = sym * self.dimensions;
        vq.get(start..start + self.dimensions)
            .ok_or_else(|| QinError::CorruptStream("Vorbis codebook VQ 条目越界".into()))
    }
}

/// 将 lookup 配置展开为 `entries * dimensions` 的向量表.
fn build_vq_table(
    entries: u32,
    dimensions: usize,
    lookup: &CodebookLookupConfig,
) -> QinResult<Vec<f32>> {
    let total = (entries as usize)
        .checked_mul(dimensions)
        .filter(|&len| len <= MAX_VQ_TABLE_LEN)
        .ok_or_else(|| QinError::CorruptStream("Vorbis codebook VQ 表过大".into()))?;
    if lookup.multiplicands.is_empty() {
        return Err(QinError::CorruptStream(
            "Vorbis codebook multiplicands 为空".into(),
        ));
    }

    let mut table = Vec::with_capacity(total);
    for entry in 0..entries as usize {
        let mut last = 0.0f32;
        let mut index_divisor = 1usize;
        for i in 0..dimensions {
            let m_idx = match lookup.lookup_type {
                1 => (entry / index_divisor) % lookup.lookup_values as usize,
                _ => entry * dimensions + i,
            };
            let mul = lookup.multiplicands.get(m_idx).copied().ok_or_else(|| {
                QinError::CorruptStream("Vorbis codebook multiplicand 越界".into())
            })?;
            let value = lookup.minimum_value + lookup.delta_value * mul as f32 + last;
            if lookup.sequence_p {
                last = value;
            }
            table.push(value);
            if lookup.lookup_type == 1 {
                index_divisor = index_divisor.saturating_mul(lookup.lookup_values as usize);
            }
        }
    }
    Ok(table)
}

/// Vorbis 32 位浮点格式解包 (21 位尾数, 10 位指数, 偏置 788).
pub(crate) fn float32_unpack(x: u32) -> f32 {
    let mut mantissa = f64::from(x & 0x001F_FFFF);
    if x & 0x8000_0000 != 0 {
        mantissa = -mantissa;
    }
    let exponent = ((x & 0x7FE0_0000) >> 21) as i32 - 788;
    (mantissa * 2f64.powi(exponent)) as f32
}

/// lookup type 1 的标量个数: 满足 `v^dimensions <= entries` 的最大 v.
pub(crate) fn lookup1_values(entries: u32, dimensions: u16) -> u32 {
    if entries == 0 || dimensions == 0 {
        return 0;
    }

    let mut lo = 1u32;
    let mut hi = entries;
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if pow_le_entries(mid, u32::from(dimensions), entries) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

fn pow_le_entries(base: u32, exp: u32, entries: u32) -> bool {
    let mut out = 1u128;
    let limit = u128::from(entries);
    for _ in 0..exp {
        out *= u128::from(base);
        if out > limit {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone)]
pub(crate) struct CodebookHuffman {
    max_len: u8,
    nodes: Vec<HuffNode>,
}

impl CodebookHuffman {
    /// 由码长表构建 (0 表示稀疏 codebook 中未使用的条目).
    pub(crate) fn from_lengths(lengths: &[u8]) -> QinResult<Self> {
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        if max_len == 0 {
            return Ok(Self {
                max_len,
                nodes: vec![HuffNode::default()],
            });
        }

        let used: Vec<usize> = lengths
            .iter()
            .enumerate()
            .filter(|(_, len)| **len > 0)
            .map(|(sym, _)| sym)
            .collect();

        // 单条目 codebook: 码长必须为 1, 任意一位都解出该条目.
        if let [only] = used.as_slice() {
            if lengths[*only] != 1 {
                return Err(QinError::CorruptStream(
                    "Vorbis 单项 codebook 的码长必须为 1".into(),
                ));
            }
            let sym = Some(*only as u32);
            let nodes = vec![
                HuffNode {
                    left: Some(1),
                    right: Some(2),
                    sym: None,
                },
                HuffNode {
                    sym,
                    ..HuffNode::default()
                },
                HuffNode {
                    sym,
                    ..HuffNode::default()
                },
            ];
            return Ok(Self { max_len: 1, nodes });
        }

        let mut root = BuildNode::default();
        for sym in used {
            if !root.insert(sym as u32, lengths[sym]) {
                return Err(QinError::CorruptStream(
                    "Vorbis codebook Huffman 长度表过度指定".into(),
                ));
            }
        }
        if !root.full {
            return Err(QinError::CorruptStream(
                "Vorbis codebook Huffman 长度表欠指定".into(),
            ));
        }

        let mut nodes = Vec::new();
        flatten_build_tree(&root, &mut nodes);
        Ok(Self { max_len, nodes })
    }

    pub(crate) fn decode_symbol(&self, br: &mut LsbBitReader<'_>) -> QinResult<u32> {
        let mut node_idx = 0usize;
        for _ in 0..self.max_len {
            let node = &self.nodes[node_idx];
            let next = if br.read_flag() { node.right } else { node.left };
            node_idx = next
                .ok_or_else(|| QinError::CorruptStream("Vorbis Huffman 解码失败".into()))?;
            if let Some(sym) = self.nodes[node_idx].sym {
                return Ok(sym);
            }
        }
        Err(QinError::CorruptStream(
            "Vorbis codebook Huffman 解码失败".into(),
        ))
    }
}

#[derive(Debug, Clone, Default)]
struct HuffNode {
    left: Option<usize>,
    right: Option<usize>,
    sym: Option<u32>,
}

/// 构建期的树节点. 按条目顺序左优先插入, 即每个条目取同长度中最小的可用码字.
#[derive(Debug, Default)]
struct BuildNode {
    /// 子树已无空位
    full: bool,
    sym: Option<u32>,
    left: Option<Box<BuildNode>>,
    right: Option<Box<BuildNode>>,
}

impl BuildNode {
    fn insert(&mut self, payload: u32, depth: u8) -> bool {
        if self.sym.is_some() || self.full {
            return false;
        }
        if depth == 0 {
            if self.left.is_some() || self.right.is_some() {
                return false;
            }
            self.sym = Some(payload);
            self.full = true;
            return true;
        }

        let inserted = Self::insert_child(&mut self.left, payload, depth - 1)
            || Self::insert_child(&mut self.right, payload, depth - 1);
        self.full = self.left.as_ref().is_some_and(|n| n.full)
            && self.right.as_ref().is_some_and(|n| n.full);
        inserted
    }

    fn insert_child(child: &mut Option<Box<BuildNode>>, payload: u32, depth: u8) -> bool {
        match child {
            Some(node) => node.insert(payload, depth),
            None => {
                let mut node = Box::<BuildNode>::default();
                let inserted = node.insert(payload, depth);
                *child = Some(node);
                inserted
            }
        }
    }
}

fn flatten_build_tree(root: &BuildNode, out: &mut Vec<HuffNode>) -> usize {
    let idx = out.len();
    out.push(HuffNode {
        sym: root.sym,
        ..HuffNode::default()
    });
    if let Some(left) = &root.left {
        let left_idx = flatten_build_tree(left, out);
        out[idx].left = Some(left_idx);
    }
    if let Some(right) = &root.right {
        let right_idx = flatten_build_tree(right, out);
        out[idx].right = Some(right_idx);
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huffman_构建与解码() {
        let h = CodebookHuffman::from_lengths(&[1, 2, 2]).expect("构建失败");
        let data = [0b0001_1010u8];
        let mut br = LsbBitReader::new(&data);
        let s0 = h.decode_symbol(&mut br).expect("sym0 解码失败");
        assert_eq!(s0, 0, "第一个符号应为 sym0");
        let s1 = h.decode_symbol(&mut br).expect("sym1 解码失败");
        assert_eq!(s1, 1, "第二个符号应为 sym1");
        let s2 = h.decode_symbol(&mut br).expect("sym2 解码失败");
        assert_eq!(s2, 2, "第三个符号应为 sym2");
    }

    #[test]
    fn test_huffman_官方示例映射() {
        let h = CodebookHuffman::from_lengths(&[2, 4, 4, 4, 4, 2, 3, 3]).expect("构建失败");
        let decode = |bits: u32, len: u8| {
            let mut v = 0u8;
            for i in 0..len {
                if ((bits >> i) & 1) != 0 {
                    v |= 1 << i;
                }
            }
            let buf = [v];
            let mut br = LsbBitReader::new(&buf);
            h.decode_symbol(&mut br).expect("解码失败")
        };
        assert_eq!(decode(0b00, 2), 0);
        assert_eq!(decode(0b0010, 4), 1);
        assert_eq!(decode(0b1010, 4), 2);
        assert_eq!(decode(0b0110, 4), 3);
        assert_eq!(decode(0b1110, 4), 4);
        assert_eq!(decode(0b01, 2), 5);
        assert_eq!(decode(0b011, 3), 6);
        assert_eq!(decode(0b111, 3), 7);
    }

    #[test]
    fn test_huffman_稀疏与单项() {
        // 稀疏表中只有条目 2 被使用
        let h = CodebookHuffman::from_lengths(&[0, 0, 1, 0]).expect("构建失败");
        let mut br = LsbBitReader::new(&[0b10]);
        assert_eq!(h.decode_symbol(&mut br).unwrap(), 2);
        assert_eq!(h.decode_symbol(&mut br).unwrap(), 2);
        assert_eq!(br.bit_position(), 2);

        assert!(CodebookHuffman::from_lengths(&[0, 2]).is_err());
    }

    #[test]
    fn test_huffman_过度与欠指定() {
        assert!(CodebookHuffman::from_lengths(&[1, 1, 1]).is_err());
        assert!(CodebookHuffman::from_lengths(&[1, 2]).is_err());
    }

    #[test]
    fn test_float32_unpack() {
        // 1.0 = 1 * 2^0: 尾数 1, 指数 788
        assert_eq!(float32_unpack((788 << 21) | 1), 1.0);
        // -0.5 = -1 * 2^-1
        assert_eq!(float32_unpack(0x8000_0000 | (787 << 21) | 1), -0.5);
        // 3 * 2^2 = 12
        assert_eq!(float32_unpack((790 << 21) | 3), 12.0);
    }

    #[test]
    fn test_lookup1_values() {
        assert_eq!(lookup1_values(81, 4), 3);
        assert_eq!(lookup1_values(80, 4), 2);
        assert_eq!(lookup1_values(2, 1), 2);
        assert_eq!(lookup1_values(1, 8), 1);
    }

    fn lookup(
        lookup_type: u8,
        sequence_p: bool,
        values: u32,
        mults: &[u32],
    ) -> CodebookLookupConfig {
        CodebookLookupConfig {
            lookup_type,
            minimum_value: -1.0,
            delta_value: 0.5,
            sequence_p,
            lookup_values: values,
            multiplicands: mults.to_vec(),
        }
    }

    #[test]
    fn test_vq_lookup1_展开() {
        // 4 个条目, 2 维, 每维 2 个取值: 条目 e 的第 i 维取 (e / 2^i) % 2
        let table = build_vq_table(4, 2, &lookup(1, false, 2, &[0, 4])).unwrap();
        assert_eq!(table, vec![-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_vq_lookup2_累加序列() {
        let table = build_vq_table(2, 2, &lookup(2, true, 4, &[2, 2, 0, 4])).unwrap();
        // 条目 0: 0.0, 0.0 + 0.0; 条目 1: -1.0, -1.0 + 1.0
        assert_eq!(table, vec![0.0, 0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_decode_vector_缺少_vq() {
        let config = CodebookConfig {
            dimensions: 1,
            entries: 2,
            lengths: vec![1, 1],
            lookup: None,
        };
        let book = Codebook::from_config(&config).unwrap();
        let mut br = LsbBitReader::new(&[0x01]);
        assert!(!book.has_vq());
        assert!(matches!(
            book.decode_vector(&mut br),
            Err(QinError::CorruptStream(_))
        ));
        // 失败的向量解码不消耗位, 随后的标量解码读到码字 "1"
        assert_eq!(book.decode_scalar(&mut br).unwrap(), 1);
    }
}
