//! residue 解码: 分区分类 + 多趟级联 VQ.
//!
//! 三种类型共用同一套分区/分类/级联流程, 区别只在向量落点:
//! - type 0: 分区内按 `partition_size / dimensions` 步长交错放置
//! - type 1: 分区内顺序放置
//! - type 2: 所有声道先交错成一条虚拟向量按 type 1 解码, 再拆回各声道

use qin_core::{QinError, QinResult};

use super::bitreader::LsbBitReader;
use super::codebook::CodebookDecode;

/// 级联趟数
const PASSES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResidueKind {
    Interleaved,
    Sequential,
    ChannelInterleaved,
}

impl ResidueKind {
    pub(crate) fn from_type(residue_type: u32) -> QinResult<Self> {
        match residue_type {
            0 => Ok(Self::Interleaved),
            1 => Ok(Self::Sequential),
            2 => Ok(Self::ChannelInterleaved),
            other => Err(QinError::CorruptStream(format!(
                "Vorbis residue_type 不支持: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResidueConfig {
    pub(crate) kind: ResidueKind,
    pub(crate) begin: u32,
    pub(crate) end: u32,
    pub(crate) partition_size: u32,
    /// 分类数 (1..=64)
    pub(crate) classifications: u8,
    pub(crate) classbook: u8,
    /// `books[class][pass]`, `None` 表示该趟跳过
    pub(crate) books: Vec<[Option<u8>; PASSES]>,
}

/// 跨包复用的 residue 缓冲区
#[derive(Debug, Default)]
pub(crate) struct ResidueScratch {
    classifications: Vec<u8>,
    interleave: Vec<f32>,
}

impl ResidueConfig {
    /// 解码一个 submap 的 residue, 累加到 `vectors` (每个声道长度为 `n`).
    ///
    /// `do_not_decode[j]` 为 true 的声道不读取任何位, 向量保持原值.
    pub(crate) fn decode<B: CodebookDecode>(
        &self,
        br: &mut LsbBitReader<'_>,
        books: &[B],
        do_not_decode: &[bool],
        n: usize,
        vectors: &mut [&mut [f32]],
        scratch: &mut ResidueScratch,
    ) -> QinResult<()> {
        let ResidueScratch {
            classifications,
            interleave,
        } = scratch;

        if self.kind != ResidueKind::ChannelInterleaved {
            return self.decode_partitions(br, books, do_not_decode, n, vectors, classifications);
        }

        let ch = vectors.len();
        if ch == 0 || do_not_decode.iter().take(ch).all(|&flag| flag) {
            return Ok(());
        }
        let total = n * ch;
        interleave.clear();
        interleave.resize(total, 0.0);
        self.decode_partitions(
            br,
            books,
            &[false],
            total,
            &mut [interleave.as_mut_slice()],
            classifications,
        )?;

        for (j, vector) in vectors.iter_mut().enumerate() {
            for (i, slot) in vector.iter_mut().take(n).enumerate() {
                *slot += interleave[j + i * ch];
            }
        }
        Ok(())
    }

    fn decode_partitions<B: CodebookDecode>(
        &self,
        br: &mut LsbBitReader<'_>,
        books: &[B],
        do_not_decode: &[bool],
        size: usize,
        vectors: &mut [&mut [f32]],
        classifications: &mut Vec<u8>,
    ) -> QinResult<()> {
        let begin = (self.begin as usize).min(size);
        let end = (self.end as usize).min(size);
        let psize = self.partition_size as usize;
        if end <= begin || psize == 0 {
            return Ok(());
        }
        let partitions = (end - begin) / psize;
        if partitions == 0 {
            return Ok(());
        }

        let classbook = book_at(books, self.classbook)?;
        let per_codeword = classbook.dimensions();
        if per_codeword == 0 {
            return Err(QinError::CorruptStream(
                "Vorbis residue classbook 维数为 0".into(),
            ));
        }
        let class_count = u32::from(self.classifications.max(1));
        let ch = vectors.len();
        let stride = partitions + per_codeword;
        classifications.clear();
        classifications.resize(ch * stride, 0);

        for pass in 0..PASSES {
            let mut partition = 0usize;
            while partition < partitions {
                if pass == 0 {
                    for j in 0..ch {
                        if skip(do_not_decode, j) {
                            continue;
                        }
                        // 高位对应靠前的分区
                        let mut temp = classbook.decode_scalar(br)?;
                        for i in (0..per_codeword).rev() {
                            classifications[j * stride + partition + i] =
                                (temp % class_count) as u8;
                            temp /= class_count;
                        }
                    }
                }

                for _ in 0..per_codeword {
                    if partition >= partitions {
                        break;
                    }
                    for (j, vector) in vectors.iter_mut().enumerate() {
                        if skip(do_not_decode, j) {
                            continue;
                        }
                        let class = usize::from(classifications[j * stride + partition]);
                        let Some(book) = self.books.get(class).and_then(|passes| passes[pass])
                        else {
                            continue;
                        };
                        let offset = begin + partition * psize;
                        self.decode_partition(br, book_at(books, book)?, vector, offset, psize)?;
                    }
                    partition += 1;
                }
            }
        }
        Ok(())
    }

    fn decode_partition<B: CodebookDecode>(
        &self,
        br: &mut LsbBitReader<'_>,
        book: &B,
        vector: &mut [f32],
        offset: usize,
        psize: usize,
    ) -> QinResult<()> {
        match self.kind {
            ResidueKind::Interleaved => {
                let step = psize / book.dimensions().max(1);
                for i in 0..step {
                    let values = book.decode_vector(br)?;
                    for (k, &v) in values.iter().enumerate() {
                        add_at(vector, offset + i + k * step, v);
                    }
                }
            }
            ResidueKind::Sequential | ResidueKind::ChannelInterleaved => {
                let mut i = 0usize;
                while i < psize {
                    let values = book.decode_vector(br)?;
                    if values.is_empty() {
                        return Err(QinError::CorruptStream(
                            "Vorbis residue 码本维数为 0".into(),
                        ));
                    }
                    for &v in values {
                        add_at(vector, offset + i, v);
                        i += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

fn skip(do_not_decode: &[bool], ch: usize) -> bool {
    do_not_decode.get(ch).copied().unwrap_or(false)
}

/// 越界写入直接丢弃
fn add_at(vector: &mut [f32], idx: usize, v: f32) {
    if let Some(slot) = vector.get_mut(idx) {
        *slot += v;
    }
}

fn book_at<B: CodebookDecode>(books: &[B], idx: u8) -> QinResult<&B> {
    books
        .get(usize::from(idx))
        .ok_or_else(|| QinError::CorruptStream("Vorbis residue codebook 索引越界".into()))
}
