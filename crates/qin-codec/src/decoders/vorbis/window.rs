//! Vorbis 加窗与重叠相加.
//!
//! 长块若与短块相邻, 对应一侧只在中间 `blocksize0 / 2` 的区间内使用短窗斜坡,
//! 外侧的 `blocksize1 / 4 - blocksize0 / 4` 个样本清零. 每个块加窗后分为两段:
//! 与上一块尾部相加后输出的前段, 以及留给下一块的尾段.

use std::f64::consts::FRAC_PI_2;

use qin_core::{QinError, QinResult};

/// `w(i) = sin(π/2 · sin²(π/2 · (i + 1/2) / (size/2)))`, 长度为 `size`.
pub fn build_window(size: usize) -> Vec<f32> {
    let half = (size / 2).max(1) as f64;
    (0..size)
        .map(|i| {
            let s = (FRAC_PI_2 * (i as f64 + 0.5) / half).sin();
            (FRAC_PI_2 * s * s).sin() as f32
        })
        .collect()
}

/// 加窗后块内的区间划分: `[start, center)` 为输出前段, `[center, end)` 为尾段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockSpan {
    pub(crate) start: usize,
    pub(crate) center: usize,
    pub(crate) end: usize,
}

impl BlockSpan {
    #[cfg(test)]
    pub(crate) fn head_len(&self) -> usize {
        self.center - self.start
    }
}

/// 短/长两种块长的窗表
#[derive(Debug, Clone)]
pub(crate) struct WindowTables {
    short: Vec<f32>,
    long: Vec<f32>,
}

impl WindowTables {
    pub(crate) fn new(blocksize0: usize, blocksize1: usize) -> Self {
        Self {
            short: build_window(blocksize0),
            long: build_window(blocksize1),
        }
    }

    fn blocksize0(&self) -> usize {
        self.short.len()
    }

    fn blocksize1(&self) -> usize {
        self.long.len()
    }

    /// 对 IMDCT 输出原位加窗, 返回区间划分.
    ///
    /// `prev_long`/`next_long` 仅对长块有意义, 表示相邻块是否也是长块.
    pub(crate) fn apply(
        &self,
        block: &mut [f32],
        long: bool,
        prev_long: bool,
        next_long: bool,
    ) -> BlockSpan {
        if !long {
            let bs = self.blocksize0();
            for (v, w) in block[..bs].iter_mut().zip(&self.short) {
                *v *= w;
            }
            return BlockSpan {
                start: 0,
                center: bs / 2,
                end: bs,
            };
        }

        let bs = self.blocksize1();
        let center = bs / 2;
        let short_center = self.blocksize0() / 2;
        let offset = bs / 4 - self.blocksize0() / 4;
        let block = &mut block[..bs];

        if prev_long {
            for (v, w) in block[..center].iter_mut().zip(&self.long) {
                *v *= w;
            }
        } else {
            block[..offset].fill(0.0);
            let ramp = &mut block[offset..offset + short_center];
            for (v, w) in ramp.iter_mut().zip(&self.short) {
                *v *= w;
            }
        }

        if next_long {
            for (v, w) in block[center..].iter_mut().zip(&self.long[center..]) {
                *v *= w;
            }
        } else {
            let ramp_start = center + offset;
            let ramp = &mut block[ramp_start..ramp_start + short_center];
            for (v, w) in ramp.iter_mut().zip(&self.short[short_center..]) {
                *v *= w;
            }
            block[ramp_start + short_center..].fill(0.0);
        }

        BlockSpan {
            start: if prev_long { 0 } else { offset },
            center: center + if next_long { 0 } else { offset },
            end: bs - if next_long { 0 } else { offset },
        }
    }
}

/// 将上一块保留的尾段加到本块输出前段的开头.
///
/// 尾段比前段长说明块长标志前后矛盾, 视为码流损坏.
pub(crate) fn overlap_add(head: &mut [f32], prev_tail: &[f32]) -> QinResult<()> {
    if prev_tail.len() > head.len() {
        return Err(QinError::CorruptStream(format!(
            "Vorbis 重叠区长度不匹配: 上一块尾段 {}, 本块前段 {}",
            prev_tail.len(),
            head.len()
        )));
    }
    for (h, p) in head.iter_mut().zip(prev_tail) {
        *h += p;
    }
    Ok(())
}
