//! 逆 MDCT.
//!
//! 计算未归一化的 `y[n] = Σ X[k]·cos(2π/N·(n + 1/2 + N/4)·(k + 1/2))`.
//! 实现路径: N/2 点 DCT-IV 经前后旋转化为 N/4 点复数 FFT, 再按 MDCT 对称性展开到 N 点.
//! 旋转因子与位反转表在构造时一次算好, 之后只读, 可跨线程共享.

use std::f64::consts::PI;

use qin_core::{QinError, QinResult};

#[derive(Debug, Clone, Copy, Default)]
struct Complex {
    re: f32,
    im: f32,
}

impl Complex {
    fn mul(self, w: Complex) -> Complex {
        Complex {
            re: self.re * w.re - self.im * w.im,
            im: self.re * w.im + self.im * w.re,
        }
    }
}

/// 某一块长的 IMDCT 查找表
#[derive(Debug, Clone)]
pub struct ImdctLookup {
    n: usize,
    /// DCT-IV 前后旋转 `e^{-iπ(k + 1/8)/(N/2)}`, 共 N/4 项
    twiddle: Vec<Complex>,
    /// FFT 旋转 `e^{-2πik/(N/4)}`, 共 N/8 项
    fft_twiddle: Vec<Complex>,
    bit_reverse: Vec<u32>,
}

impl ImdctLookup {
    /// `n` 为块长 (时域输出长度), 须为不小于 8 的 2 的幂.
    pub fn new(n: usize) -> QinResult<Self> {
        if n < 8 || !n.is_power_of_two() {
            return Err(QinError::InvalidArgument(format!(
                "IMDCT 块长必须为不小于 8 的 2 的幂: {n}"
            )));
        }
        let half = n / 2;
        let quarter = n / 4;

        let twiddle = (0..quarter)
            .map(|k| {
                let angle = -PI * (k as f64 + 0.125) / half as f64;
                Complex {
                    re: angle.cos() as f32,
                    im: angle.sin() as f32,
                }
            })
            .collect();
        let fft_twiddle = (0..quarter / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f64 / quarter as f64;
                Complex {
                    re: angle.cos() as f32,
                    im: angle.sin() as f32,
                }
            })
            .collect();
        let bits = quarter.trailing_zeros();
        let bit_reverse = (0..quarter as u32)
            .map(|i| if bits == 0 { 0 } else { i.reverse_bits() >> (32 - bits) })
            .collect();

        Ok(Self {
            n,
            twiddle,
            fft_twiddle,
            bit_reverse,
        })
    }

    pub fn block_size(&self) -> usize {
        self.n
    }

    /// `spectrum` 至少 N/2 项, `out` 至少 N 项; 不分配内存.
    pub fn inverse(&self, spectrum: &[f32], out: &mut [f32]) {
        let n = self.n;
        let half = n / 2;
        let quarter = n / 4;
        let spectrum = &spectrum[..half];
        let out = &mut out[..n];

        // 后半段暂存复数 FFT 缓冲区 (N/4 个复数 = N/2 个浮点)
        let (u, work) = out.split_at_mut(half);
        for k in 0..quarter {
            let v = Complex {
                re: spectrum[2 * k],
                im: spectrum[half - 1 - 2 * k],
            }
            .mul(self.twiddle[k]);
            let dst = self.bit_reverse[k] as usize;
            work[2 * dst] = v.re;
            work[2 * dst + 1] = v.im;
        }
        self.fft_in_place(work);

        // DCT-IV 结果 u 写入前半段
        for k in 0..quarter {
            let y = Complex {
                re: work[2 * k],
                im: work[2 * k + 1],
            }
            .mul(self.twiddle[k]);
            u[2 * k] = y.re;
            u[half - 1 - 2 * k] = -y.im;
        }

        // 展开: y[n] = u[n + N/4] (n < N/4), -u[3N/4 - 1 - n] (N/4 <= n < 3N/4), -u[n - 3N/4]
        // 先写只依赖 u[..N/4] 的后半段, 再原位重排前半段
        let (head, tail) = out.split_at_mut(half);
        for i in 0..quarter {
            tail[i] = -head[quarter - 1 - i];
            tail[quarter + i] = -head[i];
        }
        head.copy_within(quarter..half, 0);
        for i in 0..quarter {
            head[quarter + i] = -head[quarter - 1 - i];
        }
    }

    fn fft_in_place(&self, buf: &mut [f32]) {
        let size = self.n / 4;
        let mut len = 2;
        while len <= size {
            let half = len / 2;
            let step = size / len;
            for start in (0..size).step_by(len) {
                for j in 0..half {
                    let w = self.fft_twiddle[j * step];
                    let a = start + j;
                    let b = a + half;
                    let t = Complex {
                        re: buf[2 * b],
                        im: buf[2 * b + 1],
                    }
                    .mul(w);
                    let (ar, ai) = (buf[2 * a], buf[2 * a + 1]);
                    buf[2 * a] = ar + t.re;
                    buf[2 * a + 1] = ai + t.im;
                    buf[2 * b] = ar - t.re;
                    buf[2 * b + 1] = ai - t.im;
                }
            }
            len *= 2;
        }
    }
}
