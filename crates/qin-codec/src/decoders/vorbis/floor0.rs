//! floor type 0: LSP 包络.

use std::f64::consts::PI;

use qin_core::{QinError, QinResult};

use super::bitreader::{LsbBitReader, ilog};
use super::codebook::CodebookDecode;

#[derive(Debug, Clone)]
pub(crate) struct Floor0Config {
    pub(crate) order: u8,
    pub(crate) amplitude_bits: u8,
    pub(crate) amplitude_offset: u8,
    pub(crate) books: Vec<u8>,
    /// 按 block flag 缓存的 cos(ω), 长度为对应块长的一半
    bark_cos_omega: [Vec<f32>; 2],
}

/// 单个声道单个包的 floor0 解码结果
#[derive(Debug, Clone)]
pub(crate) struct Floor0Data {
    pub(crate) amplitude: u64,
    /// LSP 系数的余弦值
    pub(crate) cos_coefficients: Vec<f32>,
}

impl Floor0Config {
    pub(crate) fn new(
        order: u8,
        rate: u16,
        bark_map_size: u16,
        amplitude_bits: u8,
        amplitude_offset: u8,
        books: Vec<u8>,
        blocksizes: [usize; 2],
    ) -> QinResult<Self> {
        if rate == 0 || bark_map_size == 0 || amplitude_bits == 0 {
            return Err(QinError::CorruptStream(format!(
                "Vorbis floor0 参数非法: rate={rate}, bark_map_size={bark_map_size}, amplitude_bits={amplitude_bits}"
            )));
        }
        let bark_cos_omega = [
            bark_cos_omega(blocksizes[0] / 2, rate, bark_map_size),
            bark_cos_omega(blocksizes[1] / 2, rate, bark_map_size),
        ];
        Ok(Self {
            order,
            amplitude_bits,
            amplitude_offset,
            books,
            bark_cos_omega,
        })
    }

    /// 振幅为 0 表示该声道无信号.
    pub(crate) fn decode<B: CodebookDecode>(
        &self,
        br: &mut LsbBitReader<'_>,
        books: &[B],
    ) -> QinResult<Option<Floor0Data>> {
        let amplitude = br.read_bits_u64(self.amplitude_bits)?;
        if amplitude == 0 {
            return Ok(None);
        }

        let book_number = br.read_bits(ilog(self.books.len() as u32))? as usize;
        let book = self
            .books
            .get(book_number)
            .and_then(|&idx| books.get(usize::from(idx)))
            .ok_or_else(|| {
                QinError::CorruptStream(format!("Vorbis floor0 book 编号越界: {book_number}"))
            })?;

        let order = usize::from(self.order);
        let mut coefficients = Vec::with_capacity(order);
        let mut last = 0.0f32;
        while coefficients.len() < order {
            let vector = book.decode_vector(br)?;
            let Some(&tail) = vector.last() else {
                return Err(QinError::CorruptStream("Vorbis floor0 码本维数为 0".into()));
            };
            let take = vector.len().min(order - coefficients.len());
            coefficients.extend(vector[..take].iter().map(|&v| (last + v).cos()));
            last += tail;
        }

        Ok(Some(Floor0Data {
            amplitude,
            cos_coefficients: coefficients,
        }))
    }

    pub(crate) fn apply(&self, data: &Floor0Data, spectrum: &mut [f32], long: bool) {
        let map = &self.bark_cos_omega[usize::from(long)];
        let n = spectrum.len().min(map.len());
        let offset = f64::from(self.amplitude_offset);
        let scale = data.amplitude as f64 * offset
            / (2f64.powi(i32::from(self.amplitude_bits)) - 1.0);
        let coeffs = &data.cos_coefficients;
        let order = coeffs.len();

        let mut i = 0;
        while i < n {
            let cos_omega = map[i];
            let w = f64::from(cos_omega);
            let (mut p, mut q) = if order % 2 == 1 {
                (1.0 - w * w, 0.25)
            } else {
                ((1.0 - w) / 2.0, (1.0 + w) / 2.0)
            };
            for c in coeffs.iter().skip(1).step_by(2) {
                let d = f64::from(*c) - w;
                p *= 4.0 * d * d;
            }
            for c in coeffs.iter().step_by(2) {
                let d = f64::from(*c) - w;
                q *= 4.0 * d * d;
            }
            let value = (0.115_129_25 * (scale / (p + q).sqrt() - offset)).exp() as f32;

            // bark 映射相同的相邻频点共享同一个曲线值
            while i < n && map[i] == cos_omega {
                spectrum[i] *= value;
                i += 1;
            }
        }
    }
}

fn bark(x: f64) -> f64 {
    13.1 * (0.00074 * x).atan() + 2.24 * (0.000_000_018_5 * x * x).atan() + 0.0001 * x
}

fn bark_cos_omega(n: usize, rate: u16, bark_map_size: u16) -> Vec<f32> {
    let rate = f64::from(rate);
    let size = f64::from(bark_map_size);
    let nyquist_bark = bark(0.5 * rate);
    (0..n)
        .map(|i| {
            let mapped = (bark(rate * i as f64 / (2.0 * n as f64)) * size / nyquist_bark)
                .floor()
                .min(size - 1.0);
            (PI * mapped / size).cos() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 每次读 1 位, 返回固定向量
    struct VectorBook(Vec<f32>);

    impl CodebookDecode for VectorBook {
        fn dimensions(&self) -> usize {
            self.0.len()
        }

        fn decode_scalar(&self, br: &mut LsbBitReader<'_>) -> QinResult<u32> {
            br.read_flag();
            Ok(0)
        }

        fn decode_vector(&self, br: &mut LsbBitReader<'_>) -> QinResult<&[f32]> {
            br.read_flag();
            Ok(&self.0)
        }
    }

    fn floor(order: u8) -> Floor0Config {
        Floor0Config::new(order, 44100, 256, 8, 100, vec![0], [64, 256]).unwrap()
    }

    #[test]
    fn test_bark_映射单调() {
        let map = bark_cos_omega(128, 44100, 256);
        assert_eq!(map.len(), 128);
        assert_eq!(map[0], 1.0);
        assert!(map.windows(2).all(|w| w[1] <= w[0]));
        assert!(map.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_振幅为零表示无信号() {
        let floor = floor(2);
        let books = [VectorBook(vec![0.5])];
        let mut br = LsbBitReader::new(&[0x00, 0xFF]);
        assert!(floor.decode(&mut br, &books).unwrap().is_none());
        assert_eq!(br.bit_position(), 8);
    }

    #[test]
    fn test_系数跨向量累加并截断() {
        let floor = floor(3);
        let books = [VectorBook(vec![0.5, 0.25])];
        // 振幅 0x80, 单本 book 编号占 ilog(1) = 1 位
        let mut br = LsbBitReader::new(&[0x80, 0x00, 0x00]);
        let data = floor.decode(&mut br, &books).unwrap().unwrap();
        assert_eq!(data.amplitude, 0x80);
        let expect = [0.5f32.cos(), 0.25f32.cos(), 0.75f32.cos()];
        assert_eq!(data.cos_coefficients, expect);
        assert_eq!(br.bit_position(), 8 + 1 + 2);
    }

    #[test]
    fn test_book_编号越界() {
        let floor = floor(2);
        let books = [VectorBook(vec![0.5])];
        // book 编号读到 1, 而 book 列表只有 1 项
        let mut br = LsbBitReader::new(&[0x01, 0x01]);
        assert!(matches!(
            floor.decode(&mut br, &books),
            Err(QinError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_曲线按_bark_分段() {
        let floor = floor(3);
        let data = Floor0Data {
            amplitude: 200,
            cos_coefficients: vec![0.9, 0.1, -0.7],
        };
        let mut spectrum = vec![1.0f32; 128];
        floor.apply(&data, &mut spectrum, true);
        assert!(spectrum.iter().all(|v| v.is_finite() && *v > 0.0));

        let map = &floor.bark_cos_omega[1];
        for i in 1..spectrum.len() {
            if map[i] == map[i - 1] {
                assert_eq!(spectrum[i], spectrum[i - 1]);
            }
        }
    }
}
