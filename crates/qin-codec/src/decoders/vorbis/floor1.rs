//! floor type 1: 分段线性包络.
//!
//! 解码阶段只读出各点的原始 Y 值, 振幅恢复与曲线绘制推迟到 `apply`,
//! 以便 residue 之前就能确定声道是否有信号.

use qin_core::{QinError, QinResult};

use super::bitreader::{LsbBitReader, ilog};
use super::codebook::CodebookDecode;

/// X 列表长度上限 (含两个隐式端点)
pub(crate) const MAX_FLOOR1_VALUES: usize = 65;

/// 按 multiplier (1..=4) 索引的 Y 取值范围
const FLOOR1_RANGES: [i32; 4] = [256, 128, 86, 64];

#[derive(Debug, Clone)]
pub(crate) struct Floor1Class {
    pub(crate) dimensions: u8,
    pub(crate) subclasses: u8,
    pub(crate) masterbook: Option<u8>,
    pub(crate) subclass_books: Vec<Option<u8>>,
}

#[derive(Debug, Clone)]
pub(crate) struct Floor1Config {
    pub(crate) partition_classes: Vec<u8>,
    pub(crate) classes: Vec<Floor1Class>,
    pub(crate) multiplier: u8,
    pub(crate) x_list: Vec<u32>,
    /// 按 X 升序排列的点下标
    sorted: Vec<usize>,
    /// 每个点 (下标 >= 2) 的低/高邻点下标
    neighbors: Vec<(usize, usize)>,
}

impl Floor1Config {
    pub(crate) fn new(
        partition_classes: Vec<u8>,
        classes: Vec<Floor1Class>,
        multiplier: u8,
        x_list: Vec<u32>,
    ) -> QinResult<Self> {
        if !(1..=4).contains(&multiplier) {
            return Err(QinError::CorruptStream(format!(
                "Vorbis floor1 multiplier 非法: {multiplier}"
            )));
        }
        if x_list.len() < 2 || x_list.len() > MAX_FLOOR1_VALUES {
            return Err(QinError::CorruptStream(format!(
                "Vorbis floor1 点数非法: {}",
                x_list.len()
            )));
        }

        let mut sorted: Vec<usize> = (0..x_list.len()).collect();
        sorted.sort_by_key(|&i| x_list[i]);
        if sorted.windows(2).any(|w| x_list[w[0]] == x_list[w[1]]) {
            return Err(QinError::CorruptStream("Vorbis floor1 X 坐标重复".into()));
        }

        let neighbors = (0..x_list.len())
            .map(|i| if i < 2 { (0, 1) } else { find_neighbors(&x_list, i) })
            .collect();

        Ok(Self {
            partition_classes,
            classes,
            multiplier,
            x_list,
            sorted,
            neighbors,
        })
    }

    fn range(&self) -> i32 {
        FLOOR1_RANGES[usize::from(self.multiplier - 1)]
    }

    /// 读取本包的原始 Y 值, 首位为 0 表示该声道无信号.
    pub(crate) fn decode<B: CodebookDecode>(
        &self,
        br: &mut LsbBitReader<'_>,
        books: &[B],
    ) -> QinResult<Option<Vec<u32>>> {
        if !br.read_flag() {
            return Ok(None);
        }

        let y_bits = ilog((self.range() - 1) as u32);
        let mut y = Vec::with_capacity(self.x_list.len());
        y.push(br.read_bits(y_bits)?);
        y.push(br.read_bits(y_bits)?);

        for &class_num in &self.partition_classes {
            let class = &self.classes[usize::from(class_num)];
            let cbits = class.subclasses;
            let csub = (1u32 << cbits) - 1;
            let mut cval = match class.masterbook {
                Some(book) if cbits > 0 => book_at(books, book)?.decode_scalar(br)?,
                _ => 0,
            };
            for _ in 0..class.dimensions {
                let book = class.subclass_books[(cval & csub) as usize];
                cval >>= cbits;
                let value = match book {
                    Some(book) => book_at(books, book)?.decode_scalar(br)?,
                    None => 0,
                };
                y.push(value);
            }
        }
        Ok(Some(y))
    }

    /// 恢复振幅并将曲线乘到频谱上.
    pub(crate) fn apply(&self, y: &[u32], spectrum: &mut [f32]) {
        let count = self.x_list.len().min(y.len());
        let mut final_y = [0i32; MAX_FLOOR1_VALUES];
        let mut step2 = [false; MAX_FLOOR1_VALUES];
        self.compute_amplitude(&y[..count], &mut final_y[..count], &mut step2[..count]);

        let n = spectrum.len() as u32;
        let mult = i32::from(self.multiplier);
        let mut lx = 0u32;
        let mut ly = final_y[self.sorted[0]] * mult;
        let mut hx = 0u32;
        let mut hy = 0i32;
        for &idx in self.sorted.iter().skip(1).filter(|&&idx| idx < count) {
            if !step2[idx] {
                continue;
            }
            hy = final_y[idx] * mult;
            hx = self.x_list[idx];
            render_line(lx, ly, hx, hy, spectrum);
            lx = hx;
            ly = hy;
        }
        if hx < n {
            render_line(hx, hy, n, hy, spectrum);
        }
    }

    fn compute_amplitude(&self, y: &[u32], final_y: &mut [i32], step2: &mut [bool]) {
        let range = self.range();
        for i in 0..y.len().min(2) {
            final_y[i] = y[i] as i32;
            step2[i] = true;
        }

        for i in 2..y.len() {
            let (low, high) = self.neighbors[i];
            let predicted = render_point(
                self.x_list[low] as i32,
                final_y[low],
                self.x_list[high] as i32,
                final_y[high],
                self.x_list[i] as i32,
            );
            let val = y[i] as i32;
            if val == 0 {
                step2[i] = false;
                final_y[i] = predicted;
                continue;
            }

            step2[low] = true;
            step2[high] = true;
            step2[i] = true;
            let highroom = range - predicted;
            let lowroom = predicted;
            let room = 2 * highroom.min(lowroom);
            final_y[i] = if val >= room {
                if highroom > lowroom {
                    val - lowroom + predicted
                } else {
                    predicted - val + highroom - 1
                }
            } else if val & 1 == 1 {
                predicted - ((val + 1) >> 1)
            } else {
                predicted + (val >> 1)
            };
        }

        for v in final_y.iter_mut() {
            *v = (*v).clamp(0, range - 1);
        }
    }
}

fn book_at<B: CodebookDecode>(books: &[B], idx: u8) -> QinResult<&B> {
    books
        .get(usize::from(idx))
        .ok_or_else(|| QinError::CorruptStream("Vorbis floor1 codebook 索引越界".into()))
}

/// 在下标 i 之前的点中找 X 最接近且分居两侧的低/高邻点.
fn find_neighbors(x_list: &[u32], i: usize) -> (usize, usize) {
    let xi = x_list[i];
    let mut low = (0usize, 0u32);
    let mut high = (1usize, u32::MAX);
    for (j, &xj) in x_list.iter().enumerate().take(i) {
        if xj < xi && xj >= low.1 {
            low = (j, xj);
        }
        if xj > xi && xj <= high.1 {
            high = (j, xj);
        }
    }
    (low.0, high.0)
}

fn render_point(x0: i32, y0: i32, x1: i32, y1: i32, x: i32) -> i32 {
    if x1 == x0 {
        return y0;
    }
    let dy = y1 - y0;
    let adx = x1 - x0;
    let off = dy.abs() * (x - x0) / adx;
    if dy < 0 { y0 - off } else { y0 + off }
}

/// 整数 Bresenham 画线, 将 [x0, x1) 区间的曲线值乘到频谱上.
fn render_line(x0: u32, y0: i32, x1: u32, y1: i32, spectrum: &mut [f32]) {
    if x1 <= x0 {
        return;
    }
    let dy = y1 - y0;
    let adx = (x1 - x0) as i32;
    let base = dy / adx;
    let ady = dy.abs() - base.abs() * adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let end = x1.min(spectrum.len() as u32);

    let mut y = y0;
    let mut err = 0i32;
    for x in x0..end {
        if x > x0 {
            err += ady;
            if err >= adx {
                err -= adx;
                y += sy;
            } else {
                y += base;
            }
        }
        spectrum[x as usize] *= FLOOR1_INVERSE_DB_TABLE[y.clamp(0, 255) as usize];
    }
}

#[rustfmt::skip]
#[allow(clippy::excessive_precision)]
static FLOOR1_INVERSE_DB_TABLE: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07, 1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07, 2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07, 3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07, 6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07, 1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06, 1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06, 2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06, 4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06, 7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05, 1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05, 2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05, 3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05, 5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05, 9.5602426e-05, 1.0181521e-04, 1.0843174e-04, 1.1547824e-04,
    1.2298267e-04, 1.3097477e-04, 1.3948625e-04, 1.4855085e-04, 1.5820453e-04, 1.6848555e-04, 1.7943469e-04, 1.9109536e-04,
    2.0351382e-04, 2.1673929e-04, 2.3082423e-04, 2.4582449e-04, 2.6179955e-04, 2.7881275e-04, 2.9693158e-04, 3.1622787e-04,
    3.3677814e-04, 3.5866388e-04, 3.8197188e-04, 4.0679456e-04, 4.3323036e-04, 4.6138411e-04, 4.9136745e-04, 5.2329927e-04,
    5.5730621e-04, 5.9352311e-04, 6.3209358e-04, 6.7317058e-04, 7.1691700e-04, 7.6350630e-04, 8.1312324e-04, 8.6596457e-04,
    9.2223983e-04, 9.8217216e-04, 1.0459992e-03, 1.1139742e-03, 1.1863665e-03, 1.2634633e-03, 1.3455702e-03, 1.4330129e-03,
    1.5261382e-03, 1.6253153e-03, 1.7309374e-03, 1.8434235e-03, 1.9632195e-03, 2.0908006e-03, 2.2266726e-03, 2.3713743e-03,
    2.5254795e-03, 2.6895994e-03, 2.8643847e-03, 3.0505286e-03, 3.2487691e-03, 3.4598925e-03, 3.6847358e-03, 3.9241906e-03,
    4.1792066e-03, 4.4507950e-03, 4.7400328e-03, 5.0480668e-03, 5.3761186e-03, 5.7254891e-03, 6.0975636e-03, 6.4938176e-03,
    6.9158225e-03, 7.3652516e-03, 7.8438871e-03, 8.3536271e-03, 8.8964928e-03, 9.4746370e-03, 1.0090352e-02, 1.0746080e-02,
    1.1444421e-02, 1.2188144e-02, 1.2980198e-02, 1.3823725e-02, 1.4722068e-02, 1.5678791e-02, 1.6697687e-02, 1.7782797e-02,
    1.8938423e-02, 2.0169149e-02, 2.1479854e-02, 2.2875735e-02, 2.4362330e-02, 2.5945531e-02, 2.7631618e-02, 2.9427276e-02,
    3.1339626e-02, 3.3376252e-02, 3.5545228e-02, 3.7855157e-02, 4.0315199e-02, 4.2935108e-02, 4.5725273e-02, 4.8696758e-02,
    5.1861348e-02, 5.5231591e-02, 5.8820850e-02, 6.2643361e-02, 6.6714279e-02, 7.1049749e-02, 7.5666962e-02, 8.0584227e-02,
    8.5821044e-02, 9.1398179e-02, 9.7337747e-02, 1.0366330e-01, 1.1039993e-01, 1.1757434e-01, 1.2521498e-01, 1.3335215e-01,
    1.4201813e-01, 1.5124727e-01, 1.6107617e-01, 1.7154380e-01, 1.8269168e-01, 1.9456402e-01, 2.0720788e-01, 2.2067342e-01,
    2.3501402e-01, 2.5028656e-01, 2.6655159e-01, 2.8387361e-01, 3.0232132e-01, 3.2196786e-01, 3.4289114e-01, 3.6517414e-01,
    3.8890521e-01, 4.1417847e-01, 4.4109412e-01, 4.6975890e-01, 5.0028648e-01, 5.3279791e-01, 5.6742212e-01, 6.0429640e-01,
    6.4356699e-01, 6.8538959e-01, 7.2993007e-01, 7.7736504e-01, 8.2788260e-01, 8.8168307e-01, 9.3897980e-01, 1.0,
];
