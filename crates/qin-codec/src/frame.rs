//! 解码后的音频帧.
//!
//! 解码器输出 32 位浮点平面数据, 每个声道一个 Vec, 声道按码流顺序排列.

/// 音频帧
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// 平面采样数据, 每声道一个 Vec, 长度均为 `nb_samples`
    pub data: Vec<Vec<f32>>,
    /// 本帧包含的采样数 (每声道)
    pub nb_samples: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u8,
}

impl AudioFrame {
    /// 由各声道采样创建音频帧
    pub fn new(data: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let nb_samples = data.first().map_or(0, Vec::len) as u32;
        let channels = data.len() as u8;
        Self {
            data,
            nb_samples,
            sample_rate,
            channels,
        }
    }

    /// 帧时长 (秒)
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        f64::from(self.nb_samples) / f64::from(self.sample_rate)
    }

    /// 按声道交错后的采样迭代器
    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.nb_samples as usize)
            .flat_map(move |i| self.data.iter().map(move |ch| ch.get(i).copied().unwrap_or(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_交错输出() {
        let frame = AudioFrame::new(vec![vec![1.0, 2.0], vec![-1.0, -2.0]], 8000);
        assert_eq!(frame.nb_samples, 2);
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.interleaved().collect::<Vec<_>>(), vec![1.0, -1.0, 2.0, -2.0]);
        assert!((frame.duration_secs() - 0.00025).abs() < 1e-12);
    }
}
