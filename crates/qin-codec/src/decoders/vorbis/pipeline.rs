//! 单个音频包的解码流水线.
//!
//! 读包头 -> floor -> residue -> 反耦合 -> 应用 floor -> IMDCT -> 加窗/重叠 -> 输出.
//!
//! 跨包状态只有各声道的重叠尾段 (`OverlapState`). 调用方把上一包的状态移交进来,
//! 成功时换回新的状态; 失败时旧状态随之丢弃, 下一包按流中断后的首包处理.

use qin_core::{QinError, QinResult};

use super::bitreader::{LsbBitReader, ilog};
use super::coupling::{apply_inverse_coupling, propagate_signal};
use super::floor::FloorData;
use super::residue::ResidueScratch;
use super::tables::StreamTables;
use super::window::overlap_add;

/// 每个声道留给下一包的加窗尾段
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct OverlapState {
    tails: Vec<Vec<f32>>,
}

impl OverlapState {
    pub(crate) fn channels(&self) -> usize {
        self.tails.len()
    }

    #[cfg(test)]
    pub(crate) fn tail_len(&self) -> usize {
        self.tails.first().map_or(0, Vec::len)
    }
}

/// 解码器私有的工作缓冲区, 按流的最大块长一次分配
#[derive(Debug, Default)]
pub(crate) struct ScratchArena {
    /// 每声道 `blocksize1 / 2` 个频点
    spectra: Vec<Vec<f32>>,
    /// IMDCT 输出, `blocksize1` 个采样
    time: Vec<f32>,
    residue: ResidueScratch,
    floors: Vec<Option<FloorData>>,
    no_signal: Vec<bool>,
    do_not_decode: Vec<bool>,
}

impl ScratchArena {
    pub(crate) fn new(channels: usize, blocksize1: usize) -> Self {
        Self {
            spectra: vec![vec![0.0; blocksize1 / 2]; channels],
            time: vec![0.0; blocksize1],
            residue: ResidueScratch::default(),
            floors: vec![None; channels],
            no_signal: vec![false; channels],
            do_not_decode: Vec::with_capacity(channels),
        }
    }

    fn reset(&mut self, n: usize) {
        for spectrum in &mut self.spectra {
            spectrum[..n].fill(0.0);
        }
        self.floors.fill(None);
        self.no_signal.fill(false);
    }
}

/// 解码一个音频包, 返回 `(各声道输出采样, 新的重叠状态)`.
///
/// `prev` 为 `None` 时 (流开始、出错或中断之后) 本包只建立重叠状态, 输出 0 个采样.
pub(crate) fn decode_packet(
    tables: &StreamTables,
    data: &[u8],
    prev: Option<OverlapState>,
    scratch: &mut ScratchArena,
) -> QinResult<(Vec<Vec<f32>>, OverlapState)> {
    let channels = tables.channels();
    if let Some(prev) = &prev
        && prev.channels() != channels
    {
        return Err(QinError::Config(format!(
            "Vorbis 重叠状态声道数不一致: 状态 {}, 流 {}",
            prev.channels(),
            channels
        )));
    }
    if scratch.spectra.len() != channels {
        return Err(QinError::Internal("Vorbis 工作缓冲区声道数不一致".into()));
    }

    let setup = &tables.setup;
    let mut br = LsbBitReader::new(data);
    if br.read_flag() {
        return Err(QinError::CorruptStream("Vorbis 音频包首位必须为 0".into()));
    }

    let mode_bits = ilog(setup.modes.len() as u32 - 1);
    let mode_number = br.read_bits(mode_bits)? as usize;
    let mode = setup.modes.get(mode_number).ok_or_else(|| {
        QinError::CorruptStream(format!("Vorbis mode 索引越界: {}", mode_number))
    })?;
    let long = mode.block_flag;
    let (prev_long, next_long) = if long {
        (br.read_flag(), br.read_flag())
    } else {
        (false, false)
    };
    let bs = tables.blocksize(long);
    let n = bs / 2;
    let mapping = &setup.mappings[usize::from(mode.mapping)];

    scratch.reset(n);

    for ch in 0..channels {
        let submap = mapping.submaps[usize::from(mapping.mux[ch])];
        let floor = &setup.floors[usize::from(submap.floor)];
        let decoded = floor.decode(&mut br, &setup.codebooks)?;
        scratch.no_signal[ch] = decoded.is_none();
        scratch.floors[ch] = decoded;
    }

    // 耦合对中任一声道有信号, 两个声道都要解码 residue
    propagate_signal(&mapping.coupling, &mut scratch.no_signal);

    {
        let ScratchArena {
            spectra,
            residue: residue_scratch,
            no_signal,
            do_not_decode,
            ..
        } = &mut *scratch;
        for (submap_idx, submap) in mapping.submaps.iter().enumerate() {
            let residue = &setup.residues[usize::from(submap.residue)];
            do_not_decode.clear();
            let mut vectors = Vec::with_capacity(channels);
            for (ch, spectrum) in spectra.iter_mut().enumerate() {
                if usize::from(mapping.mux[ch]) == submap_idx {
                    do_not_decode.push(no_signal[ch]);
                    vectors.push(&mut spectrum[..n]);
                }
            }
            residue.decode(
                &mut br,
                &setup.codebooks,
                do_not_decode,
                n,
                &mut vectors,
                residue_scratch,
            )?;
        }
    }

    apply_inverse_coupling(&mapping.coupling, &mut scratch.spectra, n)?;

    for ch in 0..channels {
        let spectrum = &mut scratch.spectra[ch][..n];
        match &scratch.floors[ch] {
            Some(floor_data) => {
                let submap = mapping.submaps[usize::from(mapping.mux[ch])];
                setup.floors[usize::from(submap.floor)].apply(floor_data, spectrum, long)?;
            }
            // floor 未使用的声道输出静音
            None => spectrum.fill(0.0),
        }
    }

    let imdct = &tables.imdct[usize::from(long)];
    let prev_tails = prev.map(|state| state.tails);
    let mut output = Vec::with_capacity(channels);
    let mut tails = Vec::with_capacity(channels);
    for ch in 0..channels {
        let time = &mut scratch.time[..bs];
        imdct.inverse(&scratch.spectra[ch][..n], time);
        let span = tables.windows.apply(time, long, prev_long, next_long);
        tails.push(time[span.center..span.end].to_vec());

        if let Some(prev_tails) = &prev_tails {
            let mut head = time[span.start..span.center].to_vec();
            overlap_add(&mut head, &prev_tails[ch])?;
            output.push(head);
        }
    }

    if prev_tails.is_none() {
        output = vec![Vec::new(); channels];
    }
    Ok((output, OverlapState { tails }))
}
