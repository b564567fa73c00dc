//! 声道耦合: 幅度/角度平方极坐标反变换.

use qin_core::{QinError, QinResult};

/// 一个耦合步骤, 两个声道下标在 setup 阶段已保证不同且在范围内
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CouplingStep {
    pub(crate) magnitude: u8,
    pub(crate) angle: u8,
}

/// 单个频点的反变换, 返回 `(新幅度, 新角度)`.
pub(crate) fn inverse_couple(m: f32, a: f32) -> (f32, f32) {
    if m > 0.0 {
        if a > 0.0 { (m, m - a) } else { (m + a, m) }
    } else if a > 0.0 {
        (m, m + a)
    } else {
        (m - a, m)
    }
}

/// 只要耦合对中任一声道有信号, 两个声道都需要解码 residue.
pub(crate) fn propagate_signal(steps: &[CouplingStep], no_signal: &mut [bool]) {
    for step in steps {
        let m = usize::from(step.magnitude);
        let a = usize::from(step.angle);
        if m >= no_signal.len() || a >= no_signal.len() {
            continue;
        }
        if !no_signal[m] || !no_signal[a] {
            no_signal[m] = false;
            no_signal[a] = false;
        }
    }
}

/// 按声明的逆序原位执行所有耦合步骤, 每个声道只处理前 `n` 个频点.
pub(crate) fn apply_inverse_coupling(
    steps: &[CouplingStep],
    spectra: &mut [Vec<f32>],
    n: usize,
) -> QinResult<()> {
    for step in steps.iter().rev() {
        let (magnitude, angle) = channel_pair(spectra, step)?;
        for (m, a) in magnitude.iter_mut().zip(angle.iter_mut()).take(n) {
            (*m, *a) = inverse_couple(*m, *a);
        }
    }
    Ok(())
}

fn channel_pair<'a>(
    spectra: &'a mut [Vec<f32>],
    step: &CouplingStep,
) -> QinResult<(&'a mut [f32], &'a mut [f32])> {
    let m = usize::from(step.magnitude);
    let a = usize::from(step.angle);
    if m == a || m >= spectra.len() || a >= spectra.len() {
        return Err(QinError::CorruptStream(format!(
            "Vorbis coupling 声道非法: magnitude={m}, angle={a}"
        )));
    }
    if m < a {
        let (lo, hi) = spectra.split_at_mut(a);
        Ok((lo[m].as_mut_slice(), hi[0].as_mut_slice()))
    } else {
        let (lo, hi) = spectra.split_at_mut(m);
        Ok((hi[0].as_mut_slice(), lo[a].as_mut_slice()))
    }
}
