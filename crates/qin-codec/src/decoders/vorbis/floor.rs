//! floor 变体分派.
//!
//! floor 类型在 setup 阶段确定, 之后每个包只做一次枚举匹配.

use qin_core::{QinError, QinResult};

use super::bitreader::LsbBitReader;
use super::codebook::CodebookDecode;
use super::floor0::{Floor0Config, Floor0Data};
use super::floor1::Floor1Config;

#[derive(Debug, Clone)]
pub(crate) enum FloorConfig {
    Floor0(Floor0Config),
    Floor1(Floor1Config),
}

/// 单个声道的 floor 解码结果, 在 residue 与反耦合之后才应用到频谱
#[derive(Debug, Clone)]
pub(crate) enum FloorData {
    Floor0(Floor0Data),
    Floor1(Vec<u32>),
}

impl FloorConfig {
    /// 返回 `None` 表示该声道本包无信号.
    pub(crate) fn decode<B: CodebookDecode>(
        &self,
        br: &mut LsbBitReader<'_>,
        books: &[B],
    ) -> QinResult<Option<FloorData>> {
        Ok(match self {
            Self::Floor0(cfg) => cfg.decode(br, books)?.map(FloorData::Floor0),
            Self::Floor1(cfg) => cfg.decode(br, books)?.map(FloorData::Floor1),
        })
    }

    /// 将曲线原位乘到频谱上, `spectrum` 长度为块长的一半.
    pub(crate) fn apply(
        &self,
        data: &FloorData,
        spectrum: &mut [f32],
        long: bool,
    ) -> QinResult<()> {
        match (self, data) {
            (Self::Floor0(cfg), FloorData::Floor0(data)) => cfg.apply(data, spectrum, long),
            (Self::Floor1(cfg), FloorData::Floor1(y)) => cfg.apply(y, spectrum),
            _ => {
                return Err(QinError::Internal(
                    "Vorbis floor 数据与配置类型不一致".into(),
                ));
            }
        }
        Ok(())
    }
}
