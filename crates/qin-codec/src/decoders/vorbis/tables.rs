//! 单条流的只读解码表.
//!
//! 三个头包解析完成后一次性构建, 之后通过 `Arc` 共享, 音频包解码只读访问.

use qin_core::QinResult;

use super::headers::IdentificationHeader;
use super::imdct::ImdctLookup;
use super::setup::ParsedSetup;
use super::window::WindowTables;

#[derive(Debug)]
pub(crate) struct StreamTables {
    pub(crate) ident: IdentificationHeader,
    pub(crate) setup: ParsedSetup,
    /// 下标 0 为短块, 1 为长块
    pub(crate) imdct: [ImdctLookup; 2],
    pub(crate) windows: WindowTables,
}

impl StreamTables {
    pub(crate) fn new(ident: IdentificationHeader, setup: ParsedSetup) -> QinResult<Self> {
        let bs0 = usize::from(ident.blocksize0);
        let bs1 = usize::from(ident.blocksize1);
        Ok(Self {
            imdct: [ImdctLookup::new(bs0)?, ImdctLookup::new(bs1)?],
            windows: WindowTables::new(bs0, bs1),
            ident,
            setup,
        })
    }

    pub(crate) fn channels(&self) -> usize {
        usize::from(self.ident.channels)
    }

    pub(crate) fn blocksize(&self, long: bool) -> usize {
        if long {
            usize::from(self.ident.blocksize1)
        } else {
            usize::from(self.ident.blocksize0)
        }
    }
}
