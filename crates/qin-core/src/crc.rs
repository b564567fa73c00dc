//! CRC 校验和计算.
//!
//! 提供 Ogg 页面使用的 CRC-32 (多项式 0x04C11DB7, 非反射, 初始值 0, 无终值异或).

/// Ogg CRC-32 多项式
const OGG_CRC_POLY: u32 = 0x04C1_1DB7;

/// CRC-32 查找表 (多项式 0x04C11DB7, MSB 优先)
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ OGG_CRC_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// 在已有 CRC 值上继续累加数据
///
/// 页面头和页面数据可分段送入, 结果与一次性计算相同.
pub fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    let mut crc = crc;
    for &byte in data {
        crc = (crc << 8) ^ CRC32_TABLE[((crc >> 24) as u8 ^ byte) as usize];
    }
    crc
}

/// 计算 Ogg CRC-32
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0, data)
}
