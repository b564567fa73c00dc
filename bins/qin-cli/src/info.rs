//! 流信息汇总与输出 (文本 / JSON).

use std::path::Path;

use anyhow::{Context, Result};
use qin_codec::VorbisDecoder;
use serde::Serialize;

/// 单个输入的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,
    pub sample_rate: u32,
    pub channels: u8,
    pub blocksize0: u16,
    pub blocksize1: u16,
    pub bitrate_nominal: i32,
    pub bitrate_maximum: i32,
    pub bitrate_minimum: i32,
    pub vendor: String,
    pub comments: Vec<String>,
    pub pages_read: u64,
    pub pages_skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode: Option<DecodeSummary>,
}

/// 解码到 WAV 的统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecodeSummary {
    pub output: String,
    pub format: String,
    /// 每声道采样数
    pub samples: u64,
    pub duration_secs: f64,
    /// 因损坏被跳过的数据包数
    pub skipped_packets: u64,
}

impl StreamReport {
    /// 从头包已解析完成的解码器收集信息
    pub fn collect(
        input: &Path,
        decoder: &VorbisDecoder,
        serial: Option<u32>,
        page_counts: (u64, u64),
        decode: Option<DecodeSummary>,
    ) -> Result<Self> {
        let ident = decoder.info().context("缺少 Vorbis identification 头")?;
        let (vendor, comments) = decoder
            .comments()
            .map(|c| (c.vendor.clone(), c.user_comments.clone()))
            .unwrap_or_default();
        Ok(Self {
            input: input.display().to_string(),
            serial,
            sample_rate: ident.sample_rate,
            channels: ident.channels,
            blocksize0: ident.blocksize0,
            blocksize1: ident.blocksize1,
            bitrate_nominal: ident.bitrate_nominal,
            bitrate_maximum: ident.bitrate_maximum,
            bitrate_minimum: ident.bitrate_minimum,
            vendor,
            comments,
            pages_read: page_counts.0,
            pages_skipped: page_counts.1,
            decode,
        })
    }
}

pub fn print_json(reports: &[StreamReport]) -> Result<()> {
    let json = serde_json::to_string_pretty(reports).context("序列化流信息失败")?;
    println!("{json}");
    Ok(())
}

pub fn print_text(report: &StreamReport) {
    println!("[INPUT] {}", report.input);
    if let Some(serial) = report.serial {
        println!("  序列号       : 0x{serial:08X}");
    }
    println!("  采样率       : {} Hz", report.sample_rate);
    println!("  声道数       : {}", report.channels);
    println!(
        "  块长         : {} / {}",
        report.blocksize0, report.blocksize1
    );
    if report.bitrate_nominal > 0 {
        println!("  标称码率     : {} bps", report.bitrate_nominal);
    }
    println!("  编码器       : {}", report.vendor);
    println!(
        "  页面         : {} (跳过 {})",
        report.pages_read, report.pages_skipped
    );
    for comment in &report.comments {
        println!("  注释         : {comment}");
    }

    if let Some(decode) = &report.decode {
        println!("  输出         : {} ({})", decode.output, decode.format);
        println!(
            "  采样数       : {} ({:.3} 秒)",
            decode.samples, decode.duration_secs
        );
        if decode.skipped_packets > 0 {
            println!("  跳过数据包   : {}", decode.skipped_packets);
        }
    }
}
