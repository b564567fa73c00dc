//! qin-cli - Ogg Vorbis 解码命令行工具
//!
//! 把一个或多个 Ogg Vorbis 文件解码为 WAV, 或只显示流信息.
//! 多个输入并行处理, 每个输入拥有独立的解码器状态.

mod info;
mod wav;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::Parser;
use qin::logging::{self, LoggingConfig};
use qin_codec::{Decoder, Packet, VorbisDecoder};
use qin_core::{QinError, SampleFormat};
use qin_format::{OggReader, PacketSource};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use info::{DecodeSummary, StreamReport};
use wav::WavWriter;

#[derive(Parser, Debug)]
#[command(name = "qin-cli", version, about = "纯 Rust Ogg Vorbis 解码工具")]
struct Cli {
    /// 输入文件路径 (Ogg Vorbis), 可指定多个
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// 输出文件路径, 仅单个输入时可用
    #[arg(short, long, conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// 输出目录, 文件名为输入文件名加 .wav
    #[arg(long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// 输出采样格式 (s16 / f32)
    #[arg(long, default_value = "s16")]
    format: SampleFormat,

    /// 只显示流信息, 不解码
    #[arg(long)]
    info: bool,

    /// 以 JSON 格式输出流信息
    #[arg(long)]
    json: bool,

    /// 覆盖输出文件
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// 跳过损坏或校验失败的数据包, 而不是中止该输入
    #[arg(long)]
    skip_corrupt: bool,

    /// 并行线程数, 0 表示按 CPU 核数
    #[arg(short = 'j', long, default_value_t = 0)]
    jobs: usize,

    /// 日志配置文件 (JSON)
    #[arg(long = "log-config")]
    log_config: Option<PathBuf>,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    // 解码是同步的, 运行时只承载日志维护任务
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("qin-log")
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("错误: 创建 tokio 运行时失败: {e}");
            process::exit(1);
        }
    };
    let _enter = runtime.enter();

    if let Err(e) = init_logging(&cli) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let mut config = match &cli.log_config {
        Some(path) => LoggingConfig::from_json_file(path)?,
        None => LoggingConfig {
            file_prefix: "qin-cli".to_string(),
            ..LoggingConfig::default()
        },
    };
    match cli.verbose {
        0 => {}
        1 => {
            config.level = "debug".to_string();
            config.console_level = "info".to_string();
        }
        _ => {
            config.level = "trace".to_string();
            config.console_level = "debug".to_string();
        }
    }
    logging::init(config)
}

fn run(cli: &Cli) -> Result<()> {
    if cli.output.is_some() && cli.inputs.len() > 1 {
        bail!("-o 只能用于单个输入, 多个输入请使用 --out-dir");
    }
    if let Some(dir) = &cli.out_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("创建输出目录失败, path={}", dir.display()))?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cli.jobs)
        .build()
        .context("创建线程池失败")?;
    let results: Vec<(&PathBuf, Result<StreamReport>)> = pool.install(|| {
        cli.inputs
            .par_iter()
            .map(|input| (input, process_input(cli, input)))
            .collect()
    });

    let mut reports = Vec::with_capacity(results.len());
    let mut failed = 0usize;
    for (input, result) in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                failed += 1;
                error!("处理失败: {}: {:#}", input.display(), e);
                eprintln!("错误: {}: {e:#}", input.display());
            }
        }
    }

    if cli.json {
        info::print_json(&reports)?;
    } else {
        for report in &reports {
            info::print_text(report);
        }
    }

    if failed > 0 {
        bail!("{} 个输入中有 {} 个处理失败", cli.inputs.len(), failed);
    }
    Ok(())
}

fn process_input(cli: &Cli, input: &Path) -> Result<StreamReport> {
    let mut reader =
        OggReader::open(input).with_context(|| format!("打开输入失败, path={}", input.display()))?;
    let mut decoder = VorbisDecoder::new();

    if cli.info {
        read_headers(&mut reader, &mut decoder)?;
        return StreamReport::collect(
            input,
            &decoder,
            reader.serial(),
            reader.page_counts(),
            None,
        );
    }

    let output = output_path(cli, input)?;
    if !cli.overwrite && output.exists() {
        bail!("输出文件已存在 '{}', 使用 -y 覆盖", output.display());
    }
    info!("解码 {} -> {}", input.display(), output.display());

    let summary = decode_to_wav(cli, &mut reader, &mut decoder, &output)?;
    StreamReport::collect(
        input,
        &decoder,
        reader.serial(),
        reader.page_counts(),
        Some(summary),
    )
}

/// 读取数据包直到三个头包解析完成
fn read_headers<S: PacketSource>(source: &mut S, decoder: &mut VorbisDecoder) -> Result<()> {
    while !decoder.headers_complete() {
        let packet = source
            .next_packet()?
            .context("输入在 Vorbis 头包完整之前结束")?;
        decoder.send_packet(&packet)?;
    }
    Ok(())
}

fn output_path(cli: &Cli, input: &Path) -> Result<PathBuf> {
    if let Some(output) = &cli.output {
        return Ok(output.clone());
    }
    let stem = input
        .file_stem()
        .with_context(|| format!("无法从输入路径推导输出文件名: {}", input.display()))?;
    let file_name = PathBuf::from(stem).with_extension("wav");
    let output = match &cli.out_dir {
        Some(dir) => dir.join(file_name),
        None => input.with_file_name(file_name),
    };
    if output == input {
        bail!("输出路径与输入相同: {}", input.display());
    }
    Ok(output)
}

/// 可跳过的错误记一次并返回 Ok, 否则原样返回
fn skip_or_abort(cli: &Cli, err: QinError, skipped: &mut u64, can_skip: bool) -> Result<()> {
    if cli.skip_corrupt && can_skip && err.is_packet_fatal() {
        *skipped += 1;
        warn!("跳过损坏的数据包: {}", err);
        return Ok(());
    }
    Err(err.into())
}

fn decode_to_wav<S: PacketSource>(
    cli: &Cli,
    source: &mut S,
    decoder: &mut VorbisDecoder,
    output: &Path,
) -> Result<DecodeSummary> {
    let mut writer: Option<WavWriter<BufWriter<File>>> = None;
    let mut samples = 0u64;
    let mut skipped = 0u64;

    loop {
        let packet = match source.next_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(e) => {
                skip_or_abort(cli, e, &mut skipped, true)?;
                continue;
            }
        };
        // 头包损坏时后续包都无法解析, 只在音频阶段允许跳过
        if let Err(e) = decoder.send_packet(&packet) {
            let can_skip = decoder.headers_complete();
            skip_or_abort(cli, e, &mut skipped, can_skip)?;
            continue;
        }

        if writer.is_none() && decoder.headers_complete() {
            writer = Some(create_writer(decoder, output, cli.format)?);
        }
        if let Some(writer) = writer.as_mut() {
            samples += drain_frames(decoder, writer)?;
        }
        if packet.end_of_stream {
            break;
        }
    }

    decoder.send_packet(&Packet::empty())?;
    let Some(mut writer) = writer else {
        bail!("输入在 Vorbis 头包完整之前结束");
    };
    samples += drain_frames(decoder, &mut writer)?;
    let data_bytes = writer.data_written();
    writer.finalize()?;
    debug!("{}: 写入 {} 字节 PCM 数据", output.display(), data_bytes);

    let sample_rate = decoder.info().map_or(0, |ident| ident.sample_rate);
    let duration_secs = if sample_rate > 0 {
        samples as f64 / f64::from(sample_rate)
    } else {
        0.0
    };
    if skipped > 0 {
        warn!("{}: 共跳过 {} 个损坏的数据包", output.display(), skipped);
    }
    Ok(DecodeSummary {
        output: output.display().to_string(),
        format: cli.format.to_string(),
        samples,
        duration_secs,
        skipped_packets: skipped,
    })
}

fn create_writer(
    decoder: &VorbisDecoder,
    output: &Path,
    format: SampleFormat,
) -> Result<WavWriter<BufWriter<File>>> {
    let ident = decoder.info().context("缺少 Vorbis identification 头")?;
    let file = File::create(output)
        .with_context(|| format!("创建输出文件失败, path={}", output.display()))?;
    WavWriter::new(
        BufWriter::new(file),
        ident.channels,
        ident.sample_rate,
        format,
    )
}

/// 取出解码器中所有待输出的帧, 返回写入的每声道采样数
fn drain_frames(
    decoder: &mut VorbisDecoder,
    writer: &mut WavWriter<BufWriter<File>>,
) -> Result<u64> {
    let mut samples = 0u64;
    loop {
        match decoder.receive_frame() {
            Ok(frame) => {
                writer.write_frame(&frame)?;
                samples += u64::from(frame.nb_samples);
            }
            Err(QinError::NeedMoreData | QinError::Eof) => return Ok(samples),
            Err(e) => return Err(e.into()),
        }
    }
}
