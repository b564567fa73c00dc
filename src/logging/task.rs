use super::{LoggingConfig, build_current_log_path};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::error;

/// 一次清理的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub compressed: usize,
}

/// 在给定运行时上启动维护任务: 定时清理历史日志, 跨日时通知写入端切换文件.
pub(super) fn spawn_log_maintenance_task(
    runtime: &Handle,
    config: LoggingConfig,
    rotate_requested: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    runtime.spawn(async move {
        let period = Duration::from_secs(config.cleanup_interval_seconds.max(1));
        let mut cleanup_interval = tokio::time::interval_at(Instant::now() + period, period);
        cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Err(err) = ensure_current_log_file(&config) {
            error!("初始化当前日志文件失败: {}", err);
        }
        if let Err(err) = cleanup_logs(&config) {
            error!("启动时清理日志失败: {}", err);
        }

        let mut next_rollover_at = next_rollover_or_soon(Local::now());

        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    if let Err(err) = cleanup_logs(&config) {
                        error!("清理日志失败: {}", err);
                    }
                }
                _ = tokio::time::sleep_until(next_rollover_at) => {
                    match ensure_current_log_file(&config) {
                        Ok(()) => rotate_requested.store(true, Ordering::Release),
                        Err(err) => error!("日志翻滚失败: {}", err),
                    }
                    if let Err(err) = cleanup_logs(&config) {
                        error!("翻滚后清理日志失败: {}", err);
                    }
                    next_rollover_at = next_rollover_or_soon(Local::now());
                }
            }
        }
    })
}

fn next_rollover_or_soon(now: DateTime<Local>) -> Instant {
    match compute_next_rollover(now) {
        Ok(at) => at,
        Err(err) => {
            error!("计算下一次翻滚时间失败: {}", err);
            Instant::now() + Duration::from_secs(1)
        }
    }
}

fn ensure_current_log_file(config: &LoggingConfig) -> Result<()> {
    let directory = Path::new(&config.directory);
    fs::create_dir_all(directory)?;
    let today = Local::now().date_naive();
    let current_path = build_current_log_path(directory, &config.file_prefix, today);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&current_path)
        .with_context(|| format!("创建当前日志文件失败, path={}", current_path.display()))?;
    Ok(())
}

/// 删除超过保留天数的日志, 并压缩今天以前的未压缩日志
pub fn cleanup_logs(config: &LoggingConfig) -> Result<CleanupReport> {
    cleanup_logs_at(config, Local::now().date_naive())
}

fn cleanup_logs_at(config: &LoggingConfig, today: NaiveDate) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(report);
    }

    let cutoff = today - ChronoDuration::days(config.retention_days);

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let file_path = entry.path();

        let Some((date, compressed)) = parse_rotated_log_name(&file_name, &config.file_prefix)
        else {
            continue;
        };

        if date < cutoff {
            if fs::remove_file(&file_path).is_ok() {
                report.removed += 1;
            }
            continue;
        }

        if config.compress_history && !compressed && date < today {
            match compress_to_gz(&file_path) {
                Ok(()) => report.compressed += 1,
                Err(err) => error!("压缩历史日志失败: {}", err),
            }
        }
    }

    Ok(report)
}

fn compress_to_gz(path: &Path) -> Result<()> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if gz_path.exists() {
        return Ok(());
    }

    let mut input =
        File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("创建压缩日志失败, path={}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());

    let mut buf = [0u8; 8 * 1024];
    loop {
        let read = input.read(&mut buf)?;
        if read == 0 {
            break;
        }
        encoder.write_all(&buf[..read])?;
    }

    encoder.finish()?;
    fs::remove_file(path)
        .with_context(|| format!("删除已压缩日志失败, path={}", path.display()))?;
    Ok(())
}

fn parse_rotated_log_name(file_name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let with_prefix = file_name.strip_prefix(prefix)?;
    let with_dot = with_prefix.strip_prefix('.')?;

    if let Some(date_part) = with_dot.strip_suffix(".log") {
        let date = parse_date(date_part)?;
        return Some((date, false));
    }

    if let Some(date_part) = with_dot.strip_suffix(".log.gz") {
        let date = parse_date(date_part)?;
        return Some((date, true));
    }

    None
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn compute_next_rollover(now: DateTime<Local>) -> Result<Instant> {
    let next_date = now.date_naive() + ChronoDuration::days(1);
    let next_midnight = next_date
        .and_hms_opt(0, 0, 0)
        .context("计算下一次日志翻滚时间失败")?;
    let next_local = Local
        .from_local_datetime(&next_midnight)
        .earliest()
        .context("转换本地时间失败")?;
    let system_time = SystemTime::from(next_local.with_timezone(&Utc));
    let wait = system_time
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Ok(Instant::now() + wait)
}
