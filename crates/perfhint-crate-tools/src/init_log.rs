use std::fs::File;
use std::io::Write;

use anyhow::Context;

/// 日志输出位置
///
/// 与配置项 `loggingFilename` 对应：空字符串和 `stderr` 输出到标准错误，
/// `stdout` 输出到标准输出，其余值视为文件路径。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Stdout,
    File(String),
}

impl LogTarget {
    pub fn from_config(value: &str) -> Self {
        match value.trim() {
            "" | "stderr" => Self::Stderr,
            "stdout" => Self::Stdout,
            path => Self::File(path.to_string()),
        }
    }
}

pub fn init_log() {
    init_log_to(&LogTarget::Stderr);
}

/// 初始化 env_logger，可以重复调用，只有第一次生效
///
/// 文件无法创建时退回到 stderr
pub fn init_log_to(target: &LogTarget) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").split(['\\', '/']).next_back().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} {}",
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env();

    let mut fallback_reason = None;
    match target {
        LogTarget::Stderr => {
            builder.target(env_logger::Target::Stderr);
        }
        LogTarget::Stdout => {
            builder.target(env_logger::Target::Stdout);
        }
        LogTarget::File(path) => match open_log_file(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => {
                builder.target(env_logger::Target::Stderr);
                fallback_reason = Some(err);
            }
        },
    }

    // layer 可能被多个 device 加载，重复初始化直接忽略
    if builder.try_init().is_ok() {
        if let Some(err) = fallback_reason {
            log::warn!("failed to open log file, logging to stderr instead: {err:#}");
        }
    }
}

fn open_log_file(path: &str) -> anyhow::Result<File> {
    File::create(path).with_context(|| format!("创建日志文件失败: {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_target_from_config() {
        assert_eq!(LogTarget::from_config(""), LogTarget::Stderr);
        assert_eq!(LogTarget::from_config("stderr"), LogTarget::Stderr);
        assert_eq!(LogTarget::from_config(" stdout "), LogTarget::Stdout);
        assert_eq!(LogTarget::from_config("/tmp/perfhint.log"), LogTarget::File("/tmp/perfhint.log".to_string()));
    }

    #[test]
    fn test_init_log_twice() {
        init_log();
        init_log_to(&LogTarget::Stdout);
        log::info!("logger initialized twice");
    }
}
