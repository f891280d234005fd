//! 工具集
//!
//! 提供日志初始化。日志目标由配置项 `loggingFilename` 决定。

pub mod init_log;
