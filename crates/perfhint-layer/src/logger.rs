//! 提示的分发
//!
//! 每条提示都会写入 `log`，同时转发给所有 flags 匹配的回调，
//! 回调相当于 `VK_EXT_debug_report` 注册的 callback。

use ash::vk;
use perfhint_analysis::message::{MessageCode, ReportSink};
use slotmap::SlotMap;

use crate::handles::LoggerCallbackHandle;

/// 回调收到的消息
#[derive(Clone, Copy, Debug)]
pub struct LoggerMessage<'a> {
    /// 与回调注册的 flags 取交集后的结果
    pub flags: vk::DebugReportFlagsEXT,
    pub object_type: vk::DebugReportObjectTypeEXT,
    pub object: u64,
    pub code: MessageCode,
    pub message: &'a str,
}

pub type LoggerCallbackFn = Box<dyn Fn(&LoggerMessage) + Send>;

struct LoggerCallback {
    flags: vk::DebugReportFlagsEXT,
    callback: LoggerCallbackFn,
}

#[derive(Default)]
pub struct Logger {
    callbacks: SlotMap<LoggerCallbackHandle, LoggerCallback>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_callback(
        &mut self,
        flags: vk::DebugReportFlagsEXT,
        callback: LoggerCallbackFn,
    ) -> LoggerCallbackHandle {
        self.callbacks.insert(LoggerCallback { flags, callback })
    }

    pub fn unregister_callback(&mut self, handle: LoggerCallbackHandle) -> bool {
        self.callbacks.remove(handle).is_some()
    }

    #[inline]
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    pub fn write(
        &self,
        flags: vk::DebugReportFlagsEXT,
        object_type: vk::DebugReportObjectTypeEXT,
        object: u64,
        code: MessageCode,
        message: &str,
    ) {
        if flags.contains(vk::DebugReportFlagsEXT::ERROR) {
            log::error!("[{code}] {message}");
        } else if flags.intersects(vk::DebugReportFlagsEXT::WARNING | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING) {
            log::warn!("[{code}] {message}");
        } else if flags.contains(vk::DebugReportFlagsEXT::INFORMATION) {
            log::info!("[{code}] {message}");
        } else {
            log::debug!("[{code}] {message}");
        }

        for callback in self.callbacks.values() {
            let matched = callback.flags & flags;
            if matched.is_empty() {
                continue;
            }
            (callback.callback)(&LoggerMessage {
                flags: matched,
                object_type,
                object,
                code,
                message,
            });
        }
    }
}

/// 绑定到某个对象的输出端
pub struct ObjectSink<'a> {
    logger: &'a Logger,
    object_type: vk::DebugReportObjectTypeEXT,
    object: u64,
}

impl<'a> ObjectSink<'a> {
    pub fn new(logger: &'a Logger, object_type: vk::DebugReportObjectTypeEXT, handle: impl vk::Handle) -> Self {
        Self {
            logger,
            object_type,
            object: handle.as_raw(),
        }
    }
}

impl ReportSink for ObjectSink<'_> {
    fn log(&mut self, flags: vk::DebugReportFlagsEXT, code: MessageCode, message: String) {
        self.logger.write(flags, self.object_type, self.object, code, &message);
    }
}
