//! 性能提示的消息编码与输出接口

use std::fmt;

use ash::vk;

/// 性能提示的消息编码
///
/// 数值稳定，会作为 message code 传给注册的回调
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageCode {
    PipelineBubble = 1,
    IndexBufferSparse = 2,
    IndexBufferCacheThrashing = 3,
    RedundantRenderPassStore = 4,
    RedundantImageClear = 5,
    InefficientClear = 6,
    ManySmallIndexedDrawcalls = 7,
    DepthPrePass = 8,
    TileReadback = 9,
    ClearAttachmentsAfterLoad = 10,
    ClearAttachmentsNoDrawCall = 11,
    ResolveImage = 12,
    CommandBufferSimultaneousUse = 13,
}

impl MessageCode {
    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageCode::PipelineBubble => "PIPELINE_BUBBLE",
            MessageCode::IndexBufferSparse => "INDEX_BUFFER_SPARSE",
            MessageCode::IndexBufferCacheThrashing => "INDEX_BUFFER_CACHE_THRASHING",
            MessageCode::RedundantRenderPassStore => "REDUNDANT_RENDERPASS_STORE",
            MessageCode::RedundantImageClear => "REDUNDANT_IMAGE_CLEAR",
            MessageCode::InefficientClear => "INEFFICIENT_CLEAR",
            MessageCode::ManySmallIndexedDrawcalls => "MANY_SMALL_INDEXED_DRAWCALLS",
            MessageCode::DepthPrePass => "DEPTH_PRE_PASS",
            MessageCode::TileReadback => "TILE_READBACK",
            MessageCode::ClearAttachmentsAfterLoad => "CLEAR_ATTACHMENTS_AFTER_LOAD",
            MessageCode::ClearAttachmentsNoDrawCall => "CLEAR_ATTACHMENTS_NO_DRAW_CALL",
            MessageCode::ResolveImage => "RESOLVE_IMAGE",
            MessageCode::CommandBufferSimultaneousUse => "COMMAND_BUFFER_SIMULTANEOUS_USE",
        }
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一条已经格式化好的提示
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub flags: vk::DebugReportFlagsEXT,
    pub code: MessageCode,
    pub message: String,
}

/// 提示的输出端
///
/// 分析代码只负责调用，不负责构造。每个触发提示的对象（image、buffer、queue、
/// command buffer）各自提供一个 sink。
pub trait ReportSink {
    fn log(&mut self, flags: vk::DebugReportFlagsEXT, code: MessageCode, message: String);

    #[inline]
    fn performance_warning(&mut self, code: MessageCode, message: String) {
        self.log(vk::DebugReportFlagsEXT::PERFORMANCE_WARNING, code, message);
    }
}

impl ReportSink for Vec<Report> {
    fn log(&mut self, flags: vk::DebugReportFlagsEXT, code: MessageCode, message: String) {
        self.push(Report { flags, code, message });
    }
}

/// 统计某个 code 出现的次数，测试中使用
pub fn count_reports(reports: &[Report], code: MessageCode) -> usize {
    reports.iter().filter(|report| report.code == code).count()
}
