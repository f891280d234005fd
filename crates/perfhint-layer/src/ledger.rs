//! 延迟执行的账本
//!
//! 录制 command buffer 时还不知道它会提交到哪个 queue，依赖跟踪和 image 使用状态都只能在提交时
//! 按录制顺序回放。账本里保存的是显式的操作数据而不是闭包，回放时由 device 逐条解释。

use ash::vk;
use perfhint_analysis::index_scan::IndexWidth;
use perfhint_analysis::stage::{Stage, StageFlags};
use perfhint_analysis::usage::ImageUsage;

use crate::handles::{BufferKey, CommandBufferKey, DescriptorSetKey, EventKey, ImageKey, ImageViewKey};

/// 推迟到提交时执行的 index buffer 扫描
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexScanRequest {
    pub buffer: BufferKey,
    /// `vkCmdBindIndexBuffer` 的 offset
    pub index_offset: vk::DeviceSize,
    pub width: IndexWidth,
    pub index_count: u32,
    pub first_index: u32,
    pub primitive_restart: bool,
}

#[derive(Clone, Debug)]
pub enum DeferredOp {
    PipelineBarrier {
        src: StageFlags,
        dst: StageFlags,
    },
    PushWork(Stage),
    /// 外部 barrier，GEOMETRY 工作，GEOMETRY -> FRAGMENT barrier，FRAGMENT 工作
    BeginRenderPass {
        src: StageFlags,
        dst: StageFlags,
    },
    SetEvent {
        event: EventKey,
        src: StageFlags,
    },
    ResetEvent(EventKey),
    WaitEvent {
        event: EventKey,
        dst: StageFlags,
    },
    ImageRangeUsage {
        image: ImageKey,
        range: vk::ImageSubresourceRange,
        usage: ImageUsage,
    },
    ImageLayersUsage {
        image: ImageKey,
        layers: vk::ImageSubresourceLayers,
        usage: ImageUsage,
    },
    /// 作用于 view 引用的子资源范围
    ImageViewUsage {
        view: ImageViewKey,
        usage: ImageUsage,
    },
    DescriptorSetUsage(DescriptorSetKey),
    ScanIndices(IndexScanRequest),
    /// 回放 secondary command buffer 的账本
    ExecuteCommands(CommandBufferKey),
}

/// 一个 command buffer 的账本
///
/// 回放会取走所有操作，同一次录制只能回放一次
#[derive(Clone, Debug, Default)]
pub struct DeferredLedger {
    ops: Vec<DeferredOp>,
}

impl DeferredLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn enqueue(&mut self, op: DeferredOp) {
        self.ops.push(op);
    }

    /// 取出所有操作用于回放，账本变为空
    pub fn take(&mut self) -> Vec<DeferredOp> {
        std::mem::take(&mut self.ops)
    }

    /// 重新录制时丢弃未提交的内容
    pub fn reset(&mut self) {
        self.ops.clear();
    }

    #[inline]
    pub fn ops(&self) -> &[DeferredOp] {
        &self.ops
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
