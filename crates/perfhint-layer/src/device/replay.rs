//! `vkQueueSubmit` 时按录制顺序回放账本
//!
//! 依赖 queue 状态的检查（pipeline bubble、event、子资源使用状态）只在这里发生。

use ash::vk;
use perfhint_analysis::index_scan::IndexScanOutcome;
use perfhint_analysis::stage::{Stage, StageFlags};
use perfhint_analysis::usage::ImageUsage;

use super::Device;
use crate::handles::{CommandBufferKey, ImageKey, ImageViewKey, QueueKey};
use crate::ledger::{DeferredLedger, DeferredOp, IndexScanRequest};
use crate::logger::ObjectSink;

impl Device {
    /// 按顺序回放每个 command buffer，回放后账本为空
    pub fn queue_submit(&mut self, queue: vk::Queue, command_buffers: &[vk::CommandBuffer]) {
        let queue = self.queues.key(queue);
        for &command_buffer in command_buffers {
            let command_buffer = self.command_buffers.key(command_buffer);
            self.replay_command_buffer(queue, command_buffer);
        }
    }

    /// 在 `queue` 上回放一份独立的账本
    pub fn replay_ledger(&mut self, queue: vk::Queue, mut ledger: DeferredLedger) {
        let queue = self.queues.key(queue);
        for op in ledger.take() {
            self.apply_op(queue, op);
        }
    }

    fn replay_command_buffer(&mut self, queue: QueueKey, command_buffer: CommandBufferKey) {
        let Some(cmd) = self.command_buffers.get_mut(command_buffer) else {
            log::debug!("command buffer destroyed before replay, skipping");
            return;
        };

        let ops = cmd.ledger.take();
        log::trace!("replaying {} deferred ops of {:?}", ops.len(), cmd.handle());
        for op in ops {
            self.apply_op(queue, op);
        }
    }

    fn apply_op(&mut self, queue: QueueKey, op: DeferredOp) {
        match op {
            DeferredOp::PipelineBarrier { src, dst } => {
                self.queues[queue].tracker.pipeline_barrier(src, dst);
            }
            DeferredOp::PushWork(stage) => self.push_work(queue, stage),
            DeferredOp::BeginRenderPass { src, dst } => {
                self.queues[queue].tracker.pipeline_barrier(src, dst);
                self.push_work(queue, Stage::Geometry);
                self.queues[queue].tracker.pipeline_barrier(StageFlags::GEOMETRY, StageFlags::FRAGMENT);
                self.push_work(queue, Stage::Fragment);
            }
            DeferredOp::SetEvent { event, src } => {
                let Some(event) = self.events.get_mut(event) else {
                    log::debug!("event destroyed before replay, skipping set");
                    return;
                };
                self.queues[queue].tracker.signal_event(&mut event.state, src);
            }
            DeferredOp::ResetEvent(event) => match self.events.get_mut(event) {
                Some(event) => event.state.reset(),
                None => log::debug!("event destroyed before replay, skipping reset"),
            },
            DeferredOp::WaitEvent { event, dst } => {
                let Some(event) = self.events.get(event) else {
                    log::debug!("event destroyed before replay, skipping wait");
                    return;
                };
                self.queues[queue].tracker.wait_event(&event.state, dst);
            }
            DeferredOp::ImageRangeUsage { image, range, usage } => self.signal_image_range(image, &range, usage),
            DeferredOp::ImageLayersUsage { image, layers, usage } => {
                let Some(image) = self.images.get_mut(image) else {
                    log::debug!("image destroyed before replay, skipping {usage:?}");
                    return;
                };
                let mut sink = ObjectSink::new(&self.logger, vk::DebugReportObjectTypeEXT::IMAGE, image.handle());
                image.usage.signal_layers(&layers, usage, &mut sink);
            }
            DeferredOp::ImageViewUsage { view, usage } => self.signal_view(view, usage),
            DeferredOp::DescriptorSetUsage(set) => {
                let Some(set) = self.descriptor_sets.get(set) else {
                    log::debug!("descriptor set freed before replay, skipping");
                    return;
                };
                for (view, usage) in set.image_usages() {
                    self.signal_view(view, usage);
                }
            }
            DeferredOp::ScanIndices(request) => self.scan_indices(&request),
            DeferredOp::ExecuteCommands(secondary) => self.replay_command_buffer(queue, secondary),
        }
    }

    fn push_work(&mut self, queue: QueueKey, stage: Stage) {
        let queue = &mut self.queues[queue];
        let mut sink = ObjectSink::new(&self.logger, vk::DebugReportObjectTypeEXT::QUEUE, queue.handle());
        queue.tracker.push_work(stage, &mut sink);
    }

    fn signal_image_range(&mut self, image: ImageKey, range: &vk::ImageSubresourceRange, usage: ImageUsage) {
        let Some(image) = self.images.get_mut(image) else {
            log::debug!("image destroyed before replay, skipping {usage:?}");
            return;
        };
        let mut sink = ObjectSink::new(&self.logger, vk::DebugReportObjectTypeEXT::IMAGE, image.handle());
        image.usage.signal_range(range, usage, &mut sink);
    }

    /// view 引用的子资源范围
    fn signal_view(&mut self, view: ImageViewKey, usage: ImageUsage) {
        let Some(view) = self.image_views.get(view) else {
            log::debug!("image view destroyed before replay, skipping {usage:?}");
            return;
        };
        let (image, range) = (view.image(), *view.range());
        self.signal_image_range(image, &range, usage);
    }

    /// 从映射的内存中读取 index 并扫描，读不到数据时跳过
    pub(crate) fn scan_indices(&mut self, request: &IndexScanRequest) {
        let Some(buffer) = self.buffers.get(request.buffer) else {
            log::debug!("index buffer destroyed before scanning, skipping");
            return;
        };
        let Some(memory) = buffer.memory().and_then(|memory| self.memories.get(memory)) else {
            log::debug!("index buffer {:?} has no memory bound, skipping scan", buffer.handle());
            return;
        };
        let Some(mapped) = memory.mapped() else {
            log::debug!("memory {:?} of index buffer is not mapped, skipping scan", memory.handle());
            return;
        };

        let stride = request.width.stride() as vk::DeviceSize;
        let offset = buffer.memory_offset() + request.index_offset + stride * vk::DeviceSize::from(request.first_index);
        let len = request.width.stride() * request.index_count as usize;
        let Some(data) = mapped.read(offset, len) else {
            log::debug!("index range [{offset}, +{len}) is outside the mapped memory, skipping scan");
            return;
        };

        let mut sink = ObjectSink::new(&self.logger, vk::DebugReportObjectTypeEXT::BUFFER, buffer.handle());
        match self.scanner.scan(data, request.width, request.index_count, request.primitive_restart, &mut sink) {
            IndexScanOutcome::Analyzed(stats) => log::trace!(
                "scanned {} indices of {:?}: utilization {:.2}, cache hit rate {:.2}",
                stats.index_count,
                buffer.handle(),
                stats.utilization,
                stats.cache_hit_rate
            ),
            outcome => log::trace!("scanned {} indices of {:?}: {outcome:?}", request.index_count, buffer.handle()),
        }
    }
}
