//! `vkCmd*` 的录制
//!
//! 录制阶段只做两件事：运行 command buffer 上的启发式检查，以及把需要 queue 状态的操作写进账本。

use ash::vk;
use perfhint_analysis::index_scan::IndexWidth;
use perfhint_analysis::message::{MessageCode, ReportSink};
use perfhint_analysis::stage::{Stage, StageFlags};
use perfhint_analysis::usage::ImageUsage;

use super::Device;
use crate::heuristics::HeuristicContext;
use crate::ledger::{DeferredOp, IndexScanRequest};
use crate::logger::ObjectSink;
use crate::resources::command_buffer::IndexBinding;

// begin & reset
impl Device {
    /// `vkBeginCommandBuffer`，之前录制但没有提交的内容全部丢弃
    ///
    /// 带 `RENDER_PASS_CONTINUE` 的 secondary command buffer 从 `inheritance` 继承 render pass 和 subpass
    pub fn begin_command_buffer(
        &mut self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
        inheritance: Option<&vk::CommandBufferInheritanceInfo>,
    ) {
        let cmd = self.command_buffers.by_handle_mut(command_buffer);
        cmd.reset();

        if flags.contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE) {
            ObjectSink::new(&self.logger, vk::DebugReportObjectTypeEXT::COMMAND_BUFFER, command_buffer)
                .performance_warning(
                    MessageCode::CommandBufferSimultaneousUse,
                    "VK_COMMAND_BUFFER_USAGE_SIMULTANEOUS_USE_BIT is set.".to_string(),
                );
        }

        if !flags.contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE) {
            return;
        }
        let Some(inheritance) = inheritance else {
            panic!("RENDER_PASS_CONTINUE requires inheritance info");
        };

        cmd.state.render_pass = Some(self.render_passes.key(inheritance.render_pass));
        cmd.state.subpass = inheritance.subpass;
        for heuristic in &mut cmd.heuristics {
            heuristic.set_render_pass();
            heuristic.set_subpass(inheritance.subpass);
        }
    }

    pub fn reset_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.command_buffers.by_handle_mut(command_buffer).reset();
    }

    fn enqueue(&mut self, command_buffer: vk::CommandBuffer, op: DeferredOp) {
        self.command_buffers.by_handle_mut(command_buffer).ledger.enqueue(op);
    }
}

// synchronization
impl Device {
    /// render pass 内的 barrier 只能是 subpass 自依赖，不影响 stage 之间的依赖
    pub fn cmd_pipeline_barrier(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
    ) {
        let cmd = self.command_buffers.by_handle_mut(command_buffer);
        if cmd.is_inside_render_pass() {
            return;
        }

        cmd.ledger.enqueue(DeferredOp::PipelineBarrier {
            src: StageFlags::from_vk_src(src_stage_mask),
            dst: StageFlags::from_vk_dst(dst_stage_mask),
        });
    }

    pub fn cmd_set_event(
        &mut self,
        command_buffer: vk::CommandBuffer,
        event: vk::Event,
        stage_mask: vk::PipelineStageFlags,
    ) {
        let event = self.events.key(event);
        self.enqueue(
            command_buffer,
            DeferredOp::SetEvent {
                event,
                src: StageFlags::from_vk_src(stage_mask),
            },
        );
    }

    pub fn cmd_reset_event(&mut self, command_buffer: vk::CommandBuffer, event: vk::Event) {
        let event = self.events.key(event);
        self.enqueue(command_buffer, DeferredOp::ResetEvent(event));
    }

    /// 每个 event 单独等待
    pub fn cmd_wait_events(
        &mut self,
        command_buffer: vk::CommandBuffer,
        events: &[vk::Event],
        dst_stage_mask: vk::PipelineStageFlags,
    ) {
        let dst = StageFlags::from_vk_dst(dst_stage_mask);
        for &event in events {
            let event = self.events.key(event);
            self.enqueue(command_buffer, DeferredOp::WaitEvent { event, dst });
        }
    }
}

// render pass
impl Device {
    pub fn cmd_begin_render_pass(&mut self, command_buffer: vk::CommandBuffer, begin: &vk::RenderPassBeginInfo) {
        let render_pass_key = self.render_passes.key(begin.render_pass);
        let render_pass = &self.render_passes[render_pass_key];
        let framebuffer = self.framebuffers.by_handle(begin.framebuffer);
        let cmd = self.command_buffers.by_handle_mut(command_buffer);

        let ctx = HeuristicContext {
            config: &self.config,
            logger: &self.logger,
            command_buffer,
        };
        for heuristic in &mut cmd.heuristics {
            heuristic.begin_render_pass(&ctx, render_pass, &begin.render_area);
            heuristic.set_subpass(0);
        }

        let desc = render_pass.desc();
        let attachment_count = desc.attachments.len() as u32;
        assert!(
            framebuffer.attachments().len() >= desc.attachments.len(),
            "framebuffer has {} attachments, render pass needs {attachment_count}",
            framebuffer.attachments().len()
        );

        // load op 和 store op 都在 begin 时记录
        for attachment in 0..attachment_count {
            if let Some(usage) = desc.load_usage(attachment) {
                let view = framebuffer.attachments()[attachment as usize];
                cmd.ledger.enqueue(DeferredOp::ImageViewUsage { view, usage });
            }
        }
        for attachment in 0..attachment_count {
            if let Some(usage) = desc.store_usage(attachment) {
                let view = framebuffer.attachments()[attachment as usize];
                cmd.ledger.enqueue(DeferredOp::ImageViewUsage { view, usage });
            }
        }

        cmd.state.render_pass = Some(render_pass_key);
        cmd.state.subpass = 0;

        let (src, dst) = desc.external_barrier_before();
        cmd.ledger.enqueue(DeferredOp::BeginRenderPass { src, dst });
    }

    pub fn cmd_next_subpass(&mut self, command_buffer: vk::CommandBuffer) {
        let cmd = self.command_buffers.by_handle_mut(command_buffer);
        let Some(render_pass) = cmd.state.render_pass else {
            panic!("vkCmdNextSubpass called outside of a render pass");
        };

        cmd.state.subpass += 1;
        let subpass_count = self.render_passes[render_pass].desc().subpasses.len();
        assert!(
            (cmd.state.subpass as usize) < subpass_count,
            "subpass {} out of range ({subpass_count} subpasses)",
            cmd.state.subpass
        );

        let subpass = cmd.state.subpass;
        for heuristic in &mut cmd.heuristics {
            heuristic.set_subpass(subpass);
        }
    }

    pub fn cmd_end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        let cmd = self.command_buffers.by_handle_mut(command_buffer);
        let Some(render_pass) = cmd.state.render_pass else {
            panic!("vkCmdEndRenderPass called outside of a render pass");
        };

        let ctx = HeuristicContext {
            config: &self.config,
            logger: &self.logger,
            command_buffer,
        };
        for heuristic in &mut cmd.heuristics {
            heuristic.end_render_pass(&ctx);
        }

        let (src, dst) = self.render_passes[render_pass].desc().external_barrier_after();
        cmd.ledger.enqueue(DeferredOp::PipelineBarrier { src, dst });

        cmd.state.render_pass = None;
        cmd.state.subpass = 0;
    }

    pub fn cmd_clear_attachments(
        &mut self,
        command_buffer: vk::CommandBuffer,
        attachments: &[vk::ClearAttachment],
        rects: &[vk::ClearRect],
    ) {
        let cmd = self.command_buffers.by_handle_mut(command_buffer);
        let Some(render_pass) = cmd.state.render_pass else {
            panic!("vkCmdClearAttachments called outside of a render pass");
        };

        let desc = self.render_passes[render_pass].desc();
        let ctx = HeuristicContext {
            config: &self.config,
            logger: &self.logger,
            command_buffer,
        };
        for heuristic in &mut cmd.heuristics {
            heuristic.clear_attachments(&ctx, desc, attachments, rects);
        }
    }
}

// bindings
impl Device {
    pub fn cmd_bind_pipeline(
        &mut self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        let pipeline_key = self.pipelines.key(pipeline);
        let desc = self.pipelines[pipeline_key].desc();
        let cmd = self.command_buffers.by_handle_mut(command_buffer);

        for heuristic in &mut cmd.heuristics {
            heuristic.bind_pipeline(desc);
        }
        cmd.state.bind_point_mut(bind_point).pipeline = Some(pipeline_key);
    }

    pub fn cmd_bind_index_buffer(
        &mut self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        let buffer = self.buffers.key(buffer);
        self.command_buffers.by_handle_mut(command_buffer).state.index_buffer = Some(IndexBinding {
            buffer,
            offset,
            index_type,
        });
    }

    pub fn cmd_bind_descriptor_sets(
        &mut self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        let keys = sets.iter().map(|&set| self.descriptor_sets.key(set)).collect::<Vec<_>>();
        self.command_buffers
            .by_handle_mut(command_buffer)
            .state
            .bind_point_mut(bind_point)
            .bind_sets(first_set, keys);
    }

    /// 在 draw/dispatch 时记录绑定后还没被使用过的 descriptor set
    fn enqueue_descriptor_set_usage(&mut self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint) {
        let cmd = self.command_buffers.by_handle_mut(command_buffer);
        let bound = cmd.state.bind_point_mut(bind_point);
        let Some(pipeline) = bound.pipeline else {
            panic!("{bind_point:?} command recorded without a bound pipeline");
        };

        let set_count = self.pipelines[pipeline].desc().descriptor_set_count;
        for set in bound.take_dirty_sets(set_count) {
            cmd.ledger.enqueue(DeferredOp::DescriptorSetUsage(set));
        }
    }
}

// draws & dispatches
impl Device {
    pub fn cmd_draw(&mut self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        let cmd = self.command_buffers.by_handle_mut(command_buffer);
        let ctx = HeuristicContext {
            config: &self.config,
            logger: &self.logger,
            command_buffer,
        };
        for heuristic in &mut cmd.heuristics {
            heuristic.draw(&ctx, vertex_count, instance_count);
        }

        self.enqueue_descriptor_set_usage(command_buffer, vk::PipelineBindPoint::GRAPHICS);
    }

    /// 统计小 draw call，并按配置立即或者在提交时扫描 index buffer
    pub fn cmd_draw_indexed(
        &mut self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
    ) {
        let cmd = self.command_buffers.by_handle_mut(command_buffer);
        let ctx = HeuristicContext {
            config: &self.config,
            logger: &self.logger,
            command_buffer,
        };
        for heuristic in &mut cmd.heuristics {
            heuristic.draw_indexed(&ctx, index_count, instance_count);
        }

        let Some(binding) = cmd.state.index_buffer else {
            panic!("vkCmdDrawIndexed recorded without a bound index buffer");
        };

        let config = &self.config;
        if u64::from(index_count) * u64::from(instance_count) <= u64::from(config.small_indexed_drawcall_indices) {
            cmd.state.small_indexed_drawcalls += 1;
            if cmd.state.small_indexed_drawcalls == config.max_small_indexed_drawcalls {
                ObjectSink::new(&self.logger, vk::DebugReportObjectTypeEXT::COMMAND_BUFFER, command_buffer)
                    .performance_warning(
                        MessageCode::ManySmallIndexedDrawcalls,
                        format!(
                            "The command buffer contains many small indexed drawcalls (at least {} drawcalls with \
                             less than {} indices each). This may cause pipeline bubbles. You can try batching \
                             drawcalls or instancing when applicable.",
                            config.max_small_indexed_drawcalls, config.small_indexed_drawcall_indices
                        ),
                    );
            }
        }

        let primitive_restart = cmd
            .state
            .graphics
            .pipeline
            .and_then(|pipeline| self.pipelines.get(pipeline))
            .is_some_and(|pipeline| pipeline.desc().primitive_restart);

        if index_count >= config.index_buffer_scan_min_index_count && config.index_buffer_scanning_enable {
            match IndexWidth::from_vk(binding.index_type) {
                Some(width) => {
                    let request = IndexScanRequest {
                        buffer: binding.buffer,
                        index_offset: binding.offset,
                        width,
                        index_count,
                        first_index,
                        primitive_restart,
                    };
                    if config.index_buffer_scanning_in_place {
                        self.scan_indices(&request);
                    } else {
                        cmd.ledger.enqueue(DeferredOp::ScanIndices(request));
                    }
                }
                None => log::debug!("unsupported index type {:?}, skip scanning", binding.index_type),
            }
        }

        self.enqueue_descriptor_set_usage(command_buffer, vk::PipelineBindPoint::GRAPHICS);
    }

    pub fn cmd_draw_indirect(&mut self, command_buffer: vk::CommandBuffer) {
        self.enqueue_descriptor_set_usage(command_buffer, vk::PipelineBindPoint::GRAPHICS);
    }

    pub fn cmd_draw_indexed_indirect(&mut self, command_buffer: vk::CommandBuffer) {
        self.enqueue_descriptor_set_usage(command_buffer, vk::PipelineBindPoint::GRAPHICS);
    }

    pub fn cmd_dispatch(&mut self, command_buffer: vk::CommandBuffer) {
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Compute));
        self.enqueue_descriptor_set_usage(command_buffer, vk::PipelineBindPoint::COMPUTE);
    }

    pub fn cmd_dispatch_indirect(&mut self, command_buffer: vk::CommandBuffer) {
        self.cmd_dispatch(command_buffer);
    }
}

// transfers
impl Device {
    /// buffer 之间的传输只占用 TRANSFER stage，不跟踪 buffer 的使用状态
    pub fn cmd_copy_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
    }

    pub fn cmd_fill_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
    }

    pub fn cmd_update_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
    }

    /// 每个 region：src 读取，dst 写入
    fn enqueue_image_transfer(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
        regions: impl IntoIterator<Item = (vk::ImageSubresourceLayers, vk::ImageSubresourceLayers)>,
    ) {
        let src = self.images.key(src_image);
        let dst = self.images.key(dst_image);
        let cmd = self.command_buffers.by_handle_mut(command_buffer);

        for (src_layers, dst_layers) in regions {
            cmd.ledger.enqueue(DeferredOp::ImageLayersUsage {
                image: src,
                layers: src_layers,
                usage: ImageUsage::ResourceRead,
            });
            cmd.ledger.enqueue(DeferredOp::ImageLayersUsage {
                image: dst,
                layers: dst_layers,
                usage: ImageUsage::ResourceWrite,
            });
        }
    }

    pub fn cmd_copy_image(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
        regions: &[vk::ImageCopy],
    ) {
        let regions = regions.iter().map(|region| (region.src_subresource, region.dst_subresource));
        self.enqueue_image_transfer(command_buffer, src_image, dst_image, regions);
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
    }

    pub fn cmd_blit_image(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
        regions: &[vk::ImageBlit],
    ) {
        let regions = regions.iter().map(|region| (region.src_subresource, region.dst_subresource));
        self.enqueue_image_transfer(command_buffer, src_image, dst_image, regions);
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
    }

    /// resolve 先占用 TRANSFER，再记录使用状态
    pub fn cmd_resolve_image(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
        regions: &[vk::ImageResolve],
    ) {
        ObjectSink::new(&self.logger, vk::DebugReportObjectTypeEXT::COMMAND_BUFFER, command_buffer).performance_warning(
            MessageCode::ResolveImage,
            "Attempting to use vkCmdResolveImage to resolve a multisampled image. This is a very slow and extremely \
             bandwidth intensive path. You should always resolve multisampled images on-tile with pResolveAttachments \
             in VkRenderPass. This is effectively \"free\" on Mali GPUs."
                .to_string(),
        );
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
        let regions = regions.iter().map(|region| (region.src_subresource, region.dst_subresource));
        self.enqueue_image_transfer(command_buffer, src_image, dst_image, regions);
    }

    pub fn cmd_copy_buffer_to_image(
        &mut self,
        command_buffer: vk::CommandBuffer,
        dst_image: vk::Image,
        regions: &[vk::BufferImageCopy],
    ) {
        let image = self.images.key(dst_image);
        for region in regions {
            self.enqueue(
                command_buffer,
                DeferredOp::ImageLayersUsage {
                    image,
                    layers: region.image_subresource,
                    usage: ImageUsage::ResourceWrite,
                },
            );
        }
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
    }

    pub fn cmd_copy_image_to_buffer(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        regions: &[vk::BufferImageCopy],
    ) {
        let image = self.images.key(src_image);
        for region in regions {
            self.enqueue(
                command_buffer,
                DeferredOp::ImageLayersUsage {
                    image,
                    layers: region.image_subresource,
                    usage: ImageUsage::ResourceRead,
                },
            );
        }
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
    }

    fn enqueue_image_clear(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        let image = self.images.key(image);
        for range in ranges {
            self.enqueue(
                command_buffer,
                DeferredOp::ImageRangeUsage {
                    image,
                    range: *range,
                    usage: ImageUsage::Cleared,
                },
            );
        }
        self.enqueue(command_buffer, DeferredOp::PushWork(Stage::Transfer));
    }

    pub fn cmd_clear_color_image(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        self.enqueue_image_clear(command_buffer, image, ranges);
    }

    pub fn cmd_clear_depth_stencil_image(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        self.enqueue_image_clear(command_buffer, image, ranges);
    }
}

// secondary command buffers
impl Device {
    /// 提交时在当前位置回放 secondary 的账本
    pub fn cmd_execute_commands(&mut self, command_buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        for &secondary in secondaries {
            let secondary = self.command_buffers.key(secondary);
            self.enqueue(command_buffer, DeferredOp::ExecuteCommands(secondary));
        }
    }
}
