//! command buffer 录制期间的启发式检查
//!
//! 集合是固定的，每个 command buffer 持有一份 [`Heuristic::default_set`]，
//! 录制命令时按顺序调用对应的 hook。

use ash::vk;
use perfhint_analysis::message::{MessageCode, ReportSink};

use crate::config::PerfConfig;
use crate::logger::{Logger, ObjectSink};
use crate::resources::pipeline::PipelineDesc;
use crate::resources::render_pass::{RenderPass, RenderPassDesc};

/// hook 运行时可见的 device 状态
pub struct HeuristicContext<'a> {
    pub config: &'a PerfConfig,
    pub logger: &'a Logger,
    pub command_buffer: vk::CommandBuffer,
}

impl HeuristicContext<'_> {
    fn warn_command_buffer(&self, code: MessageCode, message: String) {
        ObjectSink::new(self.logger, vk::DebugReportObjectTypeEXT::COMMAND_BUFFER, self.command_buffer)
            .performance_warning(code, message);
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    struct DepthPrePassState: u32 {
        const DEPTH_ATTACHMENT = 1 << 0;
        const COLOR_ATTACHMENT = 1 << 1;
        const DEPTH_ONLY = 1 << 2;
        const DEPTH_EQUAL_TEST = 1 << 3;
        const INSIDE_RENDER_PASS = 1 << 4;
    }
}

/// 统计 depth-only 的 draw 和 depth EQUAL 测试的 draw，两者都很多时认为使用了 depth pre-pass
#[derive(Clone, Debug, Default)]
pub struct DepthPrePass {
    state: DepthPrePassState,
    depth_only_draws: u32,
    depth_equal_draws: u32,
}

impl DepthPrePass {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn begin_render_pass(&mut self, render_pass: &RenderPassDesc) {
        assert!(
            !self.state.contains(DepthPrePassState::INSIDE_RENDER_PASS),
            "render pass begun inside another render pass"
        );
        self.reset();

        if render_pass.has_depth_stencil_attachment() {
            self.state |= DepthPrePassState::DEPTH_ATTACHMENT;
        }
        if render_pass.has_color_attachments() {
            self.state |= DepthPrePassState::COLOR_ATTACHMENT;
        }
        self.state |= DepthPrePassState::INSIDE_RENDER_PASS;
    }

    fn end_render_pass(&mut self, ctx: &HeuristicContext) {
        assert!(
            self.state.contains(DepthPrePassState::INSIDE_RENDER_PASS),
            "render pass ended outside of a render pass"
        );
        self.state.remove(DepthPrePassState::INSIDE_RENDER_PASS);

        let both = DepthPrePassState::DEPTH_ATTACHMENT | DepthPrePassState::COLOR_ATTACHMENT;
        let threshold = ctx.config.depth_pre_pass_num_draw_calls;
        if self.state.contains(both) && self.depth_only_draws >= threshold && self.depth_equal_draws >= threshold {
            ctx.warn_command_buffer(
                MessageCode::DepthPrePass,
                "Detected possible rendering pattern using depth pre-pass. This is not recommended on Mali due to \
                 extra geometry pressure and CPU overhead."
                    .to_string(),
            );
        }
    }

    fn bind_pipeline(&mut self, pipeline: &PipelineDesc) {
        if !pipeline.is_graphics() {
            let inside = self.state & DepthPrePassState::INSIDE_RENDER_PASS;
            self.reset();
            self.state = inside;
            return;
        }

        self.state.set(DepthPrePassState::DEPTH_ONLY, pipeline.is_depth_only());
        self.state.set(DepthPrePassState::DEPTH_EQUAL_TEST, pipeline.has_depth_equal_test());
    }

    fn count_draw(&mut self, total: u64, min: u32) {
        if total < u64::from(min) {
            return;
        }
        if self.state.contains(DepthPrePassState::DEPTH_ONLY) {
            self.depth_only_draws += 1;
        }
        if self.state.contains(DepthPrePassState::DEPTH_EQUAL_TEST) {
            self.depth_equal_draws += 1;
        }
    }
}

/// `vkCmdClearAttachments` 的使用是否可以用 LOAD_OP_CLEAR 代替
#[derive(Clone, Debug, Default)]
pub struct ClearAttachments {
    subpass: u32,
    has_seen_draw: bool,
}

impl ClearAttachments {
    fn clear_attachments(
        &self,
        ctx: &HeuristicContext,
        render_pass: &RenderPassDesc,
        attachments: &[vk::ClearAttachment],
        rects: &[vk::ClearRect],
    ) {
        let clear_pixels: u64 = rects
            .iter()
            .map(|rect| u64::from(rect.layer_count) * u64::from(rect.rect.extent.width) * u64::from(rect.rect.extent.height))
            .sum();
        if clear_pixels == 0 {
            return;
        }

        let subpass = &render_pass.subpasses[self.subpass as usize];
        let first_draw_missing = !self.has_seen_draw && self.subpass == 0;

        for attachment in attachments {
            if attachment.aspect_mask.contains(vk::ImageAspectFlags::COLOR) {
                let color = attachment.color_attachment;
                assert!(
                    (color as usize) < subpass.color_attachments.len(),
                    "color attachment {color} out of range"
                );

                let index = subpass.color_attachments[color as usize];
                if index != vk::ATTACHMENT_UNUSED {
                    let format = render_pass.attachments[index as usize].format;
                    if render_pass.attachments[index as usize].load_op == vk::AttachmentLoadOp::LOAD {
                        ctx.warn_command_buffer(
                            MessageCode::ClearAttachmentsAfterLoad,
                            format!(
                                "vkCmdClearAttachments is being called for color attachment #{color} (fmt: \
                                 {format:?}) in this subpass, but LOAD_OP_LOAD was used. If you need to clear the \
                                 framebuffer, always use LOAD_OP_CLEAR as vkCmdClearAttachments will create a clear \
                                 quad with {clear_pixels} pixels."
                            ),
                        );
                    }
                    if first_draw_missing {
                        ctx.warn_command_buffer(
                            MessageCode::ClearAttachmentsNoDrawCall,
                            format!(
                                "vkCmdClearAttachments is being called for color attachment #{color} (fmt: \
                                 {format:?}) in this subpass before any draw call was submitted. Try to use the \
                                 LOAD_OP_CLEAR way of clearing as vkCmdClearAttachments will create a clear quad with \
                                 {clear_pixels} pixels."
                            ),
                        );
                    }
                }
            }

            let Some(index) = subpass.depth_stencil_attachment else {
                continue;
            };
            if index == vk::ATTACHMENT_UNUSED {
                continue;
            }
            let desc = &render_pass.attachments[index as usize];

            let aspects = [
                (vk::ImageAspectFlags::DEPTH, "depth", desc.load_op),
                (vk::ImageAspectFlags::STENCIL, "stencil", desc.stencil_load_op),
            ];
            for (aspect, name, load_op) in aspects {
                if !attachment.aspect_mask.contains(aspect) {
                    continue;
                }

                if load_op == vk::AttachmentLoadOp::LOAD {
                    ctx.warn_command_buffer(
                        MessageCode::ClearAttachmentsAfterLoad,
                        format!(
                            "vkCmdClearAttachments is being called for {name} attachment (fmt: {:?}) in this \
                             subpass, but LOAD_OP_LOAD was used. If you need to clear the framebuffer, always use \
                             LOAD_OP_CLEAR as vkCmdClearAttachments will create a clear quad of {clear_pixels} pixels.",
                            desc.format
                        ),
                    );
                } else if first_draw_missing {
                    ctx.warn_command_buffer(
                        MessageCode::ClearAttachmentsNoDrawCall,
                        format!(
                            "vkCmdClearAttachments is being called for {name} attachment (fmt: {:?}) in this \
                             subpass before any draw call was submitted. Try to use the LOAD_OP_CLEAR way of \
                             clearing as vkCmdClearAttachments will create a clear quad of {clear_pixels} pixels.",
                            desc.format
                        ),
                    );
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum Heuristic {
    DepthPrePass(DepthPrePass),
    /// render pass 以 LOAD_OP_LOAD 开始时，driver 需要把 attachment 读回 tile
    TileReadback,
    ClearAttachments(ClearAttachments),
}

// new & init
impl Heuristic {
    pub fn default_set() -> Vec<Heuristic> {
        vec![
            Heuristic::DepthPrePass(DepthPrePass::default()),
            Heuristic::TileReadback,
            Heuristic::ClearAttachments(ClearAttachments::default()),
        ]
    }

    pub fn reset(&mut self) {
        match self {
            Heuristic::DepthPrePass(depth) => depth.reset(),
            Heuristic::TileReadback => {}
            Heuristic::ClearAttachments(clear) => *clear = ClearAttachments::default(),
        }
    }
}

// hooks
impl Heuristic {
    pub fn begin_render_pass(&mut self, ctx: &HeuristicContext, render_pass: &RenderPass, render_area: &vk::Rect2D) {
        match self {
            Heuristic::DepthPrePass(depth) => depth.begin_render_pass(render_pass.desc()),
            Heuristic::TileReadback => Self::check_tile_readback(ctx, render_pass, render_area),
            Heuristic::ClearAttachments(clear) => {
                clear.subpass = 0;
                clear.has_seen_draw = false;
            }
        }
    }

    pub fn end_render_pass(&mut self, ctx: &HeuristicContext) {
        if let Heuristic::DepthPrePass(depth) = self {
            depth.end_render_pass(ctx);
        }
    }

    /// secondary command buffer 继承 render pass
    pub fn set_render_pass(&mut self) {
        if let Heuristic::ClearAttachments(clear) = self {
            clear.has_seen_draw = false;
        }
    }

    pub fn set_subpass(&mut self, subpass: u32) {
        if let Heuristic::ClearAttachments(clear) = self {
            clear.subpass = subpass;
        }
    }

    pub fn bind_pipeline(&mut self, pipeline: &PipelineDesc) {
        if let Heuristic::DepthPrePass(depth) = self {
            depth.bind_pipeline(pipeline);
        }
    }

    pub fn draw(&mut self, ctx: &HeuristicContext, vertex_count: u32, instance_count: u32) {
        match self {
            Heuristic::DepthPrePass(depth) => depth.count_draw(
                u64::from(vertex_count) * u64::from(instance_count),
                ctx.config.depth_pre_pass_min_vertices,
            ),
            Heuristic::TileReadback => {}
            Heuristic::ClearAttachments(clear) => clear.has_seen_draw = true,
        }
    }

    pub fn draw_indexed(&mut self, ctx: &HeuristicContext, index_count: u32, instance_count: u32) {
        match self {
            Heuristic::DepthPrePass(depth) => depth.count_draw(
                u64::from(index_count) * u64::from(instance_count),
                ctx.config.depth_pre_pass_min_indices,
            ),
            Heuristic::TileReadback => {}
            Heuristic::ClearAttachments(clear) => clear.has_seen_draw = true,
        }
    }

    pub fn clear_attachments(
        &mut self,
        ctx: &HeuristicContext,
        render_pass: &RenderPassDesc,
        attachments: &[vk::ClearAttachment],
        rects: &[vk::ClearRect],
    ) {
        if let Heuristic::ClearAttachments(clear) = self {
            clear.clear_attachments(ctx, render_pass, attachments, rects);
        }
    }
}
// tools
impl Heuristic {
    fn check_tile_readback(ctx: &HeuristicContext, render_pass: &RenderPass, render_area: &vk::Rect2D) {
        let desc = render_pass.desc();
        let mut sink = ObjectSink::new(ctx.logger, vk::DebugReportObjectTypeEXT::RENDER_PASS, render_pass.handle());

        for (index, attachment) in desc.attachments.iter().enumerate() {
            let index = index as u32;
            if !desc.loads_attachment(index) || !desc.uses_attachment_on_tile(index) {
                continue;
            }

            let vk::Rect2D { offset, extent } = *render_area;
            sink.performance_warning(
                MessageCode::TileReadback,
                format!(
                    "Attachment #{index} (fmt: {:?}) in render pass has begun with VK_ATTACHMENT_LOAD_OP_LOAD. \
                     Submitting this renderpass will cause the driver to inject a readback of the attachment which \
                     will copy in total {} pixels (renderArea = {{ {}, {}, {}, {} }}) to the tile buffer.",
                    attachment.format,
                    u64::from(extent.width) * u64::from(extent.height),
                    offset.x,
                    offset.y,
                    extent.width,
                    extent.height
                ),
            );
        }
    }
}
