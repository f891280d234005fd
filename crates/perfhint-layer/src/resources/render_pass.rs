//! render pass 与 framebuffer 的元数据
//!
//! 只保存分析需要的部分：attachment 的 format 与 load/store op、每个 subpass 引用的 attachment、
//! 以及 subpass dependency。

use ash::vk;
use itertools::Itertools;
use perfhint_analysis::stage::StageFlags;
use perfhint_analysis::usage::ImageUsage;

use crate::format::{format_uses_color_depth_ops, format_uses_stencil_ops};
use crate::handles::{ImageViewKey, RenderPassKey};

/// 一个 subpass 引用的 attachment 下标，可能是 `vk::ATTACHMENT_UNUSED`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubpassDesc {
    pub input_attachments: Vec<u32>,
    pub color_attachments: Vec<u32>,
    /// 为空或者与 `color_attachments` 等长
    pub resolve_attachments: Vec<u32>,
    pub depth_stencil_attachment: Option<u32>,
}

impl SubpassDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, attachment: u32) -> Self {
        self.input_attachments.push(attachment);
        self
    }

    pub fn color(mut self, attachment: u32) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn resolve(mut self, attachment: u32) -> Self {
        self.resolve_attachments.push(attachment);
        self
    }

    pub fn depth_stencil(mut self, attachment: u32) -> Self {
        self.depth_stencil_attachment = Some(attachment);
        self
    }

    /// # Safety
    ///
    /// `desc` 中的指针与数量必须一致且可读
    unsafe fn from_vk(desc: &vk::SubpassDescription) -> Self {
        let attachment = |reference: &vk::AttachmentReference| reference.attachment;
        unsafe {
            Self {
                input_attachments: raw_slice(desc.p_input_attachments, desc.input_attachment_count)
                    .iter()
                    .map(attachment)
                    .collect_vec(),
                color_attachments: raw_slice(desc.p_color_attachments, desc.color_attachment_count)
                    .iter()
                    .map(attachment)
                    .collect_vec(),
                resolve_attachments: raw_slice(desc.p_resolve_attachments, desc.color_attachment_count)
                    .iter()
                    .map(attachment)
                    .collect_vec(),
                depth_stencil_attachment: desc.p_depth_stencil_attachment.as_ref().map(attachment),
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

// new & init
impl RenderPassDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attachment(mut self, attachment: vk::AttachmentDescription) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn subpass(mut self, subpass: SubpassDesc) -> Self {
        self.subpasses.push(subpass);
        self
    }

    pub fn dependency(mut self, dependency: vk::SubpassDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// 从 `vkCreateRenderPass` 的参数中拷贝出需要的数据
    ///
    /// # Safety
    ///
    /// `info` 及其引用的所有数组必须有效
    pub unsafe fn from_vk(info: &vk::RenderPassCreateInfo) -> Self {
        unsafe {
            Self {
                attachments: raw_slice(info.p_attachments, info.attachment_count).to_vec(),
                subpasses: raw_slice(info.p_subpasses, info.subpass_count)
                    .iter()
                    .map(|desc| SubpassDesc::from_vk(desc))
                    .collect_vec(),
                dependencies: raw_slice(info.p_dependencies, info.dependency_count).to_vec(),
            }
        }
    }
}

// getters
impl RenderPassDesc {
    /// attachment 作为 color、resolve 或者 depth stencil 出现在任意 subpass 中
    pub fn uses_attachment_on_tile(&self, attachment: u32) -> bool {
        self.subpasses.iter().any(|subpass| {
            subpass.color_attachments.contains(&attachment)
                || subpass.resolve_attachments.contains(&attachment)
                || subpass.depth_stencil_attachment == Some(attachment)
        })
    }

    /// attachment 只作为 input attachment 使用，相当于普通的纹理读取
    pub fn uses_attachment_as_image_only(&self, attachment: u32) -> bool {
        if self.uses_attachment_on_tile(attachment) {
            return false;
        }
        self.subpasses.iter().any(|subpass| subpass.input_attachments.contains(&attachment))
    }

    pub fn has_color_attachments(&self) -> bool {
        self.subpasses.iter().any(|subpass| !subpass.color_attachments.is_empty())
    }

    pub fn has_depth_stencil_attachment(&self) -> bool {
        self.subpasses.iter().any(|subpass| subpass.depth_stencil_attachment.is_some())
    }

    /// attachment 在 begin 时需要从内存读回 tile
    pub fn loads_attachment(&self, attachment: u32) -> bool {
        let desc = &self.attachments[attachment as usize];
        (format_uses_color_depth_ops(desc.format) && desc.load_op == vk::AttachmentLoadOp::LOAD)
            || (format_uses_stencil_ops(desc.format) && desc.stencil_load_op == vk::AttachmentLoadOp::LOAD)
    }

    /// begin render pass 时 attachment 的使用方式，未使用的 attachment 返回 `None`
    ///
    /// DONT_CARE 视为 `Undefined`
    pub fn load_usage(&self, attachment: u32) -> Option<ImageUsage> {
        if self.uses_attachment_as_image_only(attachment) {
            // input attachment 的 LOAD 不会读回 tile
            return Some(ImageUsage::ResourceRead);
        }
        if !self.uses_attachment_on_tile(attachment) {
            return None;
        }

        let desc = &self.attachments[attachment as usize];
        let color_depth = format_uses_color_depth_ops(desc.format);
        let stencil = format_uses_stencil_ops(desc.format);

        let cleared = (color_depth && desc.load_op == vk::AttachmentLoadOp::CLEAR)
            || (stencil && desc.stencil_load_op == vk::AttachmentLoadOp::CLEAR);

        let usage = if cleared {
            ImageUsage::RenderPassCleared
        } else if self.loads_attachment(attachment) {
            ImageUsage::RenderPassReadToTile
        } else {
            ImageUsage::Undefined
        };
        Some(usage)
    }

    /// render pass 结束时 attachment 的使用方式，不在 tile 上的 attachment 返回 `None`
    pub fn store_usage(&self, attachment: u32) -> Option<ImageUsage> {
        if !self.uses_attachment_on_tile(attachment) {
            return None;
        }

        let desc = &self.attachments[attachment as usize];
        let stored = (format_uses_color_depth_ops(desc.format) && desc.store_op == vk::AttachmentStoreOp::STORE)
            || (format_uses_stencil_ops(desc.format) && desc.stencil_store_op == vk::AttachmentStoreOp::STORE);

        Some(if stored {
            ImageUsage::RenderPassStored
        } else {
            ImageUsage::RenderPassDiscarded
        })
    }

    /// render pass 开始前的隐式 barrier：所有 `src_subpass == VK_SUBPASS_EXTERNAL` 的 dependency
    pub fn external_barrier_before(&self) -> (StageFlags, StageFlags) {
        self.external_barrier(|dependency| dependency.src_subpass == vk::SUBPASS_EXTERNAL)
    }

    /// render pass 结束后的隐式 barrier：所有 `dst_subpass == VK_SUBPASS_EXTERNAL` 的 dependency
    pub fn external_barrier_after(&self) -> (StageFlags, StageFlags) {
        self.external_barrier(|dependency| dependency.dst_subpass == vk::SUBPASS_EXTERNAL)
    }

    fn external_barrier(&self, filter: impl Fn(&vk::SubpassDependency) -> bool) -> (StageFlags, StageFlags) {
        self.dependencies
            .iter()
            .filter(|dependency| filter(dependency))
            .fold((StageFlags::empty(), StageFlags::empty()), |(src, dst), dependency| {
                (
                    src | StageFlags::from_vk_src(dependency.src_stage_mask),
                    dst | StageFlags::from_vk_dst(dependency.dst_stage_mask),
                )
            })
    }
}

pub struct RenderPass {
    handle: vk::RenderPass,
    desc: RenderPassDesc,
}
// new & init
impl RenderPass {
    pub fn new(handle: vk::RenderPass, desc: RenderPassDesc) -> Self {
        Self { handle, desc }
    }
}
// getters
impl RenderPass {
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

pub struct Framebuffer {
    handle: vk::Framebuffer,
    render_pass: RenderPassKey,
    attachments: Vec<ImageViewKey>,
}
// new & init
impl Framebuffer {
    pub fn new(handle: vk::Framebuffer, render_pass: RenderPassKey, attachments: Vec<ImageViewKey>) -> Self {
        Self {
            handle,
            render_pass,
            attachments,
        }
    }
}
// getters
impl Framebuffer {
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    #[inline]
    pub fn render_pass(&self) -> RenderPassKey {
        self.render_pass
    }

    #[inline]
    pub fn attachments(&self) -> &[ImageViewKey] {
        &self.attachments
    }
}

/// 空指针或者数量为 0 时返回空切片
unsafe fn raw_slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, count as usize) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(format: vk::Format, load_op: vk::AttachmentLoadOp) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
    }

    #[test]
    fn test_from_vk() {
        let attachments = [
            attachment(vk::Format::R8G8B8A8_UNORM, vk::AttachmentLoadOp::CLEAR),
            attachment(vk::Format::D32_SFLOAT, vk::AttachmentLoadOp::CLEAR),
        ];
        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COMPUTE_SHADER)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let desc = unsafe { RenderPassDesc::from_vk(&info) };
        assert_eq!(desc.attachments.len(), 2);
        assert_eq!(desc.subpasses, vec![SubpassDesc::new().color(0).depth_stencil(1)]);
        assert!(desc.has_color_attachments());
        assert!(desc.has_depth_stencil_attachment());
        assert_eq!(desc.external_barrier_before(), (StageFlags::COMPUTE, StageFlags::FRAGMENT));
        assert_eq!(desc.external_barrier_after(), (StageFlags::empty(), StageFlags::empty()));
    }

    #[test]
    fn test_attachment_classification() {
        let desc = RenderPassDesc::new()
            .attachment(attachment(vk::Format::R8G8B8A8_UNORM, vk::AttachmentLoadOp::LOAD))
            .attachment(attachment(vk::Format::R8G8B8A8_UNORM, vk::AttachmentLoadOp::LOAD))
            .attachment(attachment(vk::Format::R8G8B8A8_UNORM, vk::AttachmentLoadOp::CLEAR))
            .attachment(attachment(vk::Format::R8G8B8A8_UNORM, vk::AttachmentLoadOp::DONT_CARE))
            .subpass(SubpassDesc::new().color(0).input(1))
            .subpass(SubpassDesc::new().input(0).color(2));

        assert!(desc.uses_attachment_on_tile(0));
        assert!(!desc.uses_attachment_as_image_only(0));
        assert!(desc.uses_attachment_as_image_only(1));
        assert!(!desc.uses_attachment_on_tile(3));

        assert_eq!(desc.load_usage(0), Some(ImageUsage::RenderPassReadToTile));
        assert_eq!(desc.load_usage(1), Some(ImageUsage::ResourceRead));
        assert_eq!(desc.load_usage(2), Some(ImageUsage::RenderPassCleared));
        assert_eq!(desc.load_usage(3), None);

        assert_eq!(desc.store_usage(0), Some(ImageUsage::RenderPassStored));
        assert_eq!(desc.store_usage(1), None);
        assert_eq!(desc.store_usage(3), None);
    }

    #[test]
    fn test_stencil_ops() {
        let stencil_only = vk::AttachmentDescription::default()
            .format(vk::Format::S8_UINT)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE);
        let depth_stencil = vk::AttachmentDescription::default()
            .format(vk::Format::D24_UNORM_S8_UINT)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::LOAD)
            .stencil_store_op(vk::AttachmentStoreOp::STORE);
        let desc = RenderPassDesc::new()
            .attachment(stencil_only)
            .attachment(depth_stencil)
            .subpass(SubpassDesc::new().depth_stencil(0))
            .subpass(SubpassDesc::new().depth_stencil(1));

        // stencil-only format 忽略 load_op/store_op
        assert!(!desc.loads_attachment(0));
        assert_eq!(desc.load_usage(0), Some(ImageUsage::Undefined));
        assert_eq!(desc.store_usage(0), Some(ImageUsage::RenderPassDiscarded));

        assert!(desc.loads_attachment(1));
        assert_eq!(desc.load_usage(1), Some(ImageUsage::RenderPassReadToTile));
        assert_eq!(desc.store_usage(1), Some(ImageUsage::RenderPassStored));
    }

    #[test]
    fn test_external_barrier_normalization() {
        let desc = RenderPassDesc::new()
            .dependency(
                vk::SubpassDependency::default()
                    .src_subpass(0)
                    .dst_subpass(vk::SUBPASS_EXTERNAL)
                    .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                    .dst_stage_mask(vk::PipelineStageFlags::TRANSFER),
            )
            .dependency(
                vk::SubpassDependency::default()
                    .src_subpass(0)
                    .dst_subpass(1)
                    .src_stage_mask(vk::PipelineStageFlags::COMPUTE_SHADER)
                    .dst_stage_mask(vk::PipelineStageFlags::COMPUTE_SHADER),
            );

        assert_eq!(desc.external_barrier_after(), (StageFlags::all(), StageFlags::TRANSFER));
        assert_eq!(desc.external_barrier_before(), (StageFlags::empty(), StageFlags::empty()));
    }
}
