use ash::vk;
use itertools::Itertools;

/// pipeline 中影响分析结果的状态
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub bind_point: vk::PipelineBindPoint,
    pub primitive_restart: bool,
    pub depth_test_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    /// 每个 color blend attachment 的写入掩码
    pub color_write_masks: Vec<vk::ColorComponentFlags>,
    /// pipeline layout 中 descriptor set layout 的数量
    pub descriptor_set_count: u32,
}

// new & init
impl PipelineDesc {
    pub fn graphics() -> Self {
        Self {
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            primitive_restart: false,
            depth_test_enable: false,
            depth_compare_op: vk::CompareOp::NEVER,
            color_write_masks: Vec::new(),
            descriptor_set_count: 0,
        }
    }

    pub fn compute() -> Self {
        Self {
            bind_point: vk::PipelineBindPoint::COMPUTE,
            ..Self::graphics()
        }
    }

    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.primitive_restart = enable;
        self
    }

    pub fn depth_test(mut self, compare_op: vk::CompareOp) -> Self {
        self.depth_test_enable = true;
        self.depth_compare_op = compare_op;
        self
    }

    pub fn color_write_mask(mut self, mask: vk::ColorComponentFlags) -> Self {
        self.color_write_masks.push(mask);
        self
    }

    pub fn descriptor_set_count(mut self, count: u32) -> Self {
        self.descriptor_set_count = count;
        self
    }

    /// 从 `vkCreateGraphicsPipelines` 的参数中拷贝出需要的状态
    ///
    /// pipeline layout 不在这一层跟踪，set 数量由调用方给出
    ///
    /// # Safety
    ///
    /// `info` 中的各个 state 指针必须为空或者有效
    pub unsafe fn from_graphics_vk(info: &vk::GraphicsPipelineCreateInfo, descriptor_set_count: u32) -> Self {
        let mut desc = Self::graphics().descriptor_set_count(descriptor_set_count);

        unsafe {
            if let Some(input_assembly) = info.p_input_assembly_state.as_ref() {
                desc.primitive_restart = input_assembly.primitive_restart_enable == vk::TRUE;
            }

            if let Some(depth_stencil) = info.p_depth_stencil_state.as_ref() {
                desc.depth_test_enable = depth_stencil.depth_test_enable == vk::TRUE;
                desc.depth_compare_op = depth_stencil.depth_compare_op;
            }

            if let Some(blend) = info.p_color_blend_state.as_ref() {
                if !blend.p_attachments.is_null() {
                    desc.color_write_masks =
                        std::slice::from_raw_parts(blend.p_attachments, blend.attachment_count as usize)
                            .iter()
                            .map(|attachment| attachment.color_write_mask)
                            .collect_vec();
                }
            }
        }

        desc
    }
}

// getters
impl PipelineDesc {
    #[inline]
    pub fn is_graphics(&self) -> bool {
        self.bind_point == vk::PipelineBindPoint::GRAPHICS
    }

    /// 没有任何 color attachment 写入
    pub fn is_depth_only(&self) -> bool {
        self.color_write_masks.iter().all(|mask| mask.is_empty())
    }

    /// 深度测试使用 EQUAL / LESS_OR_EQUAL / GREATER_OR_EQUAL，常见于 depth pre-pass 之后的着色 pass
    pub fn has_depth_equal_test(&self) -> bool {
        self.depth_test_enable
            && matches!(
                self.depth_compare_op,
                vk::CompareOp::EQUAL | vk::CompareOp::LESS_OR_EQUAL | vk::CompareOp::GREATER_OR_EQUAL
            )
    }
}

pub struct Pipeline {
    handle: vk::Pipeline,
    desc: PipelineDesc,
}
// new & init
impl Pipeline {
    pub fn new(handle: vk::Pipeline, desc: PipelineDesc) -> Self {
        Self { handle, desc }
    }
}
// getters
impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }
}
