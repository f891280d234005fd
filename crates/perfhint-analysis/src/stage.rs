//! 粗粒度 stage 划分
//!
//! Vulkan 的 pipeline stage 有几十个 bit，依赖跟踪只关心 4 个粗粒度的 stage。
//! `vk::PipelineStageFlags` 与 [`StageFlags`] 是两套独立的 bitmask，
//! 只通过 [`StageFlags::from_vk`] 转换。

use ash::vk;

/// 依赖跟踪使用的 stage
///
/// Geometry 和 Compute 在硬件上不会并发执行
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Compute = 0,
    Geometry = 1,
    Fragment = 2,
    Transfer = 3,
}

impl Stage {
    pub const COUNT: usize = 4;
    pub const ALL: [Stage; Self::COUNT] = [Stage::Compute, Stage::Geometry, Stage::Fragment, Stage::Transfer];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn flag(self) -> StageFlags {
        StageFlags::from_bits_truncate(1 << self as u32)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Compute => "COMPUTE",
            Stage::Geometry => "GEOMETRY",
            Stage::Fragment => "FRAGMENT",
            Stage::Transfer => "TRANSFER",
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StageFlags: u32 {
        const COMPUTE = 1 << 0;
        const GEOMETRY = 1 << 1;
        const FRAGMENT = 1 << 2;
        const TRANSFER = 1 << 3;
    }
}

impl StageFlags {
    /// 按 stage 顺序遍历置位的 stage
    pub fn stages(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |stage| self.contains(stage.flag()))
    }

    /// 将 Vulkan stage mask 映射到粗粒度 stage
    ///
    /// TOP_OF_PIPE / BOTTOM_OF_PIPE 不对应任何 stage，需要先经过
    /// [`normalize_src_stages`] / [`normalize_dst_stages`]
    pub fn from_vk(stages: vk::PipelineStageFlags) -> Self {
        let mut flags = StageFlags::empty();

        if stages.intersects(
            vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
                | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ) {
            flags |= StageFlags::FRAGMENT;
        }

        if stages.intersects(
            vk::PipelineStageFlags::DRAW_INDIRECT
                | vk::PipelineStageFlags::VERTEX_INPUT
                | vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::GEOMETRY_SHADER
                | vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER
                | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER,
        ) {
            flags |= StageFlags::GEOMETRY;
        }

        if stages.contains(vk::PipelineStageFlags::TRANSFER) {
            flags |= StageFlags::TRANSFER;
        }
        if stages.contains(vk::PipelineStageFlags::COMPUTE_SHADER) {
            flags |= StageFlags::COMPUTE;
        }
        if stages.contains(vk::PipelineStageFlags::ALL_COMMANDS) {
            flags |= StageFlags::all();
        }
        if stages.contains(vk::PipelineStageFlags::ALL_GRAPHICS) {
            flags |= StageFlags::GEOMETRY | StageFlags::FRAGMENT;
        }

        flags
    }

    /// 作为 src mask 使用时的转换
    pub fn from_vk_src(stages: vk::PipelineStageFlags) -> Self {
        Self::from_vk(normalize_src_stages(stages))
    }

    /// 作为 dst mask 使用时的转换
    pub fn from_vk_dst(stages: vk::PipelineStageFlags) -> Self {
        Self::from_vk(normalize_dst_stages(stages))
    }
}

/// src 中的 BOTTOM_OF_PIPE 等待之前所有的工作
pub fn normalize_src_stages(stages: vk::PipelineStageFlags) -> vk::PipelineStageFlags {
    if stages.contains(vk::PipelineStageFlags::BOTTOM_OF_PIPE) {
        stages | vk::PipelineStageFlags::ALL_COMMANDS
    } else {
        stages
    }
}

/// dst 中的 TOP_OF_PIPE 阻塞之后所有的工作
pub fn normalize_dst_stages(stages: vk::PipelineStageFlags) -> vk::PipelineStageFlags {
    if stages.contains(vk::PipelineStageFlags::TOP_OF_PIPE) {
        stages | vk::PipelineStageFlags::ALL_COMMANDS
    } else {
        stages
    }
}
