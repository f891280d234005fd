use ash::vk;

use crate::handles::{BufferKey, DescriptorSetKey, PipelineKey, RenderPassKey};
use crate::heuristics::Heuristic;
use crate::ledger::DeferredLedger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBinding {
    pub buffer: BufferKey,
    pub offset: vk::DeviceSize,
    pub index_type: vk::IndexType,
}

/// 绑定到某个 set 下标的 descriptor set，dirty 表示绑定后还没有被 draw/dispatch 使用过
#[derive(Clone, Copy, Debug, Default)]
pub struct BoundDescriptorSet {
    pub set: Option<DescriptorSetKey>,
    pub dirty: bool,
}

/// 某个 bind point 上的 pipeline 和 descriptor set
#[derive(Clone, Debug, Default)]
pub struct BindPointState {
    pub pipeline: Option<PipelineKey>,
    pub sets: Vec<BoundDescriptorSet>,
}

impl BindPointState {
    pub fn bind_sets(&mut self, first_set: u32, sets: impl IntoIterator<Item = DescriptorSetKey>) {
        for (index, set) in (first_set as usize..).zip(sets) {
            if self.sets.len() <= index {
                self.sets.resize(index + 1, BoundDescriptorSet::default());
            }
            self.sets[index] = BoundDescriptorSet {
                set: Some(set),
                dirty: true,
            };
        }
    }

    /// 取出前 `set_count` 个 dirty 的 set，并清除 dirty 标记
    pub fn take_dirty_sets(&mut self, set_count: u32) -> Vec<DescriptorSetKey> {
        let count = self.sets.len().min(set_count as usize);
        self.sets[..count]
            .iter_mut()
            .filter(|bound| bound.dirty)
            .filter_map(|bound| {
                bound.dirty = false;
                bound.set
            })
            .collect()
    }
}

/// 每次 begin 时重置的录制状态
#[derive(Clone, Debug, Default)]
pub struct RecordingState {
    pub index_buffer: Option<IndexBinding>,
    pub small_indexed_drawcalls: u32,
    pub render_pass: Option<RenderPassKey>,
    pub subpass: u32,
    pub graphics: BindPointState,
    pub compute: BindPointState,
}

impl RecordingState {
    pub fn bind_point_mut(&mut self, bind_point: vk::PipelineBindPoint) -> &mut BindPointState {
        if bind_point == vk::PipelineBindPoint::COMPUTE {
            &mut self.compute
        } else {
            &mut self.graphics
        }
    }
}

pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    level: vk::CommandBufferLevel,

    pub(crate) ledger: DeferredLedger,
    pub(crate) state: RecordingState,
    pub(crate) heuristics: Vec<Heuristic>,
}
// new & init
impl CommandBuffer {
    pub fn new(handle: vk::CommandBuffer, level: vk::CommandBufferLevel) -> Self {
        Self {
            handle,
            level,
            ledger: DeferredLedger::new(),
            state: RecordingState::default(),
            heuristics: Heuristic::default_set(),
        }
    }

    /// 重新录制前丢弃未提交的账本和所有录制状态
    pub fn reset(&mut self) {
        self.ledger.reset();
        self.state = RecordingState::default();
        self.heuristics.iter_mut().for_each(Heuristic::reset);
    }
}
// getters
impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    #[inline]
    pub fn level(&self) -> vk::CommandBufferLevel {
        self.level
    }

    #[inline]
    pub fn ledger(&self) -> &DeferredLedger {
        &self.ledger
    }

    #[inline]
    pub fn state(&self) -> &RecordingState {
        &self.state
    }

    #[inline]
    pub fn is_inside_render_pass(&self) -> bool {
        self.state.render_pass.is_some()
    }
}
