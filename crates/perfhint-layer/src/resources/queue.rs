use ash::vk;
use perfhint_analysis::queue_tracker::QueueTracker;

/// 每个 queue 独占一个 [`QueueTracker`]，提交时在上面回放 command buffer 的账本
pub struct Queue {
    handle: vk::Queue,
    family_index: u32,
    pub(crate) tracker: QueueTracker,
}

impl Queue {
    pub fn new(handle: vk::Queue, family_index: u32) -> Self {
        Self {
            handle,
            family_index,
            tracker: QueueTracker::new(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    #[inline]
    pub fn tracker(&self) -> &QueueTracker {
        &self.tracker
    }
}
