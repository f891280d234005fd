//! Event 的同步状态

use crate::stage::Stage;

/// 一个 `VkEvent` 在依赖跟踪中的状态
///
/// `vkCmdSetEvent` 回放时从 signal 所在的 stage 拷贝一份等待列表，
/// `vkCmdWaitEvents` 回放时合并到目标 stage，见 [`crate::queue_tracker::QueueTracker`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventState {
    pub(crate) signalled: bool,
    pub(crate) wait_list: [u64; Stage::COUNT],
}

impl EventState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只清除 signal 标记，等待列表下次 signal 时会被覆盖
    pub fn reset(&mut self) {
        self.signalled = false;
    }

    /// host 端 `vkSetEvent`
    ///
    /// host 的 signal 不依赖任何 GPU 工作，等待列表清零，之后的 wait 不会引入依赖
    pub fn signal_from_host(&mut self) {
        if self.signalled {
            return;
        }
        self.wait_list = [0; Stage::COUNT];
        self.signalled = true;
    }

    #[inline]
    pub fn is_signalled(&self) -> bool {
        self.signalled
    }

    #[inline]
    pub fn wait_list(&self) -> &[u64; Stage::COUNT] {
        &self.wait_list
    }
}
