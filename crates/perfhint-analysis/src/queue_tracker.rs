//! 队列上的 stage 依赖跟踪
//!
//! 把 GPU 看作 4 个可以并发执行的粗粒度 stage，barrier 会让一个 stage 等待另一个
//! stage 之前提交的工作完成。当一个 barrier 绕了一圈又回到原来的 stage，并且这个
//! stage 上已经有工作在排队，就会产生 pipeline bubble。
//!
//! 每个 stage 记录三样东西：
//! - `index`：已经提交到该 stage 的工作数量
//! - `wait_list[s]`：该 stage 需要等待的 stage `s` 的最大 index
//! - `last_dst_stage_index[s]`：对 `s` 的依赖建立时，该 stage 自己的 index
//!
//! `last_dst_stage_index` 用来区分真实的依赖环和传递得到的依赖。

use crate::event::EventState;
use crate::message::{MessageCode, ReportSink};
use crate::stage::{Stage, StageFlags};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageStatus {
    /// 需要等待的其他 stage 的工作 index
    pub wait_list: [u64; Stage::COUNT],
    /// 已经提交到该 stage 的工作数量
    pub index: u64,
    /// 该 stage 最近一次作为 dst 时的 index
    pub last_dst_stage_index: [u64; Stage::COUNT],
}

/// 单个队列的依赖跟踪器
///
/// 只由所属的 queue 持有，所有修改都在全局锁内进行
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueTracker {
    stages: [StageStatus; Stage::COUNT],
}

// new & init
impl QueueTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

// getters
impl QueueTracker {
    #[inline]
    pub fn stage_status(&self, stage: Stage) -> &StageStatus {
        &self.stages[stage.index()]
    }

    #[inline]
    pub fn work_index(&self, stage: Stage) -> u64 {
        self.stages[stage.index()].index
    }
}

// tools
impl QueueTracker {
    /// 向 `dst_stage` 提交一份工作
    ///
    /// 提交前检查 `dst_stage` 是否会因为等待其他 stage 而进入空闲
    pub fn push_work(&mut self, dst_stage: Stage, sink: &mut dyn ReportSink) {
        let dst = dst_stage.index();

        for src_stage in Stage::ALL {
            let src = src_stage.index();
            if src == dst {
                continue;
            }

            // 等待的是 src 上已提交的全部工作，才可能出现 bubble
            if self.stages[dst].wait_list[src] != self.stages[src].index {
                continue;
            }

            // dst 上还没有工作，没有可以被阻塞的东西
            if self.stages[dst].index == 0 {
                continue;
            }

            // GEOMETRY 和 COMPUTE 不会并发执行
            if (src_stage.flag() | dst_stage.flag()) == (StageFlags::GEOMETRY | StageFlags::COMPUTE) {
                continue;
            }

            // src 又依赖 dst 最近一次提交的工作，形成环。
            // 如果依赖建立之后 src 上没有新工作，那只是 dst -> dst 的传递依赖
            if self.stages[src].wait_list[dst] == self.stages[dst].index
                && self.stages[src].index != self.stages[src].last_dst_stage_index[dst]
            {
                sink.performance_warning(
                    MessageCode::PipelineBubble,
                    format!(
                        "Pipeline bubble detected in stage {}. Work in stage {} will block execution in stage {}.",
                        dst_stage.name(),
                        src_stage.name(),
                        dst_stage.name()
                    ),
                );
            }
        }

        self.stages[dst].index += 1;
    }

    /// 对 `dst_stages` 中的每个 stage 建立对 `src_stages` 的依赖
    pub fn pipeline_barrier(&mut self, src_stages: StageFlags, dst_stages: StageFlags) {
        for dst_stage in dst_stages.stages() {
            self.barrier(src_stages, dst_stage);
        }
    }

    fn barrier(&mut self, src_stages: StageFlags, dst_stage: Stage) {
        if src_stages.is_empty() {
            return;
        }

        let dst = dst_stage.index();
        for src_stage in src_stages.stages() {
            let src = src_stage.index();

            // 有新的工作需要等待时，记下 dst 当前的位置
            if self.stages[src].index > self.stages[dst].wait_list[src] {
                self.stages[dst].wait_list[src] = self.stages[src].index;
                self.stages[dst].last_dst_stage_index[src] = self.stages[dst].index;
            }

            // 继承 src 的依赖
            for stage in 0..Stage::COUNT {
                if self.stages[src].wait_list[stage] > self.stages[dst].wait_list[stage] {
                    self.stages[dst].wait_list[stage] = self.stages[src].wait_list[stage];
                    self.stages[dst].last_dst_stage_index[stage] = self.stages[dst].index;
                }
            }
        }
    }

    /// `vkCmdSetEvent` 回放
    ///
    /// 每个 src stage 的槽位记录该 stage 当前 index 与它所有等待值中的最大者
    pub fn signal_event(&self, event: &mut EventState, src_stages: StageFlags) {
        if event.signalled {
            return;
        }

        event.wait_list = [0; Stage::COUNT];
        for src_stage in src_stages.stages() {
            let src = src_stage.index();
            let status = &self.stages[src];

            let inherited = status.wait_list.iter().copied().max().unwrap_or(0);
            event.wait_list[src] = event.wait_list[src].max(status.index).max(inherited);
        }

        // event 只能在同一个 queue 内使用，不需要记录是哪个 queue signal 的
        event.signalled = true;
    }

    /// `vkCmdWaitEvents` 回放
    ///
    /// 未 signal 的 event 视为由 host signal，不参与分析
    pub fn wait_event(&mut self, event: &EventState, dst_stages: StageFlags) {
        if !event.signalled {
            return;
        }

        for dst_stage in dst_stages.stages() {
            let dst = dst_stage.index();
            for stage in 0..Stage::COUNT {
                if event.wait_list[stage] > self.stages[dst].wait_list[stage] {
                    self.stages[dst].wait_list[stage] = event.wait_list[stage];
                    self.stages[dst].last_dst_stage_index[stage] = self.stages[dst].index;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Report, count_reports};

    const C: StageFlags = StageFlags::COMPUTE;
    const G: StageFlags = StageFlags::GEOMETRY;
    const F: StageFlags = StageFlags::FRAGMENT;
    const T: StageFlags = StageFlags::TRANSFER;

    /// 一个 render pass 在队列上产生的工作
    fn render_pass(tracker: &mut QueueTracker, src: StageFlags, dst: StageFlags, reports: &mut Vec<Report>) {
        tracker.pipeline_barrier(src, dst);
        tracker.push_work(Stage::Geometry, reports);
        tracker.pipeline_barrier(G, F);
        tracker.push_work(Stage::Fragment, reports);
    }

    fn bubbles(reports: &[Report]) -> usize {
        count_reports(reports, MessageCode::PipelineBubble)
    }

    #[test]
    fn test_first_work_never_bubbles() {
        let mut tracker = QueueTracker::new();
        let mut reports = Vec::new();

        tracker.pipeline_barrier(F, G);
        render_pass(&mut tracker, StageFlags::empty(), StageFlags::empty(), &mut reports);

        assert_eq!(bubbles(&reports), 0);
        assert_eq!(tracker.work_index(Stage::Geometry), 1);
        assert_eq!(tracker.work_index(Stage::Fragment), 1);
    }

    #[test]
    fn test_barrier_sequences_on_one_queue() {
        let mut tracker = QueueTracker::new();
        let none = StageFlags::empty();

        // FRAGMENT -> VERTEX，fragment 上还没有工作
        let mut reports = Vec::new();
        tracker.pipeline_barrier(F, G);
        render_pass(&mut tracker, none, none, &mut reports);
        assert_eq!(bubbles(&reports), 0);

        // 同样的命令再来一次，geometry 和 fragment 各出现一次 bubble
        let mut reports = Vec::new();
        tracker.pipeline_barrier(F, G);
        render_pass(&mut tracker, none, none, &mut reports);
        assert_eq!(bubbles(&reports), 2);
        assert_eq!(
            reports[0].message,
            "Pipeline bubble detected in stage GEOMETRY. Work in stage FRAGMENT will block execution in stage GEOMETRY."
        );

        // 经由 TRANSFER 的自依赖，transfer 上没有工作
        let mut reports = Vec::new();
        tracker.pipeline_barrier(F, T);
        tracker.pipeline_barrier(T, F);
        render_pass(&mut tracker, none, none, &mut reports);
        assert_eq!(bubbles(&reports), 0);

        // 经由 TRANSFER 的自依赖，中间有 transfer 工作
        let mut reports = Vec::new();
        tracker.pipeline_barrier(F, T);
        tracker.push_work(Stage::Transfer, &mut reports);
        tracker.pipeline_barrier(T, F);
        render_pass(&mut tracker, none, none, &mut reports);
        assert_eq!(bubbles(&reports), 1);

        // 用 event 表达同样的依赖
        let mut reports = Vec::new();
        let mut event0 = EventState::new();
        let mut event1 = EventState::new();
        tracker.signal_event(&mut event0, F);
        tracker.wait_event(&event0, T);
        tracker.push_work(Stage::Transfer, &mut reports);
        tracker.signal_event(&mut event1, T);
        tracker.wait_event(&event1, F);
        render_pass(&mut tracker, none, none, &mut reports);
        assert_eq!(bubbles(&reports), 1);

        // render pass 的外部依赖 ALL_GRAPHICS -> ALL_GRAPHICS
        let mut reports = Vec::new();
        render_pass(&mut tracker, G | F, G | F, &mut reports);
        assert_eq!(bubbles(&reports), 2);

        // 外部依赖只到 fragment
        let mut reports = Vec::new();
        render_pass(&mut tracker, G | F, F, &mut reports);
        assert_eq!(bubbles(&reports), 0);
    }

    #[test]
    fn test_geometry_compute_exempt() {
        let mut tracker = QueueTracker::new();
        let mut reports = Vec::new();

        for _ in 0..4 {
            tracker.push_work(Stage::Compute, &mut reports);
            tracker.pipeline_barrier(C, G);
            tracker.push_work(Stage::Geometry, &mut reports);
            tracker.pipeline_barrier(G, C);
        }

        assert_eq!(bubbles(&reports), 0);
    }

    #[test]
    fn test_compute_fragment_round_trip_bubbles() {
        let mut tracker = QueueTracker::new();
        let mut reports = Vec::new();

        tracker.push_work(Stage::Fragment, &mut reports);
        tracker.pipeline_barrier(F, C);
        tracker.push_work(Stage::Compute, &mut reports);
        tracker.pipeline_barrier(C, F);
        assert_eq!(bubbles(&reports), 0);

        tracker.push_work(Stage::Fragment, &mut reports);
        assert_eq!(bubbles(&reports), 1);
        assert!(reports[0].message.contains("stage FRAGMENT. Work in stage COMPUTE"));
    }

    #[test]
    fn test_empty_src_barrier_is_noop() {
        let mut tracker = QueueTracker::new();
        let mut reports = Vec::new();
        tracker.push_work(Stage::Transfer, &mut reports);

        let before = tracker.clone();
        tracker.pipeline_barrier(StageFlags::empty(), StageFlags::all());
        assert_eq!(tracker, before);
    }

    #[test]
    fn test_barrier_propagates_transitively() {
        let mut tracker = QueueTracker::new();
        let mut reports = Vec::new();

        tracker.push_work(Stage::Transfer, &mut reports);
        tracker.pipeline_barrier(T, C);
        tracker.push_work(Stage::Compute, &mut reports);
        tracker.pipeline_barrier(C, F);

        let fragment = tracker.stage_status(Stage::Fragment);
        assert_eq!(fragment.wait_list[Stage::Compute.index()], 1);
        // 继承了 compute 对 transfer 的等待
        assert_eq!(fragment.wait_list[Stage::Transfer.index()], 1);
        assert_eq!(fragment.last_dst_stage_index[Stage::Transfer.index()], 0);
    }

    #[test]
    fn test_signal_wait_matches_barrier() {
        let mut reports = Vec::new();
        let mut base = QueueTracker::new();
        base.push_work(Stage::Transfer, &mut reports);
        base.push_work(Stage::Transfer, &mut reports);
        base.push_work(Stage::Fragment, &mut reports);

        let mut with_barrier = base.clone();
        with_barrier.pipeline_barrier(T, F | C);

        let mut with_event = base.clone();
        let mut event = EventState::new();
        with_event.signal_event(&mut event, T);
        with_event.wait_event(&event, F | C);

        assert_eq!(with_barrier, with_event);
        assert_eq!(event.wait_list()[Stage::Transfer.index()], 2);
    }

    #[test]
    fn test_wait_unsignalled_event_is_noop() {
        let mut reports = Vec::new();
        let mut tracker = QueueTracker::new();
        tracker.push_work(Stage::Compute, &mut reports);
        tracker.pipeline_barrier(C, T);

        let before = tracker.clone();
        let event = EventState::new();
        tracker.wait_event(&event, StageFlags::all());
        assert_eq!(tracker, before);
    }

    #[test]
    fn test_signal_twice_keeps_first_snapshot() {
        let mut reports = Vec::new();
        let mut tracker = QueueTracker::new();
        let mut event = EventState::new();

        tracker.push_work(Stage::Fragment, &mut reports);
        tracker.signal_event(&mut event, F);
        tracker.push_work(Stage::Fragment, &mut reports);
        tracker.signal_event(&mut event, F);
        assert_eq!(event.wait_list()[Stage::Fragment.index()], 1);

        event.reset();
        tracker.signal_event(&mut event, F);
        assert_eq!(event.wait_list()[Stage::Fragment.index()], 2);
    }

    #[test]
    fn test_signal_collapses_inherited_waits() {
        let mut reports = Vec::new();
        let mut tracker = QueueTracker::new();
        tracker.push_work(Stage::Transfer, &mut reports);
        tracker.push_work(Stage::Transfer, &mut reports);
        tracker.pipeline_barrier(T, F);

        let mut event = EventState::new();
        tracker.signal_event(&mut event, F);
        assert_eq!(event.wait_list(), &[0, 0, 2, 0]);
    }
}
