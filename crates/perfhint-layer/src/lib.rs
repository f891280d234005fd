//! 拦截层的对象模型
//!
//! 每个 `VkDevice` 对应一个 [`Device`]，它持有该 device 创建的全部对象。
//! 命令录制时运行启发式检查并把依赖 queue 状态的操作写进 command buffer 的账本，
//! `vkQueueSubmit` 时按顺序回放账本，由 `perfhint-analysis` 完成 pipeline bubble、
//! 子资源使用状态和 index buffer 的分析。

pub mod config;
pub mod device;
pub mod format;
pub mod handles;
pub mod heuristics;
pub mod ledger;
pub mod logger;
pub mod registry;
pub mod resources;

pub use device::Device;
