//! 性能分析核心
//!
//! 不依赖任何对象模型，只处理已经提取好的数据：
//! - [`queue_tracker`]：队列上 stage 之间的依赖，检测 pipeline bubble
//! - [`event`]：`VkEvent` 在依赖跟踪中的状态
//! - [`usage`]：image 子资源的使用状态机
//! - [`index_scan`]：index buffer 的 vertex cache 模拟与碎片化统计
//!
//! 所有提示都通过 [`message::ReportSink`] 输出。

pub mod event;
pub mod index_scan;
pub mod message;
pub mod queue_tracker;
pub mod stage;
pub mod usage;
