use slotmap::new_key_type;

// device 内部对象的 key，对象之间只通过 key 互相引用，不持有所有权
new_key_type! {
    pub struct ImageKey;
    pub struct ImageViewKey;
    pub struct BufferKey;
    pub struct MemoryKey;
    pub struct RenderPassKey;
    pub struct FramebufferKey;
    pub struct PipelineKey;
    pub struct DescriptorSetKey;
    pub struct EventKey;
    pub struct QueueKey;
    pub struct CommandBufferKey;

    /// 注册到 [`crate::logger::Logger`] 的回调
    pub struct LoggerCallbackHandle;
}
