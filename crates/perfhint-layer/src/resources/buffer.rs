use std::ptr::NonNull;

use ash::vk;

use crate::handles::MemoryKey;

/// `vkMapMemory` 返回的 host 地址
///
/// `ptr` 对应 memory 中的 `offset` 位置，只有 index buffer 扫描会读取这段内存
#[derive(Clone, Copy, Debug)]
pub struct MappedMemory {
    ptr: NonNull<u8>,
    offset: vk::DeviceSize,
    size: usize,
}

// 指针只在持有全局锁时读取
unsafe impl Send for MappedMemory {}

impl MappedMemory {
    /// # Safety
    ///
    /// `ptr` 开始的 `size` 字节在 unmap 或者 free 之前必须一直可读
    pub unsafe fn new(ptr: NonNull<u8>, offset: vk::DeviceSize, size: usize) -> Self {
        Self { ptr, offset, size }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// 读取 memory 中 `[offset, offset + len)` 的内容，超出 map 范围时返回 `None`
    pub fn read(&self, offset: vk::DeviceSize, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset.checked_sub(self.offset)?).ok()?;
        let end = start.checked_add(len)?;
        if end > self.size {
            return None;
        }

        // SAFETY: 构造时由调用方保证整个范围可读
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) };
        Some(&bytes[start..end])
    }
}

pub struct DeviceMemory {
    handle: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: Option<MappedMemory>,
}
// new & init
impl DeviceMemory {
    pub fn new(handle: vk::DeviceMemory, info: &vk::MemoryAllocateInfo) -> Self {
        Self {
            handle,
            size: info.allocation_size,
            mapped: None,
        }
    }
}
// getters
impl DeviceMemory {
    #[inline]
    pub fn handle(&self) -> vk::DeviceMemory {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// 未 map 的内存返回 `None`
    #[inline]
    pub fn mapped(&self) -> Option<&MappedMemory> {
        self.mapped.as_ref()
    }
}
// tools
impl DeviceMemory {
    pub fn map(&mut self, mapped: MappedMemory) {
        self.mapped = Some(mapped);
    }

    pub fn unmap(&mut self) {
        self.mapped = None;
    }
}

pub struct Buffer {
    handle: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,

    memory: Option<MemoryKey>,
    memory_offset: vk::DeviceSize,
}
// new & init
impl Buffer {
    pub fn new(handle: vk::Buffer, info: &vk::BufferCreateInfo) -> Self {
        Self {
            handle,
            size: info.size,
            usage: info.usage,
            memory: None,
            memory_offset: 0,
        }
    }

    pub fn bind_memory(&mut self, memory: MemoryKey, offset: vk::DeviceSize) {
        self.memory = Some(memory);
        self.memory_offset = offset;
    }
}
// getters
impl Buffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn memory(&self) -> Option<MemoryKey> {
        self.memory
    }

    #[inline]
    pub fn memory_offset(&self) -> vk::DeviceSize {
        self.memory_offset
    }
}
