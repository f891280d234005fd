//! 一个 `VkDevice` 对应的全部状态
//!
//! - 本文件：对象的创建与销毁
//! - [`recording`]：`vkCmd*` 的录制
//! - [`replay`]：`vkQueueSubmit` 时回放账本

mod recording;
mod replay;

use std::ptr::NonNull;

use ash::vk;
use itertools::Itertools;
use perfhint_analysis::index_scan::IndexScanner;

use crate::config::PerfConfig;
use crate::handles::{
    BufferKey, CommandBufferKey, DescriptorSetKey, EventKey, FramebufferKey, ImageKey, ImageViewKey, LoggerCallbackHandle,
    MemoryKey, PipelineKey, QueueKey, RenderPassKey,
};
use crate::logger::{Logger, LoggerCallbackFn};
use crate::resources::ObjectArena;
use crate::resources::buffer::{Buffer, DeviceMemory, MappedMemory};
use crate::resources::command_buffer::CommandBuffer;
use crate::resources::descriptor_set::DescriptorSet;
use crate::resources::event::Event;
use crate::resources::image::{Image, ImageView};
use crate::resources::pipeline::{Pipeline, PipelineDesc};
use crate::resources::queue::Queue;
use crate::resources::render_pass::{Framebuffer, RenderPass, RenderPassDesc};

/// device 独占所有子对象，子对象之间只通过 key 互相引用
pub struct Device {
    handle: vk::Device,
    config: PerfConfig,
    logger: Logger,
    scanner: IndexScanner,

    images: ObjectArena<vk::Image, ImageKey, Image>,
    image_views: ObjectArena<vk::ImageView, ImageViewKey, ImageView>,
    memories: ObjectArena<vk::DeviceMemory, MemoryKey, DeviceMemory>,
    buffers: ObjectArena<vk::Buffer, BufferKey, Buffer>,
    render_passes: ObjectArena<vk::RenderPass, RenderPassKey, RenderPass>,
    framebuffers: ObjectArena<vk::Framebuffer, FramebufferKey, Framebuffer>,
    pipelines: ObjectArena<vk::Pipeline, PipelineKey, Pipeline>,
    descriptor_sets: ObjectArena<vk::DescriptorSet, DescriptorSetKey, DescriptorSet>,
    events: ObjectArena<vk::Event, EventKey, Event>,
    queues: ObjectArena<vk::Queue, QueueKey, Queue>,
    command_buffers: ObjectArena<vk::CommandBuffer, CommandBufferKey, CommandBuffer>,
}

// new & init
impl Device {
    pub fn new(handle: vk::Device, config: PerfConfig) -> Self {
        let scanner = IndexScanner::new(config.index_scan_settings());
        log::info!("perfhint device created: {handle:?}");

        Self {
            handle,
            config,
            logger: Logger::new(),
            scanner,

            images: ObjectArena::new(),
            image_views: ObjectArena::new(),
            memories: ObjectArena::new(),
            buffers: ObjectArena::new(),
            render_passes: ObjectArena::new(),
            framebuffers: ObjectArena::new(),
            pipelines: ObjectArena::new(),
            descriptor_sets: ObjectArena::new(),
            events: ObjectArena::new(),
            queues: ObjectArena::new(),
            command_buffers: ObjectArena::new(),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!(
            "perfhint device destroyed: {:?} ({} command buffers, {} images still alive)",
            self.handle,
            self.command_buffers.len(),
            self.images.len()
        );
    }
}

// getters
impl Device {
    #[inline]
    pub fn handle(&self) -> vk::Device {
        self.handle
    }

    #[inline]
    pub fn config(&self) -> &PerfConfig {
        &self.config
    }

    #[inline]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn image(&self, image: vk::Image) -> &Image {
        self.images.by_handle(image)
    }

    pub fn queue(&self, queue: vk::Queue) -> &Queue {
        self.queues.by_handle(queue)
    }

    pub fn event(&self, event: vk::Event) -> &Event {
        self.events.by_handle(event)
    }

    pub fn command_buffer(&self, command_buffer: vk::CommandBuffer) -> &CommandBuffer {
        self.command_buffers.by_handle(command_buffer)
    }
}

// debug report callbacks
impl Device {
    pub fn register_callback(
        &mut self,
        flags: vk::DebugReportFlagsEXT,
        callback: LoggerCallbackFn,
    ) -> LoggerCallbackHandle {
        self.logger.register_callback(flags, callback)
    }

    pub fn unregister_callback(&mut self, handle: LoggerCallbackHandle) -> bool {
        self.logger.unregister_callback(handle)
    }
}

// images
impl Device {
    pub fn create_image(&mut self, image: vk::Image, info: &vk::ImageCreateInfo) {
        self.images.insert(image, Image::new(image, info));
    }

    /// `vkGetSwapchainImagesKHR` 返回的 image
    pub fn register_swapchain_images(&mut self, images: &[vk::Image], info: &vk::SwapchainCreateInfoKHR) {
        for &image in images {
            self.images.insert(
                image,
                Image::new_swapchain(image, info.image_format, info.image_extent, info.image_array_layers),
            );
        }
    }

    pub fn destroy_image(&mut self, image: vk::Image) {
        self.images.remove(image);
    }

    pub fn create_image_view(&mut self, view: vk::ImageView, info: &vk::ImageViewCreateInfo) {
        let image = self.images.key(info.image);
        self.image_views.insert(view, ImageView::new(view, image, info));
    }

    pub fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.image_views.remove(view);
    }
}

// memory & buffers
impl Device {
    pub fn allocate_memory(&mut self, memory: vk::DeviceMemory, info: &vk::MemoryAllocateInfo) {
        self.memories.insert(memory, DeviceMemory::new(memory, info));
    }

    pub fn free_memory(&mut self, memory: vk::DeviceMemory) {
        self.memories.remove(memory);
    }

    /// 记录 `vkMapMemory` 的结果，`ptr` 为空时忽略
    ///
    /// # Safety
    ///
    /// `ptr` 开始的 `size` 字节在 [`Self::unmap_memory`] 或 [`Self::free_memory`] 之前必须一直可读
    pub unsafe fn map_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: usize,
        ptr: *mut std::ffi::c_void,
    ) {
        let Some(ptr) = NonNull::new(ptr.cast::<u8>()) else {
            log::debug!("vkMapMemory returned null for {memory:?}");
            return;
        };
        let mapped = unsafe { MappedMemory::new(ptr, offset, size) };
        self.memories.by_handle_mut(memory).map(mapped);
    }

    pub fn unmap_memory(&mut self, memory: vk::DeviceMemory) {
        self.memories.by_handle_mut(memory).unmap();
    }

    pub fn create_buffer(&mut self, buffer: vk::Buffer, info: &vk::BufferCreateInfo) {
        self.buffers.insert(buffer, Buffer::new(buffer, info));
    }

    pub fn bind_buffer_memory(&mut self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) {
        let memory = self.memories.key(memory);
        self.buffers.by_handle_mut(buffer).bind_memory(memory, offset);
    }

    pub fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        self.buffers.remove(buffer);
    }
}

// render passes & pipelines
impl Device {
    pub fn create_render_pass(&mut self, render_pass: vk::RenderPass, desc: RenderPassDesc) {
        self.render_passes.insert(render_pass, RenderPass::new(render_pass, desc));
    }

    pub fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.render_passes.remove(render_pass);
    }

    pub fn create_framebuffer(
        &mut self,
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
    ) {
        let render_pass = self.render_passes.key(render_pass);
        let attachments = attachments.iter().map(|view| self.image_views.key(*view)).collect_vec();
        self.framebuffers.insert(framebuffer, Framebuffer::new(framebuffer, render_pass, attachments));
    }

    pub fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.framebuffers.remove(framebuffer);
    }

    pub fn create_pipeline(&mut self, pipeline: vk::Pipeline, desc: PipelineDesc) {
        self.pipelines.insert(pipeline, Pipeline::new(pipeline, desc));
    }

    pub fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.pipelines.remove(pipeline);
    }
}

// descriptor sets
impl Device {
    pub fn allocate_descriptor_set(&mut self, set: vk::DescriptorSet) {
        self.descriptor_sets.insert(set, DescriptorSet::new(set));
    }

    pub fn free_descriptor_set(&mut self, set: vk::DescriptorSet) {
        self.descriptor_sets.remove(set);
    }

    /// `vkUpdateDescriptorSets` 中的一条 image 写入，`vk::ImageView::null()` 表示空元素
    pub fn write_descriptor_images(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        descriptor_type: vk::DescriptorType,
        views: &[vk::ImageView],
    ) {
        let views = views
            .iter()
            .map(|&view| if view == vk::ImageView::null() { None } else { Some(self.image_views.key(view)) })
            .collect_vec();
        self.descriptor_sets
            .by_handle_mut(set)
            .write_images(binding, array_element, descriptor_type, &views);
    }
}

// events
impl Device {
    pub fn create_event(&mut self, event: vk::Event) {
        self.events.insert(event, Event::new(event));
    }

    pub fn destroy_event(&mut self, event: vk::Event) {
        self.events.remove(event);
    }

    /// host 端 `vkSetEvent`
    pub fn set_event(&mut self, event: vk::Event) {
        self.events.by_handle_mut(event).state.signal_from_host();
    }

    /// host 端 `vkResetEvent`
    pub fn reset_event(&mut self, event: vk::Event) {
        self.events.by_handle_mut(event).state.reset();
    }
}

// queues & command buffers
impl Device {
    /// `vkGetDeviceQueue`，同一个 queue 可能被多次获取
    pub fn register_queue(&mut self, queue: vk::Queue, family_index: u32) {
        if self.queues.find_key(queue).is_none() {
            self.queues.insert(queue, Queue::new(queue, family_index));
        }
    }

    pub fn allocate_command_buffer(&mut self, command_buffer: vk::CommandBuffer, level: vk::CommandBufferLevel) {
        self.command_buffers.insert(command_buffer, CommandBuffer::new(command_buffer, level));
    }

    pub fn free_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.command_buffers.remove(command_buffer);
    }
}
