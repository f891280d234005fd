//! Image 子资源的使用状态机
//!
//! 每个 (array layer, mip level) 记录最后一次使用方式，新的使用方式到来时根据
//! (旧状态, 新状态) 判断是否存在多余的 store 或 clear。状态机没有终态。

use ash::vk;

use crate::message::{MessageCode, ReportSink};

/// 子资源最后一次的使用方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageUsage {
    #[default]
    Undefined,
    /// render pass 的 LOAD_OP_CLEAR
    RenderPassCleared,
    /// render pass 的 LOAD_OP_LOAD
    RenderPassReadToTile,
    /// `vkCmdClear*Image`
    Cleared,
    ResourceRead,
    ResourceWrite,
    /// render pass 的 STORE_OP_STORE
    RenderPassStored,
    /// render pass 的 STORE_OP_DONT_CARE
    RenderPassDiscarded,
}

/// 一个 image 的全部子资源状态
#[derive(Clone, Debug)]
pub struct SubresourceUsage {
    array_layers: u32,
    mip_levels: u32,
    swapchain: bool,
    /// layer 优先排列
    last_usages: Vec<ImageUsage>,
}

// new & init
impl SubresourceUsage {
    pub fn new(array_layers: u32, mip_levels: u32) -> Self {
        Self {
            array_layers,
            mip_levels,
            swapchain: false,
            last_usages: vec![ImageUsage::Undefined; (array_layers * mip_levels) as usize],
        }
    }

    /// swapchain image 会被 present 隐式读取，store 之后 clear 是正常的
    pub fn new_swapchain(array_layers: u32, mip_levels: u32) -> Self {
        Self {
            swapchain: true,
            ..Self::new(array_layers, mip_levels)
        }
    }
}

// getters
impl SubresourceUsage {
    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn is_swapchain(&self) -> bool {
        self.swapchain
    }

    pub fn last_usage(&self, array_layer: u32, mip_level: u32) -> ImageUsage {
        self.last_usages[self.slot(array_layer, mip_level)]
    }
}

// tools
impl SubresourceUsage {
    fn slot(&self, array_layer: u32, mip_level: u32) -> usize {
        assert!(
            array_layer < self.array_layers,
            "array layer {array_layer} out of range ({} layers)",
            self.array_layers
        );
        assert!(mip_level < self.mip_levels, "mip level {mip_level} out of range ({} levels)", self.mip_levels);
        (array_layer * self.mip_levels + mip_level) as usize
    }

    /// 更新单个子资源，并检查状态转换
    pub fn signal_usage(&mut self, array_layer: u32, mip_level: u32, usage: ImageUsage, sink: &mut dyn ReportSink) {
        let slot = self.slot(array_layer, mip_level);
        let old_usage = self.last_usages[slot];

        match (old_usage, usage) {
            (ImageUsage::RenderPassStored, ImageUsage::RenderPassCleared) if !self.swapchain => {
                sink.performance_warning(
                    MessageCode::RedundantRenderPassStore,
                    format!(
                        "Subresource (arrayLayer: {array_layer}, mipLevel: {mip_level}) of image was cleared as part of \
                         LOAD_OP_CLEAR, but last time image was used, it was written to with STORE_OP_STORE. \
                         Storing to the image is probably redundant in this case, and wastes bandwidth on tile-based \
                         architectures."
                    ),
                );
            }
            (ImageUsage::Cleared, ImageUsage::RenderPassCleared) => {
                sink.performance_warning(
                    MessageCode::RedundantImageClear,
                    format!(
                        "Subresource (arrayLayer: {array_layer}, mipLevel: {mip_level}) of image was cleared as part of \
                         LOAD_OP_CLEAR, but last time image was used, it was written to with vkCmdClear*Image(). \
                         Clearing the image with vkCmdClear*Image() is probably redundant in this case, and wastes \
                         bandwidth on tile-based architectures."
                    ),
                );
            }
            (ImageUsage::Cleared, ImageUsage::RenderPassReadToTile) => {
                sink.performance_warning(
                    MessageCode::InefficientClear,
                    format!(
                        "Subresource (arrayLayer: {array_layer}, mipLevel: {mip_level}) of image was loaded to tile as \
                         part of LOAD_OP_LOAD, but last time image was used, it was written to with \
                         vkCmdClear*Image(). Clearing the image with vkCmdClear*Image() is probably redundant in this \
                         case, and wastes bandwidth on tile-based architectures. Use LOAD_OP_CLEAR instead to clear \
                         the image for free."
                    ),
                );
            }
            _ => {}
        }

        self.last_usages[slot] = usage;
    }

    /// 更新一个子资源范围，范围先按 image 实际的 layer/level 数量截断
    pub fn signal_range(&mut self, range: &vk::ImageSubresourceRange, usage: ImageUsage, sink: &mut dyn ReportSink) {
        let layer_count = range.layer_count.min(self.array_layers.saturating_sub(range.base_array_layer));
        let level_count = range.level_count.min(self.mip_levels.saturating_sub(range.base_mip_level));

        for layer in 0..layer_count {
            for level in 0..level_count {
                self.signal_usage(range.base_array_layer + layer, range.base_mip_level + level, usage, sink);
            }
        }
    }

    /// 拷贝类命令使用的 `VkImageSubresourceLayers`，只涉及一个 mip level
    pub fn signal_layers(&mut self, layers: &vk::ImageSubresourceLayers, usage: ImageUsage, sink: &mut dyn ReportSink) {
        let layer_count = layers.layer_count.min(self.array_layers.saturating_sub(layers.base_array_layer));

        for layer in 0..layer_count {
            self.signal_usage(layers.base_array_layer + layer, layers.mip_level, usage, sink);
        }
    }
}
