use ash::vk;
use perfhint_analysis::usage::SubresourceUsage;

use crate::format::format_aspect;
use crate::handles::ImageKey;

pub struct Image {
    handle: vk::Image,
    format: vk::Format,
    extent: vk::Extent3D,

    pub(crate) usage: SubresourceUsage,
}
// new & init
impl Image {
    pub fn new(handle: vk::Image, info: &vk::ImageCreateInfo) -> Self {
        Self {
            handle,
            format: info.format,
            extent: info.extent,
            usage: SubresourceUsage::new(info.array_layers, info.mip_levels),
        }
    }

    /// swapchain image 只有一个 mip level
    pub fn new_swapchain(handle: vk::Image, format: vk::Format, extent: vk::Extent2D, array_layers: u32) -> Self {
        Self {
            handle,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            usage: SubresourceUsage::new_swapchain(array_layers, 1),
        }
    }
}
// getters
impl Image {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn usage(&self) -> &SubresourceUsage {
        &self.usage
    }

    /// 覆盖整个 image 的子资源范围
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(format_aspect(self.format))
            .base_mip_level(0)
            .level_count(self.usage.mip_levels())
            .base_array_layer(0)
            .layer_count(self.usage.array_layers())
    }
}
impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image({:?}, {:?})", self.handle, self.format)
    }
}

/// view 只记录它引用的 image 和子资源范围
pub struct ImageView {
    handle: vk::ImageView,
    image: ImageKey,
    format: vk::Format,
    range: vk::ImageSubresourceRange,
}
// new & init
impl ImageView {
    pub fn new(handle: vk::ImageView, image: ImageKey, info: &vk::ImageViewCreateInfo) -> Self {
        Self {
            handle,
            image,
            format: info.format,
            range: info.subresource_range,
        }
    }
}
// getters
impl ImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    #[inline]
    pub fn image(&self) -> ImageKey {
        self.image
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn range(&self) -> &vk::ImageSubresourceRange {
        &self.range
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_full_range() {
        let info = vk::ImageCreateInfo::default()
            .format(vk::Format::D24_UNORM_S8_UINT)
            .extent(vk::Extent3D {
                width: 64,
                height: 32,
                depth: 1,
            })
            .mip_levels(3)
            .array_layers(2);
        let image = Image::new(vk::Image::from_raw(1), &info);

        let range = image.full_range();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
        assert_eq!(range.level_count, 3);
        assert_eq!(range.layer_count, 2);
        assert!(!image.usage().is_swapchain());
    }

    #[test]
    fn test_swapchain_image() {
        let image = Image::new_swapchain(
            vk::Image::from_raw(2),
            vk::Format::B8G8R8A8_SRGB,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            1,
        );
        assert!(image.usage().is_swapchain());
        assert_eq!(image.usage().mip_levels(), 1);
        assert_eq!(image.extent().depth, 1);
    }
}
