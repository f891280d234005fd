use std::collections::BTreeMap;

use ash::vk;
use perfhint_analysis::usage::ImageUsage;

use crate::handles::ImageViewKey;

#[derive(Clone, Debug, Default)]
struct ImageBinding {
    descriptor_type: vk::DescriptorType,
    views: Vec<Option<ImageViewKey>>,
}

/// descriptor set 中 image 类型的 binding
///
/// sampled image 和 combined image sampler 视为读取，storage image 视为写入，其余类型不跟踪
pub struct DescriptorSet {
    handle: vk::DescriptorSet,
    bindings: BTreeMap<u32, ImageBinding>,
}
// new & init
impl DescriptorSet {
    pub fn new(handle: vk::DescriptorSet) -> Self {
        Self {
            handle,
            bindings: BTreeMap::new(),
        }
    }
}
// getters
impl DescriptorSet {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    fn usage_of(descriptor_type: vk::DescriptorType) -> Option<ImageUsage> {
        match descriptor_type {
            vk::DescriptorType::SAMPLED_IMAGE | vk::DescriptorType::COMBINED_IMAGE_SAMPLER => {
                Some(ImageUsage::ResourceRead)
            }
            vk::DescriptorType::STORAGE_IMAGE => Some(ImageUsage::ResourceWrite),
            _ => None,
        }
    }

    fn views_with(&self, usage: ImageUsage) -> impl Iterator<Item = (ImageViewKey, ImageUsage)> + '_ {
        self.bindings
            .values()
            .filter(move |binding| Self::usage_of(binding.descriptor_type) == Some(usage))
            .flat_map(move |binding| binding.views.iter().flatten().map(move |view| (*view, usage)))
    }

    /// 所有读取的 view 在前，写入的 view 在后
    pub fn image_usages(&self) -> Vec<(ImageViewKey, ImageUsage)> {
        self.views_with(ImageUsage::ResourceRead).chain(self.views_with(ImageUsage::ResourceWrite)).collect()
    }
}
// tools
impl DescriptorSet {
    /// 对应 `VkWriteDescriptorSet` 中的一段 image 写入
    ///
    /// 非 image 类型的写入会清空对应的元素
    pub fn write_images(
        &mut self,
        binding: u32,
        array_element: u32,
        descriptor_type: vk::DescriptorType,
        views: &[Option<ImageViewKey>],
    ) {
        let entry = self.bindings.entry(binding).or_default();
        entry.descriptor_type = descriptor_type;

        let begin = array_element as usize;
        let end = begin + views.len();
        if entry.views.len() < end {
            entry.views.resize(end, None);
        }

        let tracked = Self::usage_of(descriptor_type).is_some();
        for (slot, view) in entry.views[begin..end].iter_mut().zip(views) {
            *slot = if tracked { *view } else { None };
        }
    }
}
