use ash::vk;

/// 根据 format 推断 image 的 aspect
pub fn format_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }

        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,

        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }

        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// 只有 stencil 的 format 不使用 `load_op`/`store_op`
#[inline]
pub fn format_uses_color_depth_ops(format: vk::Format) -> bool {
    format_aspect(format) != vk::ImageAspectFlags::STENCIL
}

/// 带 stencil 的 format 额外使用 `stencil_load_op`/`stencil_store_op`
#[inline]
pub fn format_uses_stencil_ops(format: vk::Format) -> bool {
    format_aspect(format).contains(vk::ImageAspectFlags::STENCIL)
}
