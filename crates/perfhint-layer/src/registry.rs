//! 全局的 device 表
//!
//! 拦截到的 Vulkan 调用只带有 dispatchable handle，需要从这里找到对应的 [`Device`]。
//! 所有对象模型的修改都在这一把锁内完成。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use ash::vk;
use lazy_static::lazy_static;
use perfhint_crate_tools::init_log::{LogTarget, init_log_to};

use crate::config::PerfConfig;
use crate::device::Device;

pub type LayerRegistry = HashMap<vk::Device, Device>;

lazy_static! {
    static ref REGISTRY: Mutex<LayerRegistry> = Mutex::new(LayerRegistry::new());
}

/// 某个回调 panic 之后表里的数据仍然可用
fn registry() -> MutexGuard<'static, LayerRegistry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 加载配置并初始化日志，只有第一次调用生效
pub fn initialize_layer() -> PerfConfig {
    static CONFIG: OnceLock<PerfConfig> = OnceLock::new();

    CONFIG
        .get_or_init(|| {
            let config = PerfConfig::from_env();
            init_log_to(&LogTarget::from_config(&config.logging_filename));
            log::info!("perfhint layer initialized: {config:?}");
            config
        })
        .clone()
}

/// `vkCreateDevice` 成功之后调用
pub fn create_device(handle: vk::Device, config: PerfConfig) {
    let mut registry = registry();
    if registry.insert(handle, Device::new(handle, config)).is_some() {
        log::warn!("device {handle:?} registered twice, previous state dropped");
    }
}

/// `vkDestroyDevice`，返回 device 是否存在
pub fn destroy_device(handle: vk::Device) -> bool {
    registry().remove(&handle).is_some()
}

/// 在锁内访问 device，未注册的 device 返回 `None`
pub fn with_device<R>(handle: vk::Device, f: impl FnOnce(&mut Device) -> R) -> Option<R> {
    let mut registry = registry();
    let Some(device) = registry.get_mut(&handle) else {
        log::debug!("unknown device {handle:?}");
        return None;
    };
    Some(f(device))
}

pub fn device_count() -> usize {
    registry().len()
}
