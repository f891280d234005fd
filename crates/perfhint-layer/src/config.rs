//! 配置
//!
//! 所有字段都有默认值，配置文件里只需要写想要覆盖的项：
//!
//! ```toml
//! indexBufferScanningInPlace = true
//! indexBufferVertexPostTransformCache = 16
//! loggingFilename = "perfhint.log"
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use perfhint_analysis::index_scan::IndexScanSettings;
use serde::{Deserialize, Serialize};

/// 配置文件路径的环境变量
pub const CONFIG_ENV: &str = "PERFHINT_CONFIG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerfConfig {
    /// 一个 command buffer 中小 indexed draw 数量达到该值时提示
    pub max_small_indexed_drawcalls: u32,
    /// index 数量（乘以 instance 数量）不超过该值的 indexed draw 视为小 draw
    pub small_indexed_drawcall_indices: u32,

    /// 计入 depth pre-pass 统计的最少顶点数
    pub depth_pre_pass_min_vertices: u32,
    /// 计入 depth pre-pass 统计的最少 index 数
    pub depth_pre_pass_min_indices: u32,
    /// depth-only 和 depth-equal 两类 draw 都达到该数量时提示
    pub depth_pre_pass_num_draw_calls: u32,

    /// index 数量少于该值时不扫描 index buffer
    pub index_buffer_scan_min_index_count: u32,
    pub index_buffer_utilization_threshold: f64,
    pub index_buffer_cache_hit_threshold: f64,
    /// 模拟的 post-transform vertex cache 容量
    pub index_buffer_vertex_post_transform_cache: u32,
    pub index_buffer_scanning_enable: bool,
    /// 在录制 draw 时立即扫描，否则推迟到提交时
    pub index_buffer_scanning_in_place: bool,

    /// 空字符串或 `stderr` 输出到标准错误，`stdout` 输出到标准输出，其余视为文件路径
    pub logging_filename: String,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            max_small_indexed_drawcalls: 10,
            small_indexed_drawcall_indices: 10,

            depth_pre_pass_min_vertices: 500,
            depth_pre_pass_min_indices: 500,
            depth_pre_pass_num_draw_calls: 20,

            index_buffer_scan_min_index_count: 128,
            index_buffer_utilization_threshold: 0.5,
            index_buffer_cache_hit_threshold: 0.5,
            index_buffer_vertex_post_transform_cache: 32,
            index_buffer_scanning_enable: true,
            index_buffer_scanning_in_place: false,

            logging_filename: String::new(),
        }
    }
}

// new & init
impl PerfConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("解析 TOML 配置失败")
    }

    /// 从 TOML 文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;

        toml::from_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))
    }

    /// 文件不存在或者解析失败时使用默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("failed to load config, using defaults: {err:#}");
                Self::default()
            }
        }
    }

    /// 从 `PERFHINT_CONFIG` 指向的文件加载
    pub fn from_env() -> Self {
        Self::load_or_default(std::env::var_os(CONFIG_ENV))
    }
}

// tools
impl PerfConfig {
    /// 保存配置到 TOML 文件
    pub fn dump_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        fs::write(path.as_ref(), content).with_context(|| format!("写入配置文件失败: {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn index_scan_settings(&self) -> IndexScanSettings {
        IndexScanSettings {
            cache_size: self.index_buffer_vertex_post_transform_cache,
            utilization_threshold: self.index_buffer_utilization_threshold,
            cache_hit_threshold: self.index_buffer_cache_hit_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("perfhint-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_partial_toml() {
        let config = PerfConfig::from_toml_str(
            r#"
            indexBufferScanningInPlace = true
            indexBufferVertexPostTransformCache = 16
            loggingFilename = "stdout"
            "#,
        )
        .unwrap();

        assert!(config.index_buffer_scanning_in_place);
        assert_eq!(config.index_buffer_vertex_post_transform_cache, 16);
        assert_eq!(config.logging_filename, "stdout");
        // 未写的项保持默认值
        assert_eq!(config.max_small_indexed_drawcalls, 10);
        assert_eq!(config.index_buffer_scan_min_index_count, 128);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(PerfConfig::from_toml_str("indexBufferScanningEnable = 3").is_err());
    }

    #[test]
    fn test_dump_and_load() {
        let path = temp_path("dump.toml");
        let config = PerfConfig {
            depth_pre_pass_num_draw_calls: 4,
            index_buffer_cache_hit_threshold: 0.25,
            ..Default::default()
        };

        config.dump_to_file(&path).unwrap();
        let loaded = PerfConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_or_default() {
        let missing = temp_path("missing.toml");
        assert_eq!(PerfConfig::load_or_default(Some(&missing)), PerfConfig::default());
        assert_eq!(PerfConfig::load_or_default(None::<&Path>), PerfConfig::default());
    }

    #[test]
    fn test_index_scan_settings() {
        let settings = PerfConfig::default().index_scan_settings();
        assert_eq!(settings, IndexScanSettings::default());
    }
}
