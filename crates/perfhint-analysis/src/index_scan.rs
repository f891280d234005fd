//! Index buffer 效率分析
//!
//! 对一次 indexed draw 使用的 index 区间做两遍扫描：
//! 1. 统计 min/max，同时模拟固定容量的 post-transform vertex cache，得到需要着色的顶点数
//! 2. 用 bitmap 统计实际用到的顶点，计算利用率和 cache 命中率
//!
//! 如果 index 的取值范围超过 index 数量，数据必然是稀疏的，直接跳过第二遍扫描，
//! 避免按取值范围分配过大的 bitmap。

use ash::vk;

use crate::message::{MessageCode, ReportSink};

/// 碎片化示意图的宽度
pub const FRAGMENTATION_MAP_SIZE: usize = 16;

/// 扫描使用的阈值
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexScanSettings {
    /// post-transform cache 的容量
    pub cache_size: u32,
    /// 利用率低于该值时报告碎片化
    pub utilization_threshold: f64,
    /// 命中率小于等于该值时报告 cache thrashing
    pub cache_hit_threshold: f64,
}

impl Default for IndexScanSettings {
    fn default() -> Self {
        Self {
            cache_size: 32,
            utilization_threshold: 0.5,
            cache_hit_threshold: 0.5,
        }
    }
}

/// index 的位宽
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    /// 只支持 16/32 位 index，其他类型返回 None
    pub fn from_vk(index_type: vk::IndexType) -> Option<Self> {
        match index_type {
            vk::IndexType::UINT16 => Some(Self::U16),
            vk::IndexType::UINT32 => Some(Self::U32),
            _ => None,
        }
    }

    #[inline]
    pub fn stride(self) -> usize {
        match self {
            Self::U16 => size_of::<u16>(),
            Self::U32 => size_of::<u32>(),
        }
    }

    #[inline]
    pub fn restart_value(self) -> u32 {
        match self {
            Self::U16 => 0xFFFF,
            Self::U32 => 0xFFFF_FFFF,
        }
    }

    #[inline]
    fn read(self, bytes: &[u8]) -> u32 {
        match self {
            Self::U16 => bytemuck::pod_read_unaligned::<u16>(bytes) as u32,
            Self::U32 => bytemuck::pod_read_unaligned::<u32>(bytes),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct CacheEntry {
    value: u32,
    age: u32,
}

/// 模拟的 post-transform vertex cache，按 age 做 LRU 替换
#[derive(Clone, Debug, Default)]
pub struct VertexCache {
    entries: Vec<CacheEntry>,
}

impl VertexCache {
    pub fn reset(&mut self, capacity: u32) {
        self.entries.clear();
        self.entries.resize(capacity as usize, CacheEntry::default());
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    /// 查询 `value`，命中时刷新 age，未命中时放入空槽或替换最旧的项
    ///
    /// `iteration` 是当前扫描到的非 restart index 序号，前 `capacity` 次迭代
    /// 按顺序填满 cache，所以只需要搜索 `min(iteration, capacity)` 项
    pub fn test(&mut self, value: u32, iteration: u32) -> bool {
        let capacity = self.capacity();
        if capacity == 0 {
            return false;
        }

        let mut lru = 0;
        for i in 0..iteration.min(capacity) as usize {
            if self.entries[i].value == value {
                self.entries[i].age = iteration;
                return true;
            } else if self.entries[i].age < self.entries[lru].age {
                lru = i;
            }
        }

        let slot = if iteration < capacity { iteration as usize } else { lru };
        self.entries[slot] = CacheEntry { value, age: iteration };
        false
    }
}

/// 完整分析后的统计结果
#[derive(Clone, Debug, PartialEq)]
pub struct IndexScanStats {
    pub min_value: u32,
    pub max_value: u32,
    pub index_count: u32,
    /// 实际用到的不同顶点数
    pub vertices_referenced: u32,
    /// cache 未命中，需要着色的顶点数
    pub vertex_shade_count: u32,
    /// 取值范围的 16 段示意图，用到的段为 `#`
    pub fragmentation: String,
    pub utilization: f64,
    pub cache_hit_rate: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum IndexScanOutcome {
    /// 全部是 primitive restart
    AllRestart,
    /// 取值范围不小于 index 数量，没有做第二遍扫描
    Sparse { min_value: u32, max_value: u32 },
    Analyzed(IndexScanStats),
}

/// index buffer 扫描器
///
/// cache 在多次扫描之间复用，每次扫描开始时重置
#[derive(Clone, Debug, Default)]
pub struct IndexScanner {
    settings: IndexScanSettings,
    cache: VertexCache,
}

// new & init
impl IndexScanner {
    pub fn new(settings: IndexScanSettings) -> Self {
        Self {
            settings,
            cache: VertexCache::default(),
        }
    }
}

// getters
impl IndexScanner {
    #[inline]
    pub fn settings(&self) -> &IndexScanSettings {
        &self.settings
    }
}

// tools
impl IndexScanner {
    /// 扫描 `data` 开头的 `index_count` 个 index
    ///
    /// `data` 需要已经偏移到 first index，并且至少包含 `index_count` 个 index
    pub fn scan(
        &mut self,
        data: &[u8],
        width: IndexWidth,
        index_count: u32,
        primitive_restart: bool,
        sink: &mut dyn ReportSink,
    ) -> IndexScanOutcome {
        let stride = width.stride();
        let scan_len = index_count as usize * stride;
        assert!(
            data.len() >= scan_len,
            "index data too short: {} bytes for {index_count} indices",
            data.len()
        );

        let data = &data[..scan_len];

        // 第一遍：范围和 cache 模拟
        self.cache.reset(self.settings.cache_size);
        let mut min_value = u32::MAX;
        let mut max_value = 0u32;
        let mut vertex_shade_count = 0u32;
        for (iteration, value) in read_indices(data, width, primitive_restart).enumerate() {
            min_value = min_value.min(value);
            max_value = max_value.max(value);
            if !self.cache.test(value, iteration as u32) {
                vertex_shade_count += 1;
            }
        }

        if max_value < min_value {
            log::debug!("all {index_count} indices are primitive restart, skip scanning");
            return IndexScanOutcome::AllRestart;
        }

        let value_range = (max_value - min_value) as u64 + 1;
        if (max_value - min_value) >= index_count {
            sink.performance_warning(
                MessageCode::IndexBufferSparse,
                format!(
                    "Indexbuffer data used by drawcall is fragmented. Number of indices ({index_count}) is smaller \
                     than range of index buffer data ({value_range})."
                ),
            );
            return IndexScanOutcome::Sparse { min_value, max_value };
        }

        // 第二遍：occupancy bitmap 和碎片化示意图
        let mut buckets = vec![0u64; value_range.div_ceil(64) as usize];
        let mut fragmentation = [b' '; FRAGMENTATION_MAP_SIZE];
        for value in read_indices(data, width, primitive_restart) {
            let offset = (value - min_value) as u64;
            buckets[(offset / 64) as usize] |= 1u64 << (offset & 63);

            let frag_index = (offset * FRAGMENTATION_MAP_SIZE as u64 / value_range) as usize;
            fragmentation[frag_index] = b'#';
        }
        let fragmentation: String = fragmentation.iter().map(|&c| c as char).collect();

        let vertices_referenced: u32 = buckets.iter().map(|bucket| bucket.count_ones()).sum();

        let utilization = vertices_referenced as f64 / value_range as f64;
        if utilization < self.settings.utilization_threshold {
            sink.performance_warning(
                MessageCode::IndexBufferSparse,
                format!("Indexbuffer data used by drawcall is fragmented: [{fragmentation}]"),
            );
        }

        let cache_hit_rate = vertices_referenced as f64 / vertex_shade_count as f64;
        if cache_hit_rate <= self.settings.cache_hit_threshold {
            sink.performance_warning(
                MessageCode::IndexBufferCacheThrashing,
                format!(
                    "Indexbuffer data causes thrashing of post-transform vertex cache. Percentage of unique vertices \
                     to number of vertices theoretically shaded is estimated to {:.02}%.",
                    cache_hit_rate * 100.0
                ),
            );
        }

        IndexScanOutcome::Analyzed(IndexScanStats {
            min_value,
            max_value,
            index_count,
            vertices_referenced,
            vertex_shade_count,
            fragmentation,
            utilization,
            cache_hit_rate,
        })
    }
}

/// 逐个读取 index，开启 primitive restart 时跳过 restart 值
fn read_indices(data: &[u8], width: IndexWidth, primitive_restart: bool) -> impl Iterator<Item = u32> + '_ {
    let restart_value = width.restart_value();
    data.chunks_exact(width.stride())
        .map(move |bytes| width.read(bytes))
        .filter(move |&value| !primitive_restart || value != restart_value)
}
