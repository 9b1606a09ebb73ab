//! 绑定全局配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。
//! 每肢体的求解选项见 [`TwoBoneIkSettings`](crate::skeleton::TwoBoneIkSettings)。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 绑定配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct RigConfig {
    // ========== 模式切换 ==========
    /// SwitchToIK 时关节目标相对中间关节的偏移距离，默认 100.0
    /// 关节目标只编码方向，距离足够大即可保证数值稳定
    pub joint_target_distance: f32,

    // ========== 弯曲平面 ==========
    /// 方向向量点积绝对值超过此阈值视为共线，默认 0.999
    pub degenerate_dot_threshold: f32,

    // ========== 可达距离 ==========
    /// 最小可达距离的附加量（|upper - lower| + epsilon），默认 1e-4
    pub min_reach_epsilon: f32,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            // ====== 模式切换 ======
            joint_target_distance: 100.0,

            // ====== 弯曲平面 ======
            degenerate_dot_threshold: 0.999,

            // ====== 可达距离 ======
            // 过小会在完全折叠时产生 acos 精度问题
            min_reach_epsilon: 1.0e-4,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static RIG_CONFIG: Lazy<RwLock<RigConfig>> = Lazy::new(|| {
    RwLock::new(RigConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> RigConfig {
    RIG_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: RigConfig) {
    *RIG_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *RIG_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = RigConfig::default();
}
