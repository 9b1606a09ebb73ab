//! 贝塞尔缓动曲线
//!
//! 用于混合权重关键帧之间的非线性插值。端点固定为 (0,0) 和 (1,1)，
//! 两个控制点归一化到 [0, 1]。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use glam::Vec2;

/// 默认采样间隔数
pub const DEFAULT_INTERVAL: u32 = 64;

/// 缓动控制点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Easing {
    pub c0: Vec2,
    pub c1: Vec2,
}

impl Easing {
    pub const LINEAR: Self = Self::new(0.0, 0.0, 1.0, 1.0);
    pub const EASE_IN: Self = Self::new(0.42, 0.0, 1.0, 1.0);
    pub const EASE_OUT: Self = Self::new(0.0, 0.0, 0.58, 1.0);
    pub const EASE_IN_OUT: Self = Self::new(0.42, 0.0, 0.58, 1.0);

    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            c0: Vec2::new(x1, y1),
            c1: Vec2::new(x2, y2),
        }
    }

    /// 夹取到单位正方形内，保证曲线 X 单调
    pub fn clamped(self) -> Self {
        Self {
            c0: self.c0.clamp(Vec2::ZERO, Vec2::ONE),
            c1: self.c1.clamp(Vec2::ZERO, Vec2::ONE),
        }
    }

    /// 两个控制点都在对角线上
    pub fn is_linear(&self) -> bool {
        self.c0.x == self.c0.y && self.c1.x == self.c1.y
    }

    /// f32 不可哈希，按位模式作为缓存键
    fn cache_key(&self) -> [u32; 4] {
        [self.c0.x, self.c0.y, self.c1.x, self.c1.y].map(f32::to_bits)
    }
}

/// 曲线 trait
pub trait Curve {
    fn value(&self, v: f32) -> f32;
}

/// 三次贝塞尔曲线
#[derive(Debug, Clone, PartialEq)]
pub struct BezierCurve {
    /// 按 X 升序的采样点
    points: Vec<Vec2>,
    easing: Easing,
    interval: u32,
}

impl BezierCurve {
    const P0: Vec2 = Vec2::ZERO;
    const P1: Vec2 = Vec2::ONE;

    pub fn new(easing: Easing, interval: u32) -> Self {
        let easing = easing.clamped();
        let (c0, c1) = (easing.c0, easing.c1);
        let interval = interval.max(1);

        let mut points: Vec<Vec2> = (0..=interval)
            .map(|i| {
                let t = i as f32 / interval as f32;
                let it = 1.0 - t;
                Self::P0 * it.powi(3)
                    + c0 * 3.0 * it.powi(2) * t
                    + c1 * 3.0 * it * t.powi(2)
                    + Self::P1 * t.powi(3)
            })
            .collect();
        // 控制点 X 在 [0,1] 内时曲线 X 单调，排序只处理浮点误差
        points.sort_unstable_by(|a, b| a.x.total_cmp(&b.x));

        Self {
            points,
            easing,
            interval,
        }
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }
}

impl Curve for BezierCurve {
    /// 输入 X ∈ [0,1]，返回曲线上对应的 Y（采样点间线性插值）
    fn value(&self, v: f32) -> f32 {
        let v = v.clamp(0.0, 1.0);
        let upper = self
            .points
            .partition_point(|p| p.x <= v)
            .clamp(1, self.points.len() - 1);
        let (a, b) = (self.points[upper - 1], self.points[upper]);
        if b.x <= a.x {
            a.y
        } else {
            a.y + (v - a.x) * (b.y - a.y) / (b.x - a.x)
        }
    }
}

/// 曲线工厂，关键帧求值时按缓动取得曲线
pub trait BezierCurveFactory {
    fn get_or_new(&self, easing: Easing, interval: u32) -> Arc<BezierCurve>;
}

/// 贝塞尔曲线缓存
///
/// 同一缓动只构建一次，可在多个轨道和线程间共享。
#[derive(Debug, Default)]
pub struct BezierCurveCache(RwLock<HashMap<[u32; 4], Arc<BezierCurve>>>);

impl BezierCurveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BezierCurveFactory for BezierCurveCache {
    fn get_or_new(&self, easing: Easing, interval: u32) -> Arc<BezierCurve> {
        let key = easing.clamped().cache_key();
        let build = || Arc::new(BezierCurve::new(easing, interval));

        match self.0.read() {
            // 缓存中的采样精度不足时不复用
            Ok(map) => match map.get(&key) {
                Some(curve) if curve.interval() >= interval => return curve.clone(),
                Some(_) => return build(),
                None => {}
            },
            Err(_) => return build(),
        }

        match self.0.write() {
            Ok(mut map) => map.entry(key).or_insert_with(build).clone(),
            Err(_) => build(),
        }
    }
}

impl Clone for BezierCurveCache {
    fn clone(&self) -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_curve() {
        let curve = BezierCurve::new(Easing::LINEAR, 100);
        assert!(curve.easing().is_linear());
        assert!(curve.value(0.0).abs() < 1e-3);
        assert!((curve.value(0.5) - 0.5).abs() < 0.01);
        assert!((curve.value(1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_ease_in_is_slow_at_start() {
        let curve = BezierCurve::new(Easing::EASE_IN, 100);
        assert!(curve.value(0.25) < 0.25);
        assert!(curve.value(0.75) < 0.75);

        let out = BezierCurve::new(Easing::EASE_OUT, 100);
        assert!(out.value(0.25) > 0.25);
    }

    #[test]
    fn test_value_clamps_input() {
        let curve = BezierCurve::new(Easing::new(0.0, 1.0, 0.0, 1.0), 32);
        assert!(curve.value(-1.0).abs() < 1e-3);
        assert!((curve.value(2.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_control_points_clamped() {
        let curve = BezierCurve::new(Easing::new(-0.5, 0.2, 1.5, 0.8), 16);
        assert_eq!(curve.easing(), Easing::new(0.0, 0.2, 1.0, 0.8));
    }

    #[test]
    fn test_cache_shares_curves() {
        let cache = BezierCurveCache::new();
        let a = cache.get_or_new(Easing::EASE_IN_OUT, 64);
        let b = cache.get_or_new(Easing::EASE_IN_OUT, 32);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        // 请求更高精度时重新构建
        let c = cache.get_or_new(Easing::EASE_IN_OUT, 128);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.interval(), 128);
    }
}
