//! 骨骼系统 - 肢体求解所需的最小层级模型
//!
//! 核心设计思想：
//! - BoneLink: 单个关节节点（名称、父子关系、全局变换）
//! - BoneSet: 关节层级存储，实现 JointStore
//! - TwoBoneIkSolver: 解析式双骨骼 IK 求解器
//! - geometry: 弯曲平面与关节目标几何

mod bone_link;
mod bone_set;
pub mod geometry;
mod ik_solver;

pub use bone_link::{BoneFlags, BoneLink};
pub use bone_set::BoneSet;
pub use ik_solver::{
    solve_two_bone_ik, EndRotationMode, IkSolveOutput, LengthSource, LimbLengths, SolveFlags,
    TwistPolicy, TwoBoneIkSettings, TwoBoneIkSolver,
};

use glam::{Mat4, Quat, Vec3};
use std::ops::Mul;

use crate::Result;

/// 关节标识（层级存储中的索引）
pub type JointId = usize;

// ============================================================================
// 公共类型定义
// ============================================================================

/// 骨骼变换数据
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    #[inline]
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self { translation, rotation, scale: Vec3::ONE }
    }

    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// 从矩阵分解
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    /// 逆变换（假设统一缩放）
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        let inv_scale = self.scale.recip();
        Self {
            translation: inv_rotation * (-self.translation) * inv_scale,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// 变换一个点
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * (point * self.scale)
    }

    /// 插值：平移/缩放线性插值，旋转走最短路径 slerp
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t).normalize(),
            scale: self.scale.lerp(other.scale, t),
        }
    }

    /// 近似相等（旋转比较考虑 q 与 -q 等价）
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        let rotation_eq = self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff);
        rotation_eq
            && self.translation.abs_diff_eq(other.translation, max_abs_diff)
            && self.scale.abs_diff_eq(other.scale, max_abs_diff)
    }
}

/// 父 * 子 的刚体变换组合
impl Mul for BoneTransform {
    type Output = BoneTransform;

    fn mul(self, child: BoneTransform) -> BoneTransform {
        BoneTransform {
            translation: self.transform_point(child.translation),
            rotation: (self.rotation * child.rotation).normalize(),
            scale: self.scale * child.scale,
        }
    }
}

// ============================================================================
// 肢体姿态
// ============================================================================

/// 三关节链（root, mid, end）的变换
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LimbPose {
    pub root: BoneTransform,
    pub mid: BoneTransform,
    pub end: BoneTransform,
}

impl LimbPose {
    pub fn new(root: BoneTransform, mid: BoneTransform, end: BoneTransform) -> Self {
        Self { root, mid, end }
    }

    /// 按 (root, mid, end) 顺序
    #[inline]
    pub fn as_array(&self) -> [BoneTransform; 3] {
        [self.root, self.mid, self.end]
    }

    /// 逐关节插值
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            root: self.root.lerp(&other.root, t),
            mid: self.mid.lerp(&other.mid, t),
            end: self.end.lerp(&other.end, t),
        }
    }

    /// 上臂长度 |mid - root|
    #[inline]
    pub fn upper_length(&self) -> f32 {
        self.mid.translation.distance(self.root.translation)
    }

    /// 下臂长度 |end - mid|
    #[inline]
    pub fn lower_length(&self) -> f32 {
        self.end.translation.distance(self.mid.translation)
    }

    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        self.root.abs_diff_eq(&other.root, max_abs_diff)
            && self.mid.abs_diff_eq(&other.mid, max_abs_diff)
            && self.end.abs_diff_eq(&other.end, max_abs_diff)
    }
}

// ============================================================================
// 宿主层级接口
// ============================================================================

/// 关节变换存储（由宿主层级/骨架提供）
///
/// 求解器只读写变换，从不创建或销毁关节。
pub trait JointStore {
    /// 读取关节的全局（组件空间）变换
    fn global_transform(&self, id: JointId) -> Result<BoneTransform>;

    /// 写入关节的全局（组件空间）变换
    fn set_global_transform(&mut self, id: JointId, transform: BoneTransform) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_and_inverse() {
        let parent = BoneTransform::from_rotation_translation(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 0.0, 0.0),
        );
        let child = BoneTransform::from_translation(Vec3::new(1.0, 0.0, 0.0));

        // 绕 Z 旋转 90°，子骨骼 +X 偏移变为 +Y
        let world = parent * child;
        assert!(world.translation.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));

        let back = parent.inverse() * world;
        assert!(back.abs_diff_eq(&child, 1e-5));
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = BoneTransform::from_translation(Vec3::ZERO);
        let b = BoneTransform::from_rotation_translation(
            Quat::from_rotation_y(1.0),
            Vec3::new(2.0, 0.0, 0.0),
        );

        assert!(a.lerp(&b, 0.0).abs_diff_eq(&a, 1e-5));
        assert!(a.lerp(&b, 1.0).abs_diff_eq(&b, 1e-5));
        assert!(a.lerp(&b, 0.5).translation.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_matrix_round_trip() {
        let t = BoneTransform::from_rotation_translation(
            Quat::from_rotation_x(0.3),
            Vec3::new(0.5, -1.0, 2.0),
        );
        assert!(BoneTransform::from_matrix(t.to_matrix()).abs_diff_eq(&t, 1e-5));
    }
}
