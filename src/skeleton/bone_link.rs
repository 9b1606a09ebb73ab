//! 关节节点
//!
//! BoneLink 是层级存储的基本单元。每个 BoneLink 保存绑定姿态和
//! 当前全局（组件空间）变换，求解器只读写后者。

use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::{BoneTransform, JointId};

// ============================================================================
// 关节标志
// ============================================================================

bitflags! {
    /// 关节用途标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoneFlags: u32 {
        /// FK 链关节
        const FK = 1 << 0;
        /// IK 链关节
        const IK = 1 << 1;
        /// 混合结果关节（写回骨架）
        const RESULT = 1 << 2;
        /// IK 关节目标
        const JOINT_TARGET = 1 << 3;
        /// IK 末端执行器
        const EFFECTOR = 1 << 4;
        /// 动画师可直接操作的控制点
        const CONTROL = Self::JOINT_TARGET.bits() | Self::EFFECTOR.bits();
    }
}

// ============================================================================
// 关节节点
// ============================================================================

/// 关节节点
///
/// - 静态数据：名称、父子关系、标志、绑定姿态
/// - 动态数据：每帧更新的全局变换
#[derive(Clone, Debug)]
pub struct BoneLink {
    /// 关节名称
    pub name: String,

    /// 关节内部索引
    pub(crate) internal_id: JointId,

    /// 父关节索引 (-1 表示根关节)
    pub parent_index: i32,

    /// 关节标志
    pub flags: BoneFlags,

    /// 绑定姿态（全局空间）
    pub bind_transform: BoneTransform,

    /// 当前全局变换
    pub global_transform: BoneTransform,
}

impl BoneLink {
    /// 创建新关节
    pub fn new(name: String) -> Self {
        Self {
            name,
            internal_id: 0,
            parent_index: -1,
            flags: BoneFlags::empty(),
            bind_transform: BoneTransform::IDENTITY,
            global_transform: BoneTransform::IDENTITY,
        }
    }

    /// 以绑定姿态创建，当前变换初始化为绑定姿态
    pub fn with_bind(name: impl Into<String>, bind: BoneTransform) -> Self {
        let mut bone = Self::new(name.into());
        bone.bind_transform = bind;
        bone.global_transform = bind;
        bone
    }

    pub fn with_parent(mut self, parent: JointId) -> Self {
        self.parent_index = parent as i32;
        self
    }

    pub fn with_flags(mut self, flags: BoneFlags) -> Self {
        self.flags = flags;
        self
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn link_id(&self) -> JointId {
        self.internal_id
    }

    #[inline]
    pub fn parent_id(&self) -> Option<JointId> {
        if self.parent_index >= 0 {
            Some(self.parent_index as JointId)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }

    /// 获取全局位置
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.global_transform.translation
    }

    /// 获取全局旋转
    #[inline]
    pub fn rotation(&self) -> Quat {
        self.global_transform.rotation
    }

    /// 恢复到绑定姿态
    #[inline]
    pub fn reset_to_bind(&mut self) {
        self.global_transform = self.bind_transform;
    }

    /// 相对父关节的本地变换
    pub fn local_transform(&self, parent_global: Option<&BoneTransform>) -> BoneTransform {
        match parent_global {
            Some(parent) => parent.inverse() * self.global_transform,
            None => self.global_transform,
        }
    }

    #[inline]
    pub fn is_control(&self) -> bool {
        self.flags.intersects(BoneFlags::CONTROL)
    }
}

impl Default for BoneLink {
    fn default() -> Self {
        Self::new(String::new())
    }
}
