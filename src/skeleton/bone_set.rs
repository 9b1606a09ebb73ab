//! 关节层级存储
//!
//! BoneSet 按声明顺序保存所有关节，并维护名称索引。
//! 它是 JointStore 的默认实现，宿主也可以提供自己的存储。

use std::collections::HashMap;

use glam::Vec3;

use super::bone_link::{BoneFlags, BoneLink};
use super::{BoneTransform, JointId, JointStore};
use crate::{Result, RigError};

/// 关节层级
#[derive(Clone, Debug, Default)]
pub struct BoneSet {
    bones: Vec<BoneLink>,
    name_to_index: HashMap<String, JointId>,
}

impl BoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加关节，返回其索引
    ///
    /// 名称重复或父索引越界时失败。
    pub fn add_bone(&mut self, mut bone: BoneLink) -> Result<JointId> {
        if self.name_to_index.contains_key(&bone.name) {
            return Err(RigError::DuplicateJoint(bone.name));
        }
        if let Some(parent) = bone.parent_id() {
            if parent >= self.bones.len() {
                return Err(RigError::UnknownJoint(parent));
            }
        }

        let index = self.bones.len();
        bone.internal_id = index;
        self.name_to_index.insert(bone.name.clone(), index);
        self.bones.push(bone);
        Ok(index)
    }

    /// 通过名称查找关节
    pub fn find_bone_by_name(&self, name: &str) -> Option<JointId> {
        self.name_to_index.get(name).copied()
    }

    /// 生成未被占用的名称：`name`、`name_1`、`name_2` ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.name_to_index.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|candidate| !self.name_to_index.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn get_bone(&self, id: JointId) -> Option<&BoneLink> {
        self.bones.get(id)
    }

    pub fn get_bone_mut(&mut self, id: JointId) -> Option<&mut BoneLink> {
        self.bones.get_mut(id)
    }

    pub fn bones(&self) -> &[BoneLink] {
        &self.bones
    }

    /// 子关节列表
    pub fn children(&self, id: JointId) -> Vec<JointId> {
        self.bones
            .iter()
            .filter(|b| b.parent_id() == Some(id))
            .map(|b| b.internal_id)
            .collect()
    }

    /// 带指定标志的关节
    pub fn bones_with_flags(&self, flags: BoneFlags) -> impl Iterator<Item = &BoneLink> {
        self.bones.iter().filter(move |b| b.flags.contains(flags))
    }

    /// 关节全局位置
    pub fn position(&self, id: JointId) -> Result<Vec3> {
        self.global_transform(id).map(|t| t.translation)
    }

    /// 绑定姿态
    pub fn bind_transform(&self, id: JointId) -> Result<BoneTransform> {
        self.bones
            .get(id)
            .map(|b| b.bind_transform)
            .ok_or(RigError::UnknownJoint(id))
    }

    /// 相对父关节的本地变换
    pub fn local_transform(&self, id: JointId) -> Result<BoneTransform> {
        let bone = self.bones.get(id).ok_or(RigError::UnknownJoint(id))?;
        let parent = bone
            .parent_id()
            .and_then(|p| self.bones.get(p))
            .map(|p| &p.global_transform);
        Ok(bone.local_transform(parent))
    }

    /// 所有关节恢复绑定姿态
    pub fn reset_to_bind(&mut self) {
        for bone in &mut self.bones {
            bone.reset_to_bind();
        }
    }

    /// 所有关节的全局变换（按索引顺序）
    pub fn global_transforms(&self) -> Vec<BoneTransform> {
        self.bones.iter().map(|b| b.global_transform).collect()
    }
}

impl JointStore for BoneSet {
    fn global_transform(&self, id: JointId) -> Result<BoneTransform> {
        self.bones
            .get(id)
            .map(|b| b.global_transform)
            .ok_or(RigError::UnknownJoint(id))
    }

    fn set_global_transform(&mut self, id: JointId, transform: BoneTransform) -> Result<()> {
        let bone = self.bones.get_mut(id).ok_or(RigError::UnknownJoint(id))?;
        bone.global_transform = transform;
        Ok(())
    }
}
