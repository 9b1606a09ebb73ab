//! 绑定构建器 - 编辑期肢体创建
//!
//! 为骨架上的三关节链生成 FK / IK 关节副本、关节目标和末端执行器，
//! 并注册对应的 LimbControl。名称冲突时自动追加 `_1`、`_2` 后缀。

use glam::Vec3;

use super::human_rig::HumanRig;
use super::limb_control::{LimbChain, LimbControl};
use crate::config::get_config;
use crate::skeleton::geometry::{direction, joint_target_from_pose, perpendicular_direction};
use crate::skeleton::{BoneFlags, BoneLink, BoneSet, BoneTransform, JointId, TwoBoneIkSettings};
use crate::{Result, RigError};

/// 手臂默认弯曲方向（肘部朝后）
pub const ARM_BEND_HINT: Vec3 = Vec3::NEG_Z;
/// 腿部默认弯曲方向（膝盖朝前）
pub const LEG_BEND_HINT: Vec3 = Vec3::Z;

/// 肢体左右侧
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimbSide {
    Left,
    Right,
}

impl LimbSide {
    fn prefix(self) -> &'static str {
        match self {
            LimbSide::Left => "left",
            LimbSide::Right => "right",
        }
    }
}

/// 绑定构建器
#[derive(Clone, Debug)]
pub struct RigBuilder {
    name: String,
    hierarchy: BoneSet,
    limbs: Vec<LimbControl>,
    settings: TwoBoneIkSettings,
}

impl RigBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_hierarchy(name, BoneSet::new())
    }

    /// 在已有骨架上构建
    pub fn from_hierarchy(name: impl Into<String>, hierarchy: BoneSet) -> Self {
        Self {
            name: name.into(),
            hierarchy,
            limbs: Vec::new(),
            settings: TwoBoneIkSettings::default(),
        }
    }

    /// 之后创建的肢体使用的求解配置
    pub fn with_settings(mut self, settings: TwoBoneIkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn hierarchy(&self) -> &BoneSet {
        &self.hierarchy
    }

    /// 添加骨架关节（绑定姿态为全局变换）
    pub fn add_joint(
        &mut self,
        name: &str,
        parent: Option<JointId>,
        bind: BoneTransform,
    ) -> Result<JointId> {
        let mut bone = BoneLink::with_bind(name, bind);
        if let Some(parent) = parent {
            bone = bone.with_parent(parent);
        }
        self.hierarchy.add_bone(bone)
    }

    /// 为 `root → mid → end` 创建双骨骼 IK 肢体，返回实际使用的肢体名称
    ///
    /// 绑定姿态伸直时，关节目标沿 `bend_hint` 放置。
    pub fn add_two_bone_ik(
        &mut self,
        name: &str,
        root: JointId,
        mid: JointId,
        end: JointId,
        bend_hint: Vec3,
    ) -> Result<String> {
        let limb_name = self.unique_limb_name(name);
        let result_chain = LimbChain::new(root, mid, end);
        let bind = result_chain.read_bind_pose(&self.hierarchy)?;

        for id in result_chain.as_array() {
            if let Some(bone) = self.hierarchy.get_bone_mut(id) {
                bone.flags |= BoneFlags::RESULT;
            }
        }

        let fk_chain = self.duplicate_chain(&limb_name, "fk", result_chain, BoneFlags::FK)?;
        let ik_chain = self.duplicate_chain(&limb_name, "ik", result_chain, BoneFlags::IK)?;

        let config = get_config();
        let placement = joint_target_from_pose(
            bind.root.translation,
            bind.mid.translation,
            bind.end.translation,
            config.joint_target_distance,
            config.degenerate_dot_threshold,
        );
        let joint_target_pos = if placement.degenerate {
            let base = direction(bind.end.translation - bind.root.translation).unwrap_or(Vec3::X);
            let offset = perpendicular_direction(bend_hint, base)
                .unwrap_or_else(|| base.any_orthonormal_vector());
            bind.mid.translation + offset * config.joint_target_distance
        } else {
            placement.position
        };

        let joint_target_name = self.hierarchy.unique_name(&format!("{}_joint_target", limb_name));
        let joint_target_bind = BoneTransform::from_translation(joint_target_pos);
        let joint_target = self.hierarchy.add_bone(
            BoneLink::with_bind(joint_target_name, joint_target_bind)
                .with_flags(BoneFlags::JOINT_TARGET),
        )?;

        let effector_name = self.hierarchy.unique_name(&format!("{}_effector", limb_name));
        let effector = self.hierarchy.add_bone(
            BoneLink::with_bind(effector_name, bind.end).with_flags(BoneFlags::EFFECTOR),
        )?;

        let limb = LimbControl::new(
            limb_name.clone(),
            fk_chain,
            ik_chain,
            result_chain,
            joint_target,
            effector,
        )
        .with_settings(self.settings);
        self.limbs.push(limb);

        if config.debug_log {
            log::info!("[Rig] 创建肢体 '{}'", limb_name);
        }
        Ok(limb_name)
    }

    /// 手臂：shoulder → elbow → wrist
    pub fn add_arm(
        &mut self,
        side: LimbSide,
        shoulder: JointId,
        elbow: JointId,
        wrist: JointId,
    ) -> Result<String> {
        let name = format!("{}_arm", side.prefix());
        self.add_two_bone_ik(&name, shoulder, elbow, wrist, ARM_BEND_HINT)
    }

    /// 腿：hip → knee → ankle
    pub fn add_leg(
        &mut self,
        side: LimbSide,
        hip: JointId,
        knee: JointId,
        ankle: JointId,
    ) -> Result<String> {
        self.add_two_bone_ik(&format!("{}_leg", side.prefix()), hip, knee, ankle, LEG_BEND_HINT)
    }

    /// 生成绑定并缓存所有肢体的参考长度
    pub fn build(self) -> Result<HumanRig> {
        let mut rig = HumanRig::new(self.name, self.hierarchy);
        for limb in self.limbs {
            rig.add_limb(limb)?;
        }
        rig.initialize()?;
        Ok(rig)
    }

    fn unique_limb_name(&self, base: &str) -> String {
        let taken = |candidate: &str| self.limbs.iter().any(|l| l.name == candidate);
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// 复制三关节链，父子关系沿链重建，根关节挂到原根关节的父节点
    fn duplicate_chain(
        &mut self,
        limb_name: &str,
        tag: &str,
        source: LimbChain,
        flags: BoneFlags,
    ) -> Result<LimbChain> {
        let mut parent = self
            .hierarchy
            .get_bone(source.root)
            .ok_or(RigError::UnknownJoint(source.root))?
            .parent_id();

        let mut ids = [0; 3];
        for (slot, source_id) in ids.iter_mut().zip(source.as_array()) {
            let bone = self
                .hierarchy
                .get_bone(source_id)
                .ok_or(RigError::UnknownJoint(source_id))?;
            let name = self
                .hierarchy
                .unique_name(&format!("{}_{}_{}", limb_name, tag, bone.name));
            let mut copy = BoneLink::with_bind(name, bone.bind_transform).with_flags(flags);
            if let Some(p) = parent {
                copy = copy.with_parent(p);
            }
            let id = self.hierarchy.add_bone(copy)?;
            *slot = id;
            parent = Some(id);
        }

        Ok(LimbChain::new(ids[0], ids[1], ids[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::JointStore;

    fn straight_arm(builder: &mut RigBuilder, prefix: &str) -> (JointId, JointId, JointId) {
        let at = BoneTransform::from_translation;
        let shoulder = builder
            .add_joint(&format!("{prefix}shoulder"), None, at(Vec3::ZERO))
            .unwrap();
        let elbow = builder
            .add_joint(&format!("{prefix}elbow"), Some(shoulder), at(Vec3::X))
            .unwrap();
        let wrist = builder
            .add_joint(&format!("{prefix}wrist"), Some(elbow), at(Vec3::new(2.0, 0.0, 0.0)))
            .unwrap();
        (shoulder, elbow, wrist)
    }

    #[test]
    fn test_add_arm_creates_joints() {
        let mut builder = RigBuilder::new("rig");
        let (s, e, w) = straight_arm(&mut builder, "l_");
        let name = builder.add_arm(LimbSide::Left, s, e, w).unwrap();
        assert_eq!(name, "left_arm");

        let rig = builder.build().unwrap();
        let limb = rig.limb("left_arm").unwrap();
        let bones = rig.hierarchy();

        assert_eq!(limb.result_chain, LimbChain::new(s, e, w));
        assert_eq!(bones.find_bone_by_name("left_arm_fk_l_elbow"), Some(limb.fk_chain.mid));
        assert_eq!(bones.find_bone_by_name("left_arm_ik_l_wrist"), Some(limb.ik_chain.end));
        let fk_mid = bones.get_bone(limb.fk_chain.mid).unwrap();
        assert_eq!(fk_mid.parent_id(), Some(limb.fk_chain.root));
        assert!(bones.get_bone(limb.joint_target).unwrap().flags.contains(BoneFlags::JOINT_TARGET));
        assert!(bones.get_bone(w).unwrap().flags.contains(BoneFlags::RESULT));

        // 绑定伸直：关节目标沿手臂弯曲提示放置
        let jt = bones.position(limb.joint_target).unwrap();
        assert!(jt.abs_diff_eq(Vec3::new(1.0, 0.0, -100.0), 1e-3));
        let effector = bones.global_transform(limb.effector).unwrap();
        assert_eq!(effector.translation, Vec3::new(2.0, 0.0, 0.0));
        assert!((limb.upper_limb_length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unique_limb_names() {
        let mut builder = RigBuilder::new("rig");
        let (s, e, w) = straight_arm(&mut builder, "a_");
        let (s2, e2, w2) = straight_arm(&mut builder, "b_");

        assert_eq!(builder.add_two_bone_ik("arm", s, e, w, ARM_BEND_HINT).unwrap(), "arm");
        assert_eq!(builder.add_two_bone_ik("arm", s2, e2, w2, ARM_BEND_HINT).unwrap(), "arm_1");

        let rig = builder.build().unwrap();
        assert_eq!(rig.limbs().len(), 2);
        assert!(rig.hierarchy().find_bone_by_name("arm_1_effector").is_some());
    }

    #[test]
    fn test_leg_bends_forward() {
        let mut builder = RigBuilder::new("rig");
        let hip = builder
            .add_joint("hip", None, BoneTransform::from_translation(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        let knee = builder
            .add_joint("knee", Some(hip), BoneTransform::from_translation(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        let ankle = builder
            .add_joint("ankle", Some(knee), BoneTransform::from_translation(Vec3::ZERO))
            .unwrap();
        builder.add_leg(LimbSide::Right, hip, knee, ankle).unwrap();
        let mut rig = builder.build().unwrap();

        // 抬脚：膝盖应朝 +Z 弯曲
        rig.set_limb_parameter("right_leg", crate::rig::LimbParameter::BlendWeight(1.0)).unwrap();
        let effector = rig.limb("right_leg").unwrap().effector;
        rig.hierarchy_mut()
            .set_global_transform(effector, BoneTransform::from_translation(Vec3::Y * 0.5))
            .unwrap();
        let report = rig.evaluate();
        let pose = report.pose("right_leg").unwrap();
        assert!(pose.mid.translation.z > 0.5);
    }

    #[test]
    fn test_zero_length_chain_fails_build() {
        let mut builder = RigBuilder::new("rig");
        let a = builder.add_joint("a", None, BoneTransform::IDENTITY).unwrap();
        let b = builder.add_joint("b", Some(a), BoneTransform::IDENTITY).unwrap();
        let c = builder.add_joint("c", Some(b), BoneTransform::from_translation(Vec3::X)).unwrap();
        builder.add_two_bone_ik("broken", a, b, c, ARM_BEND_HINT).unwrap();

        assert!(matches!(builder.build(), Err(RigError::InvalidChainLength { .. })));
    }
}
