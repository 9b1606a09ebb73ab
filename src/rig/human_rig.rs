//! 人形绑定 - 肢体集合与逐帧求值
//!
//! HumanRig 独占其关节层级和所有肢体控制。肢体按声明顺序求值，
//! 单个肢体出错只记录日志并跳过，一帧永远会产出姿态。

use rayon::prelude::*;

use super::limb_control::{LimbControl, LimbParameter, LimbParameterKind};
use crate::config::get_config;
use crate::skeleton::{BoneSet, LimbPose, SolveFlags};
use crate::{Result, RigError};

/// 单个肢体的求值结果
#[derive(Clone, Debug)]
pub struct LimbEvaluation {
    pub name: String,
    /// 写回结果链的姿态，出错时为 None
    pub pose: Option<LimbPose>,
    pub flags: SolveFlags,
    pub error: Option<RigError>,
}

/// 一帧的求值报告
#[derive(Clone, Debug, Default)]
pub struct RigEvaluation {
    pub limbs: Vec<LimbEvaluation>,
}

impl RigEvaluation {
    /// 所有肢体均成功
    pub fn is_ok(&self) -> bool {
        self.limbs.iter().all(|l| l.error.is_none())
    }

    pub fn pose(&self, limb_name: &str) -> Option<&LimbPose> {
        self.limbs
            .iter()
            .find(|l| l.name == limb_name)
            .and_then(|l| l.pose.as_ref())
    }

    /// 弯曲平面退化的肢体（编辑器可据此提示动画师）
    pub fn degenerate_limbs(&self) -> impl Iterator<Item = &str> {
        self.limbs
            .iter()
            .filter(|l| l.flags.contains(SolveFlags::DEGENERATE_BEND_PLANE))
            .map(|l| l.name.as_str())
    }
}

/// 人形绑定
#[derive(Clone, Debug)]
pub struct HumanRig {
    pub name: String,
    hierarchy: BoneSet,
    limbs: Vec<LimbControl>,
}

impl HumanRig {
    pub fn new(name: impl Into<String>, hierarchy: BoneSet) -> Self {
        Self {
            name: name.into(),
            hierarchy,
            limbs: Vec::new(),
        }
    }

    /// 添加肢体
    ///
    /// 肢体名称必须唯一，且引用的关节都必须存在于层级中。
    pub fn add_limb(&mut self, limb: LimbControl) -> Result<usize> {
        if self.find_limb(&limb.name).is_some() {
            return Err(RigError::DuplicateLimb(limb.name));
        }
        let joints = limb
            .fk_chain
            .as_array()
            .into_iter()
            .chain(limb.ik_chain.as_array())
            .chain(limb.result_chain.as_array())
            .chain([limb.joint_target, limb.effector]);
        for id in joints {
            if self.hierarchy.get_bone(id).is_none() {
                return Err(RigError::UnknownJoint(id));
            }
        }

        self.limbs.push(limb);
        Ok(self.limbs.len() - 1)
    }

    /// 移除肢体（关节保留在层级中）
    pub fn remove_limb(&mut self, name: &str) -> Result<LimbControl> {
        let index = self
            .find_limb(name)
            .ok_or_else(|| RigError::UnknownLimb(name.to_string()))?;
        Ok(self.limbs.remove(index))
    }

    pub fn find_limb(&self, name: &str) -> Option<usize> {
        self.limbs.iter().position(|l| l.name == name)
    }

    pub fn limb(&self, name: &str) -> Option<&LimbControl> {
        self.limbs.iter().find(|l| l.name == name)
    }

    pub fn limb_mut(&mut self, name: &str) -> Option<&mut LimbControl> {
        self.limbs.iter_mut().find(|l| l.name == name)
    }

    pub fn limbs(&self) -> &[LimbControl] {
        &self.limbs
    }

    pub fn hierarchy(&self) -> &BoneSet {
        &self.hierarchy
    }

    pub fn hierarchy_mut(&mut self) -> &mut BoneSet {
        &mut self.hierarchy
    }

    /// 从绑定姿态缓存所有肢体的参考长度
    pub fn initialize(&mut self) -> Result<()> {
        for limb in &mut self.limbs {
            let bind = limb.fk_chain.read_bind_pose(&self.hierarchy)?;
            limb.initialize(bind.upper_length(), bind.lower_length())?;
        }
        Ok(())
    }

    /// 设置肢体参数
    pub fn set_limb_parameter(&mut self, limb_name: &str, parameter: LimbParameter) -> Result<()> {
        let limb = self
            .limb_mut(limb_name)
            .ok_or_else(|| RigError::UnknownLimb(limb_name.to_string()))?;
        limb.apply_parameter(parameter);
        Ok(())
    }

    /// 读取肢体参数
    pub fn limb_parameter(
        &self,
        limb_name: &str,
        kind: LimbParameterKind,
    ) -> Result<LimbParameter> {
        self.limb(limb_name)
            .map(|l| l.parameter(kind))
            .ok_or_else(|| RigError::UnknownLimb(limb_name.to_string()))
    }

    /// 按声明顺序求值所有肢体
    pub fn evaluate(&mut self) -> RigEvaluation {
        let config = get_config();
        let mut report = RigEvaluation {
            limbs: Vec::with_capacity(self.limbs.len()),
        };

        for limb in &mut self.limbs {
            let entry = match limb.evaluate(&mut self.hierarchy) {
                Ok(pose) => {
                    let flags = limb.last_flags();
                    if flags.contains(SolveFlags::DEGENERATE_BEND_PLANE) && config.debug_log {
                        log::debug!("[Rig] 肢体 '{}' 使用了回退弯曲平面", limb.name);
                    }
                    LimbEvaluation {
                        name: limb.name.clone(),
                        pose: Some(pose),
                        flags,
                        error: None,
                    }
                }
                Err(err) => {
                    log::warn!("[Rig] 绑定 '{}' 肢体 '{}' 求值失败，跳过: {}", self.name, limb.name, err);
                    LimbEvaluation {
                        name: limb.name.clone(),
                        pose: None,
                        flags: SolveFlags::empty(),
                        error: Some(err),
                    }
                }
            };
            report.limbs.push(entry);
        }

        report
    }
}

/// 并行求值多个绑定（绑定之间互不依赖）
pub fn evaluate_rigs(rigs: &mut [HumanRig]) -> Vec<RigEvaluation> {
    rigs.par_iter_mut().map(HumanRig::evaluate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::{IkSpaceMode, RigBuilder};
    use crate::skeleton::{BoneTransform, JointStore};
    use glam::Vec3;

    fn arm_rig(name: &str) -> HumanRig {
        let mut builder = RigBuilder::new(name);
        let shoulder = builder
            .add_joint("shoulder", None, BoneTransform::from_translation(Vec3::ZERO))
            .unwrap();
        let at = BoneTransform::from_translation;
        let elbow = builder
            .add_joint("elbow", Some(shoulder), at(Vec3::new(0.6, 0.0, -0.8)))
            .unwrap();
        let wrist = builder
            .add_joint("wrist", Some(elbow), at(Vec3::new(1.2, 0.0, 0.0)))
            .unwrap();
        builder.add_two_bone_ik("arm", shoulder, elbow, wrist, Vec3::NEG_Z).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_initialize_caches_lengths() {
        let rig = arm_rig("rig");
        let limb = rig.limb("arm").unwrap();
        assert!((limb.upper_limb_length() - 1.0).abs() < 1e-5);
        assert!((limb.lower_limb_length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_parameters() {
        let mut rig = arm_rig("rig");
        rig.set_limb_parameter("arm", LimbParameter::BlendWeight(0.75)).unwrap();
        assert_eq!(
            rig.limb_parameter("arm", LimbParameterKind::BlendWeight).unwrap(),
            LimbParameter::BlendWeight(0.75)
        );
        assert_eq!(
            rig.set_limb_parameter("tail", LimbParameter::SpaceMode(IkSpaceMode::SwitchToFK)),
            Err(RigError::UnknownLimb("tail".to_string()))
        );
    }

    #[test]
    fn test_evaluate_ik_reaches_effector() {
        let mut rig = arm_rig("rig");
        rig.set_limb_parameter("arm", LimbParameter::BlendWeight(1.0)).unwrap();

        let effector = rig.limb("arm").unwrap().effector;
        let desired = Vec3::new(1.0, 0.5, -0.5);
        rig.hierarchy_mut()
            .set_global_transform(effector, BoneTransform::from_translation(desired))
            .unwrap();

        let report = rig.evaluate();
        assert!(report.is_ok());
        let pose = report.pose("arm").unwrap();
        assert!(pose.end.translation.distance(desired) < 1e-4);

        // 结果写回了骨架关节
        let wrist = rig.hierarchy().find_bone_by_name("wrist").unwrap();
        assert!(rig.hierarchy().position(wrist).unwrap().distance(desired) < 1e-4);
    }

    #[test]
    fn test_failing_limb_does_not_abort_frame() {
        let mut rig = arm_rig("rig");
        let broken = {
            let arm = rig.limb("arm").unwrap();
            LimbControl::new(
                "broken",
                arm.fk_chain,
                arm.ik_chain,
                arm.result_chain,
                arm.joint_target,
                arm.effector,
            )
        };
        rig.add_limb(broken).unwrap();

        let report = rig.evaluate();
        assert!(!report.is_ok());
        assert!(report.pose("arm").is_some());
        assert!(matches!(
            report.limbs[1].error,
            Some(RigError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_add_limb_validates() {
        let mut rig = arm_rig("rig");
        let arm = rig.limb("arm").unwrap().clone();
        assert!(matches!(rig.add_limb(arm.clone()), Err(RigError::DuplicateLimb(_))));

        let mut bad = arm;
        bad.name = "bad".to_string();
        bad.effector = 1000;
        assert_eq!(rig.add_limb(bad), Err(RigError::UnknownJoint(1000)));

        assert!(rig.remove_limb("arm").is_ok());
        assert!(rig.limbs().is_empty());
        assert!(rig.remove_limb("arm").is_err());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let desired = Vec3::new(0.8, -0.4, 0.9);
        let setup = |name: &str| {
            let mut rig = arm_rig(name);
            rig.set_limb_parameter("arm", LimbParameter::BlendWeight(0.6)).unwrap();
            let effector = rig.limb("arm").unwrap().effector;
            rig.hierarchy_mut()
                .set_global_transform(effector, BoneTransform::from_translation(desired))
                .unwrap();
            rig
        };

        let mut sequential: Vec<HumanRig> = (0..4).map(|i| setup(&format!("rig{i}"))).collect();
        let expected: Vec<RigEvaluation> = sequential.iter_mut().map(HumanRig::evaluate).collect();

        let mut parallel: Vec<HumanRig> = (0..4).map(|i| setup(&format!("rig{i}"))).collect();
        let reports = evaluate_rigs(&mut parallel);

        assert_eq!(reports.len(), expected.len());
        for (a, b) in reports.iter().zip(&expected) {
            assert_eq!(a.pose("arm"), b.pose("arm"));
        }
    }
}
