//! 肢体权重轨道
//!
//! 以关键帧驱动单个肢体的混合权重和空间模式。

use std::collections::BTreeMap;

use super::bezier_curve::{BezierCurveFactory, Curve, Easing, DEFAULT_INTERVAL};
use crate::rig::{HumanRig, IkSpaceMode, LimbParameter};
use crate::Result;

/// 权重关键帧
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightKeyframe {
    pub frame_index: u32,
    pub blend_weight: f32,
    pub space_mode: IkSpaceMode,
    /// 从上一关键帧过渡到本帧的缓动，None 为线性
    pub easing: Option<Easing>,
}

impl WeightKeyframe {
    pub fn new(frame_index: u32, blend_weight: f32) -> Self {
        Self {
            frame_index,
            blend_weight: blend_weight.clamp(0.0, 1.0),
            space_mode: IkSpaceMode::UseWeight,
            easing: None,
        }
    }

    pub fn with_space_mode(mut self, space_mode: IkSpaceMode) -> Self {
        self.space_mode = space_mode;
        self
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }
}

/// 轨道求值结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSample {
    pub blend_weight: f32,
    pub space_mode: IkSpaceMode,
}

impl From<&WeightKeyframe> for WeightSample {
    fn from(kf: &WeightKeyframe) -> Self {
        Self {
            blend_weight: kf.blend_weight,
            space_mode: kf.space_mode,
        }
    }
}

/// 单个肢体的权重轨道
#[derive(Debug, Clone)]
pub struct LimbWeightTrack {
    pub limb_name: String,
    /// 帧索引 -> 关键帧
    pub keyframes: BTreeMap<u32, WeightKeyframe>,
}

impl LimbWeightTrack {
    pub fn new(limb_name: impl Into<String>) -> Self {
        Self {
            limb_name: limb_name.into(),
            keyframes: BTreeMap::new(),
        }
    }

    /// 插入关键帧，返回被替换的旧关键帧
    pub fn insert_keyframe(&mut self, keyframe: WeightKeyframe) -> Option<WeightKeyframe> {
        self.keyframes.insert(keyframe.frame_index, keyframe)
    }

    pub fn remove_keyframe(&mut self, frame_index: u32) -> Option<WeightKeyframe> {
        self.keyframes.remove(&frame_index)
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn max_frame_index(&self) -> u32 {
        self.keyframes.keys().next_back().copied().unwrap_or(0)
    }

    pub fn find(&self, frame_index: u32) -> Option<WeightSample> {
        self.keyframes.get(&frame_index).map(WeightSample::from)
    }

    /// 最近的前（含当前帧）后关键帧
    fn search_closest(
        &self,
        frame_index: u32,
    ) -> (Option<&WeightKeyframe>, Option<&WeightKeyframe>) {
        let prev = self.keyframes.range(..=frame_index).next_back().map(|(_, kf)| kf);
        let next = self
            .keyframes
            .range(frame_index.saturating_add(1)..)
            .next()
            .map(|(_, kf)| kf);
        (prev, next)
    }

    /// 求值指定帧，空轨道返回 None
    ///
    /// 关键帧之间按后一帧的缓动插值权重，空间模式保持前一帧的值。
    pub fn seek(
        &self,
        frame_index: u32,
        bezier_factory: &dyn BezierCurveFactory,
    ) -> Option<WeightSample> {
        if let Some(sample) = self.find(frame_index) {
            return Some(sample);
        }

        match self.search_closest(frame_index) {
            (Some(prev), Some(next)) => {
                let interval = next.frame_index - prev.frame_index;
                let coef = (frame_index - prev.frame_index) as f32 / interval as f32;
                let amount = match next.easing {
                    Some(easing) => bezier_factory
                        .get_or_new(easing, interval.max(DEFAULT_INTERVAL))
                        .value(coef),
                    None => coef,
                };
                let delta = next.blend_weight - prev.blend_weight;
                Some(WeightSample {
                    blend_weight: prev.blend_weight + delta * amount,
                    space_mode: prev.space_mode,
                })
            }
            (Some(kf), None) | (None, Some(kf)) => Some(kf.into()),
            (None, None) => None,
        }
    }

    /// 帧间求值，`amount` ∈ [0,1) 为到下一帧的进度
    pub fn seek_precisely(
        &self,
        frame_index: u32,
        amount: f32,
        bezier_factory: &dyn BezierCurveFactory,
    ) -> Option<WeightSample> {
        let s0 = self.seek(frame_index, bezier_factory)?;
        if amount <= 0.0 {
            return Some(s0);
        }
        let s1 = self.seek(frame_index.saturating_add(1), bezier_factory)?;
        Some(WeightSample {
            blend_weight: s0.blend_weight + (s1.blend_weight - s0.blend_weight) * amount.min(1.0),
            space_mode: s0.space_mode,
        })
    }

    /// 将求值结果写入绑定中的同名肢体
    ///
    /// `SwitchToFK` / `SwitchToIK` 下只写空间模式，权重由肢体切换时决定，
    /// 切换只在进入该模式后的第一次求值发生。
    pub fn apply(
        &self,
        rig: &mut HumanRig,
        frame_index: u32,
        bezier_factory: &dyn BezierCurveFactory,
    ) -> Result<Option<WeightSample>> {
        let Some(sample) = self.seek(frame_index, bezier_factory) else {
            return Ok(None);
        };
        rig.set_limb_parameter(&self.limb_name, LimbParameter::SpaceMode(sample.space_mode))?;
        if sample.space_mode == IkSpaceMode::UseWeight {
            let weight = LimbParameter::BlendWeight(sample.blend_weight);
            rig.set_limb_parameter(&self.limb_name, weight)?;
        }
        Ok(Some(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::BezierCurveCache;
    use crate::rig::{LimbParameterKind, RigBuilder};
    use crate::skeleton::{BoneTransform, JointStore};
    use crate::RigError;
    use glam::Vec3;

    fn track() -> LimbWeightTrack {
        let mut track = LimbWeightTrack::new("arm");
        track.insert_keyframe(WeightKeyframe::new(0, 0.0));
        track.insert_keyframe(
            WeightKeyframe::new(10, 1.0).with_space_mode(IkSpaceMode::SwitchToFK),
        );
        track.insert_keyframe(
            WeightKeyframe::new(20, 0.0).with_easing(Easing::new(1.0, 0.0, 1.0, 0.0)),
        );
        track
    }

    #[test]
    fn test_seek_linear() {
        let cache = BezierCurveCache::new();
        let track = track();

        assert_eq!(track.len(), 3);
        assert_eq!(track.max_frame_index(), 20);
        let sample = track.seek(5, &cache).unwrap();
        assert!((sample.blend_weight - 0.5).abs() < 1e-6);
        assert_eq!(sample.space_mode, IkSpaceMode::UseWeight);

        // 关键帧上直接取值
        let key = track.seek(10, &cache).unwrap();
        assert_eq!(key.blend_weight, 1.0);
        assert_eq!(key.space_mode, IkSpaceMode::SwitchToFK);
    }

    #[test]
    fn test_seek_eased_and_holds_mode() {
        let cache = BezierCurveCache::new();
        let sample = track().seek(15, &cache).unwrap();
        // 缓入曲线：中点处仍接近起始值
        assert!(sample.blend_weight > 0.7);
        assert_eq!(sample.space_mode, IkSpaceMode::SwitchToFK);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_seek_outside_range() {
        let cache = BezierCurveCache::new();
        let mut track = LimbWeightTrack::new("arm");
        assert!(track.seek(3, &cache).is_none());

        track.insert_keyframe(WeightKeyframe::new(5, 0.4));
        assert_eq!(track.seek(0, &cache).unwrap().blend_weight, 0.4);
        assert_eq!(track.seek(99, &cache).unwrap().blend_weight, 0.4);
    }

    #[test]
    fn test_seek_precisely() {
        let cache = BezierCurveCache::new();
        let sample = track().seek_precisely(4, 0.5, &cache).unwrap();
        assert!((sample.blend_weight - 0.45).abs() < 1e-6);
    }

    fn arm_rig() -> HumanRig {
        let mut builder = RigBuilder::new("rig");
        let a = builder.add_joint("a", None, BoneTransform::IDENTITY).unwrap();
        let b = builder
            .add_joint("b", Some(a), BoneTransform::from_translation(Vec3::new(0.6, 0.0, -0.8)))
            .unwrap();
        let c = builder
            .add_joint("c", Some(b), BoneTransform::from_translation(Vec3::new(1.2, 0.0, 0.0)))
            .unwrap();
        builder.add_two_bone_ik("arm", a, b, c, Vec3::NEG_Z).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_apply_drives_rig() {
        let mut rig = arm_rig();
        let cache = BezierCurveCache::new();
        let sample = track().apply(&mut rig, 5, &cache).unwrap().unwrap();
        assert_eq!(
            rig.limb_parameter("arm", LimbParameterKind::BlendWeight).unwrap(),
            LimbParameter::BlendWeight(sample.blend_weight)
        );

        let orphan = LimbWeightTrack {
            limb_name: "leg".to_string(),
            ..track()
        };
        assert_eq!(
            orphan.apply(&mut rig, 5, &cache),
            Err(RigError::UnknownLimb("leg".to_string()))
        );
    }

    #[test]
    fn test_switch_to_ik_key_follows_effector() {
        let mut rig = arm_rig();
        let cache = BezierCurveCache::new();
        let mut track = LimbWeightTrack::new("arm");
        track.insert_keyframe(WeightKeyframe::new(0, 0.0).with_space_mode(IkSpaceMode::SwitchToIK));

        let effector = rig.limb("arm").unwrap().effector;
        let desired = Vec3::new(1.0, 0.5, -0.5);
        let mut last = None;
        for frame in 0..4 {
            track.apply(&mut rig, frame, &cache).unwrap();
            rig.hierarchy_mut()
                .set_global_transform(effector, BoneTransform::from_translation(desired))
                .unwrap();
            last = rig.evaluate().pose("arm").copied();
            assert_eq!(rig.limb("arm").unwrap().blend_weight(), 1.0);
        }

        // 切换只发生一次，之后执行器输入生效
        let pose = last.unwrap();
        assert!(pose.end.translation.distance(desired) < 1e-4);
        let held = rig.hierarchy().global_transform(effector).unwrap().translation;
        assert!(held.distance(desired) < 1e-6);
    }

    #[test]
    fn test_switch_to_fk_key_settles() {
        let mut rig = arm_rig();
        rig.set_limb_parameter("arm", LimbParameter::BlendWeight(1.0)).unwrap();
        let cache = BezierCurveCache::new();
        let mut track = LimbWeightTrack::new("arm");
        track.insert_keyframe(WeightKeyframe::new(0, 1.0).with_space_mode(IkSpaceMode::SwitchToFK));

        for frame in 0..3 {
            track.apply(&mut rig, frame, &cache).unwrap();
            rig.evaluate();
            let mut limb = rig.limb("arm").unwrap().clone();
            assert_eq!(limb.blend_weight(), 0.0);
            assert!(!limb.correct_ik_space(rig.hierarchy_mut()).unwrap());
        }
    }
}
