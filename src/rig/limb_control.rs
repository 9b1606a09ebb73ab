//! 肢体控制 - FK/IK 混合状态机
//!
//! 每个 LimbControl 拥有三条关节链（FK / IK / 结果）以及关节目标和末端执行器。
//! 混合权重表示 IK 的比例：0 = 纯 FK，1 = 纯 IK。
//!
//! 混合逐关节进行：位置线性插值，旋转 slerp。FK 与 IK 弯曲方向不同时，
//! 0 < 权重 < 1 的结果骨段会短于参考长度。从这样的姿态切换到 IK，
//! 当帧保持该姿态，下一次求解恢复参考长度。

use crate::config::get_config;
use crate::skeleton::geometry::joint_target_from_pose;
use crate::skeleton::{
    solve_two_bone_ik, BoneSet, BoneTransform, JointId, JointStore, LimbLengths, LimbPose,
    SolveFlags, TwoBoneIkSettings,
};
use crate::{Result, RigError};

// ============================================================================
// 模式与参数
// ============================================================================

/// IK 空间模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IkSpaceMode {
    /// 混合权重由外部驱动
    #[default]
    UseWeight,
    /// 一次性切换到 FK（权重强制为 0）
    SwitchToFK,
    /// 一次性切换到 IK（权重强制为 1）
    SwitchToIK,
}

/// 可动画的肢体参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LimbParameter {
    BlendWeight(f32),
    SpaceMode(IkSpaceMode),
}

/// 参数种类（用于读取）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimbParameterKind {
    BlendWeight,
    SpaceMode,
}

// ============================================================================
// 关节链
// ============================================================================

/// 三关节链 (root, mid, end)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LimbChain {
    pub root: JointId,
    pub mid: JointId,
    pub end: JointId,
}

impl LimbChain {
    pub fn new(root: JointId, mid: JointId, end: JointId) -> Self {
        Self { root, mid, end }
    }

    #[inline]
    pub fn as_array(&self) -> [JointId; 3] {
        [self.root, self.mid, self.end]
    }

    /// 读取当前全局变换
    pub fn read_pose<S: JointStore + ?Sized>(&self, store: &S) -> Result<LimbPose> {
        Ok(LimbPose {
            root: store.global_transform(self.root)?,
            mid: store.global_transform(self.mid)?,
            end: store.global_transform(self.end)?,
        })
    }

    /// 读取绑定姿态
    pub fn read_bind_pose(&self, bones: &BoneSet) -> Result<LimbPose> {
        Ok(LimbPose {
            root: bones.bind_transform(self.root)?,
            mid: bones.bind_transform(self.mid)?,
            end: bones.bind_transform(self.end)?,
        })
    }

    /// 写入全局变换
    pub fn write_pose<S: JointStore + ?Sized>(&self, store: &mut S, pose: &LimbPose) -> Result<()> {
        store.set_global_transform(self.root, pose.root)?;
        store.set_global_transform(self.mid, pose.mid)?;
        store.set_global_transform(self.end, pose.end)
    }
}

/// SwitchToIK 的结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwitchOutcome {
    /// 写入的关节目标变换
    pub joint_target: BoneTransform,
    /// 链条伸直，无法确定弯曲平面
    pub degenerate_bend_plane: bool,
}

// ============================================================================
// 肢体控制
// ============================================================================

/// 单个肢体的 FK/IK 控制状态
#[derive(Clone, Debug)]
pub struct LimbControl {
    /// 肢体名称
    pub name: String,
    /// FK 姿态关节
    pub fk_chain: LimbChain,
    /// IK 姿态关节
    pub ik_chain: LimbChain,
    /// 混合输出关节
    pub result_chain: LimbChain,
    /// IK 关节目标
    pub joint_target: JointId,
    /// IK 末端执行器
    pub effector: JointId,
    /// 空间模式
    pub space_mode: IkSpaceMode,
    /// IK 求解配置
    pub settings: TwoBoneIkSettings,

    upper_limb_length: f32,
    lower_limb_length: f32,
    blend_weight: f32,
    last_flags: SolveFlags,
}

impl LimbControl {
    pub fn new(
        name: impl Into<String>,
        fk_chain: LimbChain,
        ik_chain: LimbChain,
        result_chain: LimbChain,
        joint_target: JointId,
        effector: JointId,
    ) -> Self {
        Self {
            name: name.into(),
            fk_chain,
            ik_chain,
            result_chain,
            joint_target,
            effector,
            space_mode: IkSpaceMode::UseWeight,
            settings: TwoBoneIkSettings::default(),
            upper_limb_length: 0.0,
            lower_limb_length: 0.0,
            blend_weight: 0.0,
            last_flags: SolveFlags::empty(),
        }
    }

    pub fn with_settings(mut self, settings: TwoBoneIkSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 缓存参考长度，非法长度立即失败
    pub fn initialize(&mut self, upper: f32, lower: f32) -> Result<()> {
        let lengths = LimbLengths::new(upper, lower)?;
        self.upper_limb_length = lengths.upper;
        self.lower_limb_length = lengths.lower;
        Ok(())
    }

    /// 从存储中 FK 链的当前（绑定）姿态缓存参考长度
    pub fn initialize_from_store<S: JointStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        let pose = self.fk_chain.read_pose(store)?;
        self.initialize(pose.upper_length(), pose.lower_length())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.upper_limb_length > 0.0 && self.lower_limb_length > 0.0
    }

    pub fn lengths(&self) -> Option<LimbLengths> {
        self.is_initialized().then_some(LimbLengths {
            upper: self.upper_limb_length,
            lower: self.lower_limb_length,
        })
    }

    #[inline]
    pub fn upper_limb_length(&self) -> f32 {
        self.upper_limb_length
    }

    #[inline]
    pub fn lower_limb_length(&self) -> f32 {
        self.lower_limb_length
    }

    #[inline]
    pub fn blend_weight(&self) -> f32 {
        self.blend_weight
    }

    /// 设置混合权重，夹取到 [0, 1]，NaN 视为 0
    pub fn set_blend_weight(&mut self, weight: f32) {
        self.blend_weight = if weight.is_nan() { 0.0 } else { weight.clamp(0.0, 1.0) };
    }

    /// 上次求值的诊断标志
    #[inline]
    pub fn last_flags(&self) -> SolveFlags {
        self.last_flags
    }

    pub fn apply_parameter(&mut self, parameter: LimbParameter) {
        match parameter {
            LimbParameter::BlendWeight(weight) => self.set_blend_weight(weight),
            LimbParameter::SpaceMode(mode) => self.space_mode = mode,
        }
    }

    pub fn parameter(&self, kind: LimbParameterKind) -> LimbParameter {
        match kind {
            LimbParameterKind::BlendWeight => LimbParameter::BlendWeight(self.blend_weight),
            LimbParameterKind::SpaceMode => LimbParameter::SpaceMode(self.space_mode),
        }
    }

    // ========================================
    // 模式切换
    // ========================================

    /// 根据空间模式修正混合权重
    ///
    /// 返回本次是否发生了切换。权重已到位时为空操作。
    pub fn correct_ik_space<S: JointStore + ?Sized>(&mut self, store: &mut S) -> Result<bool> {
        match self.space_mode {
            IkSpaceMode::SwitchToFK if self.blend_weight != 0.0 => {
                self.switch_to_fk(store)?;
                self.blend_weight = 0.0;
                Ok(true)
            }
            IkSpaceMode::SwitchToIK if self.blend_weight != 1.0 => {
                self.switch_to_ik(store)?;
                self.blend_weight = 1.0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// 切换到 IK：由当前结果姿态重建关节目标与末端执行器，并复制到 IK 链
    pub fn switch_to_ik<S: JointStore + ?Sized>(&mut self, store: &mut S) -> Result<SwitchOutcome> {
        let config = get_config();
        let pose = self.result_chain.read_pose(store)?;

        let placement = joint_target_from_pose(
            pose.root.translation,
            pose.mid.translation,
            pose.end.translation,
            config.joint_target_distance,
            config.degenerate_dot_threshold,
        );

        let joint_target = if placement.degenerate {
            log::warn!(
                "[Rig] 肢体 '{}' 切换到 IK 时链条伸直，弯曲平面不确定",
                self.name
            );
            pose.mid
        } else {
            BoneTransform {
                translation: placement.position,
                ..store.global_transform(self.joint_target)?
            }
        };

        store.set_global_transform(self.joint_target, joint_target)?;
        store.set_global_transform(self.effector, pose.end)?;
        self.ik_chain.write_pose(store, &pose)?;

        if config.debug_log {
            log::debug!("[Rig] 肢体 '{}' 切换到 IK", self.name);
        }

        Ok(SwitchOutcome {
            joint_target,
            degenerate_bend_plane: placement.degenerate,
        })
    }

    /// 切换到 FK：当前结果姿态直接复制到 FK 链
    pub fn switch_to_fk<S: JointStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        let pose = self.result_chain.read_pose(store)?;
        self.fk_chain.write_pose(store, &pose)?;

        if get_config().debug_log {
            log::debug!("[Rig] 肢体 '{}' 切换到 FK", self.name);
        }
        Ok(())
    }

    // ========================================
    // 求值
    // ========================================

    /// 求值一帧：修正空间模式 → 求解 IK → 按权重混合写入结果链
    ///
    /// 切换到 IK 的当帧不求解，直接输出刚复制到 IK 链的姿态。
    pub fn evaluate<S: JointStore + ?Sized>(&mut self, store: &mut S) -> Result<LimbPose> {
        let lengths = self
            .lengths()
            .ok_or_else(|| RigError::NotInitialized(self.name.clone()))?;

        let switched = self.correct_ik_space(store)?;
        self.last_flags = SolveFlags::empty();

        let fk_pose = self.fk_chain.read_pose(store)?;

        let result = if switched && self.space_mode == IkSpaceMode::SwitchToIK {
            self.ik_chain.read_pose(store)?
        } else if self.blend_weight > 0.0 {
            let ik_pose = self.ik_chain.read_pose(store)?;
            let joint_target = store.global_transform(self.joint_target)?.translation;
            let effector = store.global_transform(self.effector)?;

            let solved =
                solve_two_bone_ik(&ik_pose, joint_target, &effector, lengths, &self.settings)?;
            self.last_flags = solved.flags;
            self.ik_chain.write_pose(store, &solved.pose)?;

            if self.blend_weight >= 1.0 {
                solved.pose
            } else {
                fk_pose.lerp(&solved.pose, self.blend_weight)
            }
        } else {
            fk_pose
        };

        self.result_chain.write_pose(store, &result)?;
        Ok(result)
    }
}
