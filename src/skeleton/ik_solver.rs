//! 双骨骼 IK 求解器 - 解析式实现
//!
//! 设计原则：
//! - 余弦定理直接求解，无迭代
//! - 参考长度缓存于绑定时，避免逐帧长度漂移
//! - 支持有界拉伸
//! - 退化输入（零距离、共线关节目标）走确定性回退，永不产生 NaN

use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::geometry::{aim_rotation, direction, perpendicular_direction, plane_normal};
use super::{BoneTransform, LimbPose};
use crate::config::get_config;
use crate::{Result, RigError};

// ============================================================================
// 求解配置
// ============================================================================

/// 每帧骨骼长度的来源
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LengthSource {
    /// 使用初始化时缓存的参考长度
    #[default]
    Reference,
    /// 从当前姿态实时读取（继承运行时缩放）
    LivePose,
}

/// 末端关节旋转的来源
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndRotationMode {
    /// 保持输入的末端旋转
    KeepOriginal,
    /// 取末端执行器的旋转
    #[default]
    FromEffector,
    /// 保持末端相对中间关节的旋转
    MaintainRelative,
}

/// 根/中间关节的扭转处理
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum TwistPolicy {
    /// 最短弧旋转，保留原有扭转
    #[default]
    Preserve,
    /// 丢弃扭转，由本地瞄准轴直接指向子关节重建旋转
    Remove { aim_axis: Vec3 },
}

/// 双骨骼 IK 求解配置
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoBoneIkSettings {
    /// 是否允许拉伸
    pub allow_stretch: bool,
    /// 达到总长的多少比例后开始拉伸
    pub start_stretch_ratio: f32,
    /// 最大拉伸倍数
    pub max_stretch_scale: f32,
    pub length_source: LengthSource,
    pub end_rotation: EndRotationMode,
    pub twist: TwistPolicy,
}

impl Default for TwoBoneIkSettings {
    fn default() -> Self {
        Self {
            allow_stretch: false,
            start_stretch_ratio: 1.0,
            max_stretch_scale: 1.2,
            length_source: LengthSource::Reference,
            end_rotation: EndRotationMode::FromEffector,
            twist: TwistPolicy::Preserve,
        }
    }
}

// ============================================================================
// 骨骼长度
// ============================================================================

/// 上下两段骨骼长度
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimbLengths {
    pub upper: f32,
    pub lower: f32,
}

impl LimbLengths {
    /// 创建并校验长度
    pub fn new(upper: f32, lower: f32) -> Result<Self> {
        let lengths = Self { upper, lower };
        lengths.validate()?;
        Ok(lengths)
    }

    /// 从姿态测量
    pub fn from_pose(pose: &LimbPose) -> Self {
        Self {
            upper: pose.upper_length(),
            lower: pose.lower_length(),
        }
    }

    /// 两段都必须为有限正数
    pub fn validate(&self) -> Result<()> {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if valid(self.upper) && valid(self.lower) {
            Ok(())
        } else {
            Err(RigError::InvalidChainLength {
                upper: self.upper,
                lower: self.lower,
            })
        }
    }

    #[inline]
    pub fn total(&self) -> f32 {
        self.upper + self.lower
    }
}

// ============================================================================
// 求解结果
// ============================================================================

bitflags! {
    /// 求解诊断标志
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SolveFlags: u8 {
        /// 目标距离超出可达范围，已夹取到最近可达点
        const REACH_CLAMPED = 1 << 0;
        /// 应用了拉伸
        const STRETCHED = 1 << 1;
        /// 关节目标与目标方向共线，使用了回退弯曲平面
        const DEGENERATE_BEND_PLANE = 1 << 2;
        /// 目标与根关节重合
        const ZERO_REACH = 1 << 3;
    }
}

/// IK 求解输出
#[derive(Clone, Copy, Debug)]
pub struct IkSolveOutput {
    pub pose: LimbPose,
    pub flags: SolveFlags,
    /// 实际应用的拉伸倍数（1.0 表示未拉伸）
    pub stretch_scale: f32,
    /// 求解使用的（夹取后）根到末端距离
    pub reach: f32,
}

// ============================================================================
// 求解
// ============================================================================

/// 解析式双骨骼 IK
///
/// `pose` 为当前 root/mid/end 变换，`joint_target` 为关节目标位置，
/// `effector` 的平移为期望末端位置、旋转按 `settings.end_rotation` 使用。
/// 仅在长度非法时返回错误；不可达与退化情况通过 [`SolveFlags`] 报告。
pub fn solve_two_bone_ik(
    pose: &LimbPose,
    joint_target: Vec3,
    effector: &BoneTransform,
    reference: LimbLengths,
    settings: &TwoBoneIkSettings,
) -> Result<IkSolveOutput> {
    let config = get_config();

    let lengths = match settings.length_source {
        LengthSource::Reference => reference,
        LengthSource::LivePose => LimbLengths::from_pose(pose),
    };
    lengths.validate()?;

    let mut flags = SolveFlags::empty();
    let mut upper = lengths.upper;
    let mut lower = lengths.lower;

    let root_pos = pose.root.translation;
    let desired_delta = effector.translation - root_pos;
    let desired_reach = desired_delta.length();

    let reach_dir = match direction(desired_delta) {
        Some(dir) => dir,
        None => {
            flags |= SolveFlags::ZERO_REACH;
            fallback_reach_direction(pose)
        }
    };

    // 拉伸
    let mut stretch_scale = 1.0;
    if settings.allow_stretch {
        let total = upper + lower;
        if desired_reach > total * settings.start_stretch_ratio {
            stretch_scale = (desired_reach / total).clamp(1.0, settings.max_stretch_scale.max(1.0));
            if stretch_scale > 1.0 {
                upper *= stretch_scale;
                lower *= stretch_scale;
                flags |= SolveFlags::STRETCHED;
            }
        }
    }

    // 三角形可行性夹取
    let max_reach = upper + lower;
    let min_reach = ((upper - lower).abs() + config.min_reach_epsilon).min(max_reach);
    let reach = desired_reach.clamp(min_reach, max_reach);
    if (reach - desired_reach).abs() > 1.0e-6 {
        flags |= SolveFlags::REACH_CLAMPED;
    }

    // 弯曲平面
    let to_target = joint_target - root_pos;
    let bend_dir = match plane_normal(reach_dir, to_target, config.degenerate_dot_threshold) {
        Some(normal) => normal.cross(reach_dir).normalize(),
        None => {
            flags |= SolveFlags::DEGENERATE_BEND_PLANE;
            fallback_bend_direction(pose, reach_dir)
        }
    };

    // 余弦定理：根关节处 root→mid 与 root→end 的夹角
    let cos_root = ((upper * upper + reach * reach - lower * lower) / (2.0 * upper * reach))
        .clamp(-1.0, 1.0);
    let sin_root = (1.0 - cos_root * cos_root).max(0.0).sqrt();

    let new_mid_pos = root_pos + reach_dir * (upper * cos_root) + bend_dir * (upper * sin_root);
    let new_end_pos = root_pos + reach_dir * reach;

    let root_rotation = reaim_rotation(
        pose.root.rotation,
        pose.mid.translation - root_pos,
        new_mid_pos - root_pos,
        settings.twist,
    );
    let mid_rotation = reaim_rotation(
        pose.mid.rotation,
        pose.end.translation - pose.mid.translation,
        new_end_pos - new_mid_pos,
        settings.twist,
    );
    let end_rotation = match settings.end_rotation {
        EndRotationMode::KeepOriginal => pose.end.rotation,
        EndRotationMode::FromEffector => effector.rotation,
        EndRotationMode::MaintainRelative => {
            (mid_rotation * (pose.mid.rotation.inverse() * pose.end.rotation)).normalize()
        }
    };

    if config.debug_log {
        log::debug!(
            "[IK] 双骨骼求解: reach={:.4} (期望 {:.4}), stretch={:.3}, flags={:?}",
            reach, desired_reach, stretch_scale, flags
        );
    }

    Ok(IkSolveOutput {
        pose: LimbPose {
            root: BoneTransform { rotation: root_rotation, ..pose.root },
            mid: BoneTransform {
                translation: new_mid_pos,
                rotation: mid_rotation,
                ..pose.mid
            },
            end: BoneTransform {
                translation: new_end_pos,
                rotation: end_rotation,
                ..pose.end
            },
        },
        flags,
        stretch_scale,
        reach,
    })
}

/// 目标与根重合时的求解方向：当前 root→end，其次 root→mid，最后 +X
fn fallback_reach_direction(pose: &LimbPose) -> Vec3 {
    let root = pose.root.translation;
    direction(pose.end.translation - root)
        .or_else(|| direction(pose.mid.translation - root))
        .unwrap_or(Vec3::X)
}

/// 关节目标无法确定平面时：沿用当前链条的弯曲方向，链条伸直则取固定正交轴
fn fallback_bend_direction(pose: &LimbPose, reach_dir: Vec3) -> Vec3 {
    perpendicular_direction(pose.mid.translation - pose.root.translation, reach_dir)
        .unwrap_or_else(|| reach_dir.any_orthonormal_vector())
}

/// 重新瞄准骨骼：旋转跟随骨骼方向从 `old_dir` 变为 `new_dir`
fn reaim_rotation(rotation: Quat, old_dir: Vec3, new_dir: Vec3, twist: TwistPolicy) -> Quat {
    let Some(new_dir) = direction(new_dir) else {
        return rotation;
    };
    match twist {
        TwistPolicy::Preserve => match direction(old_dir) {
            Some(old_dir) => (Quat::from_rotation_arc(old_dir, new_dir) * rotation).normalize(),
            None => rotation,
        },
        TwistPolicy::Remove { aim_axis } => match direction(aim_axis) {
            Some(axis) => aim_rotation(axis, new_dir),
            None => rotation,
        },
    }
}

// ============================================================================
// 求解器
// ============================================================================

/// 持有参考长度与配置的双骨骼 IK 求解器
#[derive(Clone, Debug)]
pub struct TwoBoneIkSolver {
    /// 参考长度
    pub lengths: LimbLengths,
    /// 求解配置
    pub settings: TwoBoneIkSettings,
}

impl TwoBoneIkSolver {
    /// 创建求解器，长度非法时失败
    pub fn new(upper: f32, lower: f32, settings: TwoBoneIkSettings) -> Result<Self> {
        Ok(Self {
            lengths: LimbLengths::new(upper, lower)?,
            settings,
        })
    }

    /// 以绑定姿态的实际长度创建求解器
    pub fn from_bind_pose(pose: &LimbPose, settings: TwoBoneIkSettings) -> Result<Self> {
        let lengths = LimbLengths::from_pose(pose);
        Self::new(lengths.upper, lengths.lower, settings)
    }

    /// 求解到期望末端位置，末端执行器旋转取输入末端旋转
    pub fn solve(
        &self,
        root: BoneTransform,
        mid: BoneTransform,
        end: BoneTransform,
        joint_target_pos: Vec3,
        desired_end_pos: Vec3,
    ) -> Result<IkSolveOutput> {
        let pose = LimbPose::new(root, mid, end);
        let effector = BoneTransform {
            translation: desired_end_pos,
            ..end
        };
        solve_two_bone_ik(&pose, joint_target_pos, &effector, self.lengths, &self.settings)
    }
}
