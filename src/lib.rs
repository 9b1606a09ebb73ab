//! Limb Rig - 双骨骼 IK 肢体求解与 FK/IK 混合控制
//!
//! 提供与宿主引擎无关的角色肢体绑定核心：
//! - 解析式双骨骼 IK（关节目标、末端执行器、可选拉伸）
//! - 每肢体 FK/IK 混合状态机（UseWeight / SwitchToFK / SwitchToIK）
//! - 模式切换时的关节目标重建（弯曲平面几何）
//! - 骨骼层级存储与绑定构建器
//! - 混合权重关键帧轨道

pub mod animation;
pub mod config;
pub mod rig;
pub mod skeleton;

pub use animation::{BezierCurve, BezierCurveCache, LimbWeightTrack};
pub use config::RigConfig;
pub use rig::{HumanRig, IkSpaceMode, LimbChain, LimbControl, LimbParameter, RigBuilder};
pub use skeleton::{BoneSet, BoneTransform, JointId, JointStore, TwoBoneIkSettings, TwoBoneIkSolver};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RigError {
    #[error("Invalid chain length: upper={upper}, lower={lower}")]
    InvalidChainLength { upper: f32, lower: f32 },

    #[error("Unknown joint: {0}")]
    UnknownJoint(JointId),

    #[error("Unknown limb: {0}")]
    UnknownLimb(String),

    #[error("Duplicate limb name: {0}")]
    DuplicateLimb(String),

    #[error("Limb '{0}' is not initialized")]
    NotInitialized(String),

    #[error("Duplicate joint name: {0}")]
    DuplicateJoint(String),
}

pub type Result<T> = std::result::Result<T, RigError>;
