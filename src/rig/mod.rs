//! 肢体绑定模块

mod builder;
mod human_rig;
mod limb_control;

pub use builder::{LimbSide, RigBuilder, ARM_BEND_HINT, LEG_BEND_HINT};
pub use human_rig::{evaluate_rigs, HumanRig, LimbEvaluation, RigEvaluation};
pub use limb_control::{
    IkSpaceMode, LimbChain, LimbControl, LimbParameter, LimbParameterKind, SwitchOutcome,
};
