//! 肢体绑定演示
//!
//! 构建一条手臂，用权重轨道从 FK 过渡到 IK，移动末端执行器，
//! 再切回 FK，每帧打印手腕位置和求解标志。

use glam::Vec3;
use limb_rig::animation::{BezierCurveCache, Easing, LimbWeightTrack, WeightKeyframe};
use limb_rig::rig::{IkSpaceMode, LimbSide};
use limb_rig::skeleton::SolveFlags;
use limb_rig::{BoneTransform, JointStore, RigBuilder, RigError};

const FRAME_COUNT: u32 = 60;

fn main() -> Result<(), RigError> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut builder = RigBuilder::new("demo");
    let chest = builder.add_joint(
        "chest",
        None,
        BoneTransform::from_translation(Vec3::new(0.0, 1.4, 0.0)),
    )?;
    let shoulder = builder.add_joint(
        "shoulder_l",
        Some(chest),
        BoneTransform::from_translation(Vec3::new(0.2, 1.4, 0.0)),
    )?;
    let elbow = builder.add_joint(
        "elbow_l",
        Some(shoulder),
        BoneTransform::from_translation(Vec3::new(0.48, 1.4, -0.02)),
    )?;
    let wrist = builder.add_joint(
        "wrist_l",
        Some(elbow),
        BoneTransform::from_translation(Vec3::new(0.74, 1.4, 0.0)),
    )?;
    let arm = builder.add_arm(LimbSide::Left, shoulder, elbow, wrist)?;
    let mut rig = builder.build()?;

    log::info!("=== Limb Rig Demo ===");
    log::info!(
        "绑定 '{}'：{} 个关节，{} 个肢体",
        rig.name,
        rig.hierarchy().bone_count(),
        rig.limbs().len()
    );

    let mut track = LimbWeightTrack::new(arm.clone());
    track.insert_keyframe(WeightKeyframe::new(0, 0.0));
    track.insert_keyframe(WeightKeyframe::new(20, 1.0).with_easing(Easing::EASE_IN_OUT));
    track.insert_keyframe(
        WeightKeyframe::new(45, 1.0).with_space_mode(IkSpaceMode::SwitchToFK),
    );

    let curves = BezierCurveCache::new();
    let effector = rig
        .limb(&arm)
        .map(|l| l.effector)
        .ok_or_else(|| RigError::UnknownLimb(arm.clone()))?;
    let rest = rig.hierarchy().global_transform(effector)?;

    for frame in 0..FRAME_COUNT {
        track.apply(&mut rig, frame, &curves)?;

        // 执行器画圈，部分帧超出手臂长度
        let phase = frame as f32 / FRAME_COUNT as f32 * std::f32::consts::TAU;
        let offset = Vec3::new(phase.cos() * 0.15 - 0.1, phase.sin() * 0.3, 0.1);
        rig.hierarchy_mut().set_global_transform(
            effector,
            BoneTransform::from_rotation_translation(rest.rotation, rest.translation + offset),
        )?;

        let report = rig.evaluate();
        for limb in &report.limbs {
            match (&limb.pose, &limb.error) {
                (Some(pose), _) => {
                    let mut notes = Vec::new();
                    if limb.flags.contains(SolveFlags::REACH_CLAMPED) {
                        notes.push("clamped");
                    }
                    if limb.flags.contains(SolveFlags::DEGENERATE_BEND_PLANE) {
                        notes.push("degenerate");
                    }
                    let weight = rig.limb(&limb.name).map(|l| l.blend_weight()).unwrap_or(0.0);
                    log::info!(
                        "frame {:>2} {} w={:.2} wrist=({:.3}, {:.3}, {:.3}) {}",
                        frame,
                        limb.name,
                        weight,
                        pose.end.translation.x,
                        pose.end.translation.y,
                        pose.end.translation.z,
                        notes.join(" ")
                    );
                }
                (None, Some(err)) => log::warn!("frame {:>2} {} 失败: {}", frame, limb.name, err),
                (None, None) => {}
            }
        }
    }

    log::info!("曲线缓存: {} 条", curves.len());
    Ok(())
}
