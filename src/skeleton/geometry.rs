//! 弯曲平面几何
//!
//! IK 求解与 FK→IK 切换共用的平面/法线计算。

use glam::{Quat, Vec3};

/// 方向向量长度平方低于此值视为零向量
pub const DIRECTION_EPSILON_SQ: f32 = 1.0e-10;

/// 归一化，零向量返回 None
#[inline]
pub fn direction(v: Vec3) -> Option<Vec3> {
    if v.length_squared() < DIRECTION_EPSILON_SQ {
        None
    } else {
        Some(v.normalize())
    }
}

/// 两个单位方向是否（近似）共线
#[inline]
pub fn is_colinear(a: Vec3, b: Vec3, dot_threshold: f32) -> bool {
    a.dot(b).abs() >= dot_threshold
}

/// 由两个方向确定的平面法线 `a × b`
///
/// 方向共线或退化时返回 None。
pub fn plane_normal(a: Vec3, b: Vec3, dot_threshold: f32) -> Option<Vec3> {
    let a = direction(a)?;
    let b = direction(b)?;
    if is_colinear(a, b, dot_threshold) {
        return None;
    }
    direction(a.cross(b))
}

/// `v` 垂直于单位轴 `axis` 的分量（归一化）
pub fn perpendicular_direction(v: Vec3, axis: Vec3) -> Option<Vec3> {
    direction(v - axis * v.dot(axis))
}

/// FK→IK 切换时重建的关节目标
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointTargetPlacement {
    /// 关节目标位置
    pub position: Vec3,
    /// 链条是否共线（位置退化为中间关节）
    pub degenerate: bool,
}

/// 从当前姿态推导关节目标，使 IK 求解能复现该姿态
///
/// 关节目标位于弯曲平面内、中间关节外侧 `distance` 处。
/// 链条伸直时无法确定平面，返回中间关节位置并标记退化。
pub fn joint_target_from_pose(
    root: Vec3,
    mid: Vec3,
    end: Vec3,
    distance: f32,
    dot_threshold: f32,
) -> JointTargetPlacement {
    let degenerate = JointTargetPlacement { position: mid, degenerate: true };

    let (Some(base), Some(to_mid)) = (direction(end - root), direction(mid - root)) else {
        return degenerate;
    };
    if is_colinear(base, to_mid, dot_threshold) {
        return degenerate;
    }
    let Some(up) = direction(base.cross(to_mid)) else {
        return degenerate;
    };

    let mut bend = base.cross(up);
    if bend.dot(to_mid) < 0.0 {
        bend = -bend;
    }

    JointTargetPlacement {
        position: mid + bend * distance,
        degenerate: false,
    }
}

/// 使 `aim_axis` 指向 `dir` 的无扭转旋转
#[inline]
pub fn aim_rotation(aim_axis: Vec3, dir: Vec3) -> Quat {
    Quat::from_rotation_arc(aim_axis.normalize(), dir.normalize())
}
