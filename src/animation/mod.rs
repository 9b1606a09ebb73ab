//! 动画模块 - 肢体权重关键帧

mod bezier_curve;
mod weight_track;

pub use bezier_curve::{
    BezierCurve, BezierCurveCache, BezierCurveFactory, Curve, Easing, DEFAULT_INTERVAL,
};
pub use weight_track::{LimbWeightTrack, WeightKeyframe, WeightSample};
