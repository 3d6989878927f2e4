use ndarray::{s, Array3, ArrayView3, Axis};

use crate::error::{check_frame_rate, KinematicsError, Result};

/// 前進差分による速度 [frame-1, joint, coord]
///
/// `v[t] = (p[t+1] - p[t]) * fps`
pub fn compute_velocity(positions: ArrayView3<f64>, fps: f64) -> Result<Array3<f64>> {
    check_frame_rate(fps)?;
    let frames = positions.len_of(Axis(0));
    if frames < 2 {
        return Err(KinematicsError::too_short("velocity", 2, frames));
    }
    let next = positions.slice(s![1.., .., ..]);
    let prev = positions.slice(s![..-1, .., ..]);
    Ok((&next - &prev) * fps)
}

/// 速度系列の前進差分 [frame-1, joint, coord]（位置からは 2 フレーム減る）
pub fn compute_acceleration(velocity: ArrayView3<f64>, fps: f64) -> Result<Array3<f64>> {
    compute_velocity(velocity, fps).map_err(|e| match e {
        KinematicsError::InsufficientFrames { actual, .. } => {
            KinematicsError::too_short("acceleration", 2, actual)
        }
        other => other,
    })
}
