pub mod angles;
pub mod derivative;
pub mod skeleton;

use ndarray::Array3;
use serde::Serialize;

use crate::error::{check_frame_rate, KinematicsError, Result};
use crate::pose::Trajectory;

pub use angles::{angle_between, compute_joint_angles, JointAngleSeries, DEGENERATE_EPSILON};
pub use derivative::{compute_acceleration, compute_velocity};
pub use skeleton::{JointConnection, Skeleton};

/// 3D トラジェクトリから求めたキネマティクス一式
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kinematics {
    pub joint_angles: Vec<JointAngleSeries>,
    /// [frame-1, joint, coord]
    pub velocity: Array3<f64>,
    /// [frame-2, joint, coord]
    pub acceleration: Array3<f64>,
}

impl Kinematics {
    /// 角度・速度・加速度をまとめて計算。3 フレーム以上必要
    pub fn from_trajectory(trajectory: &Trajectory, skeleton: &Skeleton, fps: f64) -> Result<Self> {
        check_frame_rate(fps)?;
        if trajectory.len() < 3 {
            return Err(KinematicsError::too_short("kinematics", 3, trajectory.len()));
        }

        let joint_angles = compute_joint_angles(trajectory, skeleton)?;
        let velocity = compute_velocity(trajectory.positions(), fps)?;
        let acceleration = compute_acceleration(velocity.view(), fps)?;

        Ok(Self {
            joint_angles,
            velocity,
            acceleration,
        })
    }

    pub fn angles_for(&self, id: &str) -> Option<&[f64]> {
        self.joint_angles
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.degrees.as_slice())
    }
}
