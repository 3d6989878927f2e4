use ndarray::{ArrayView1, Axis};
use serde::Serialize;

use super::skeleton::{JointConnection, Skeleton};
use crate::error::{KinematicsError, Result};
use crate::pose::Trajectory;

/// これ未満のノルムはゼロ長ベクトルとみなす
pub const DEGENERATE_EPSILON: f64 = 1e-9;

/// 1接続ぶんの関節角度時系列（度）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointAngleSeries {
    pub connection: JointConnection,
    pub degrees: Vec<f64>,
}

impl JointAngleSeries {
    pub fn id(&self) -> String {
        self.connection.id()
    }
}

/// 2ベクトルのなす角（度, 0〜180）。どちらかがゼロ長か NaN を含めば None
pub fn angle_between(v1: ArrayView1<f64>, v2: ArrayView1<f64>) -> Option<f64> {
    let n1 = v1.dot(&v1).sqrt();
    let n2 = v2.dot(&v2).sqrt();
    if !(n1 >= DEGENERATE_EPSILON && n2 >= DEGENERATE_EPSILON && (n1 * n2).is_finite()) {
        return None;
    }
    // 丸め誤差で acos の定義域を外れないように
    let cos = (v1.dot(&v2) / (n1 * n2)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

/// 接続ごとの関節角度
///
/// (j1, j2) について v1 = p[j1] - p[j2], v2 = p[j2] - p[j1] のなす角。
/// 2点だけで定義しているので、ベクトルは常に反平行で値は 180° になる。
pub fn compute_joint_angles(
    trajectory: &Trajectory,
    skeleton: &Skeleton,
) -> Result<Vec<JointAngleSeries>> {
    let pairs = skeleton.resolve(trajectory.joints())?;
    let positions = trajectory.positions();

    skeleton
        .connections()
        .iter()
        .zip(pairs)
        .map(|(connection, (j1, j2))| {
            let degrees = positions
                .axis_iter(Axis(0))
                .enumerate()
                .map(|(frame, p)| {
                    let v1 = &p.row(j1) - &p.row(j2);
                    let v2 = &p.row(j2) - &p.row(j1);
                    angle_between(v1.view(), v2.view()).ok_or_else(|| {
                        KinematicsError::DegenerateVector {
                            connection: connection.id(),
                            frame,
                        }
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            Ok(JointAngleSeries {
                connection: connection.clone(),
                degrees,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn two_joint_trajectory(frames: &[([f64; 3], [f64; 3])]) -> Trajectory {
        let positions = Array3::from_shape_fn((frames.len(), 2, 3), |(f, j, c)| {
            if j == 0 {
                frames[f].0[c]
            } else {
                frames[f].1[c]
            }
        });
        Trajectory::from_positions(vec!["shoulder".into(), "elbow".into()], positions).unwrap()
    }

    fn arm() -> Skeleton {
        Skeleton::new(vec![JointConnection::new("shoulder", "elbow")])
    }

    #[test]
    fn test_opposite_unit_vectors() {
        let angle =
            angle_between(array![1.0, 0.0, 0.0].view(), array![-1.0, 0.0, 0.0].view()).unwrap();
        assert!((angle - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_between_basic() {
        let right =
            angle_between(array![1.0, 0.0, 0.0].view(), array![0.0, 2.0, 0.0].view()).unwrap();
        assert!((right - 90.0).abs() < 1e-9);
        let same = angle_between(array![1.0, 1.0].view(), array![2.0, 2.0].view()).unwrap();
        assert!(same.abs() < 1e-4);
        assert!(angle_between(array![0.0, 0.0].view(), array![1.0, 0.0].view()).is_none());
    }

    #[test]
    fn test_nan_vector_has_no_angle() {
        let nan = array![f64::NAN, 0.0, 0.0];
        let unit = array![1.0, 0.0, 0.0];
        assert!(angle_between(nan.view(), unit.view()).is_none());
        assert!(angle_between(unit.view(), nan.view()).is_none());
        let inf = array![f64::INFINITY, 0.0, 0.0];
        assert!(angle_between(inf.view(), unit.view()).is_none());
    }

    #[test]
    fn test_two_point_angle_is_always_straight() {
        let t = two_joint_trajectory(&[
            ([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]),
            ([0.3, 1.2, -0.5], [2.0, -1.0, 4.0]),
        ]);
        let angles = compute_joint_angles(&t, &arm()).unwrap();
        assert_eq!(angles.len(), 1);
        assert_eq!(angles[0].id(), "shoulder_elbow");
        assert_eq!(angles[0].degrees.len(), 2);
        for d in &angles[0].degrees {
            assert!((d - 180.0).abs() < 1e-4, "got {}", d);
        }
    }

    #[test]
    fn test_coincident_joints_are_degenerate() {
        let t = two_joint_trajectory(&[
            ([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]),
            ([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]),
        ]);
        let err = compute_joint_angles(&t, &arm()).unwrap_err();
        assert_eq!(
            err,
            KinematicsError::DegenerateVector {
                connection: "shoulder_elbow".to_string(),
                frame: 1
            }
        );
    }

    #[test]
    fn test_unknown_joint() {
        let t = two_joint_trajectory(&[([0.0, 0.0, 0.0], [1.0, 0.0, 0.0])]);
        let skeleton = Skeleton::new(vec![JointConnection::new("shoulder", "wrist")]);
        assert_eq!(
            compute_joint_angles(&t, &skeleton).unwrap_err(),
            KinematicsError::UnknownJoint("wrist".to_string())
        );
    }
}
