use std::ops::Range;

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::Serialize;

use super::keypoint::Pose;
use crate::error::{KinematicsError, Result};

/// フレーム × 関節 × 座標 のキーポイント時系列
///
/// - 全フレームで関節名とその順序は同じ
/// - 座標次元 (2 or 3) は生成時に固定
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    joints: Vec<String>,
    /// [frame, joint, coord]
    positions: Array3<f64>,
    /// [frame, joint]
    confidence: Array2<f64>,
}

fn check_dims(dims: usize) -> Result<()> {
    if dims == 2 || dims == 3 {
        Ok(())
    } else {
        Err(KinematicsError::shape("2 or 3 coordinates", format!("{} coordinates", dims)))
    }
}

/// NaN や無限大の座標は受け付けない
fn check_finite(joints: &[String], frame: usize, positions: ArrayView2<'_, f64>) -> Result<()> {
    for (name, row) in joints.iter().zip(positions.rows()) {
        if !row.iter().all(|v| v.is_finite()) {
            return Err(KinematicsError::NonFiniteCoordinate {
                joint: name.clone(),
                frame,
            });
        }
    }
    Ok(())
}

fn check_confidence(joints: &[String], confidence: ArrayView1<'_, f64>) -> Result<()> {
    for (name, &value) in joints.iter().zip(confidence.iter()) {
        if !(0.0..=1.0).contains(&value) {
            return Err(KinematicsError::InvalidConfidence {
                joint: name.clone(),
                value,
            });
        }
    }
    Ok(())
}

impl Trajectory {
    /// 空のトラジェクトリ（ストリーミング追加用）
    pub fn new(joints: Vec<String>, dims: usize) -> Result<Self> {
        check_dims(dims)?;
        let n = joints.len();
        Ok(Self {
            joints,
            positions: Array3::zeros((0, n, dims)),
            confidence: Array2::zeros((0, n)),
        })
    }

    /// 配列から一括生成
    pub fn from_arrays(
        joints: Vec<String>,
        positions: Array3<f64>,
        confidence: Array2<f64>,
    ) -> Result<Self> {
        let (frames, n, dims) = positions.dim();
        check_dims(dims)?;
        if n != joints.len() {
            return Err(KinematicsError::shape(
                format!("{} joints", joints.len()),
                format!("{} joints", n),
            ));
        }
        if confidence.dim() != (frames, n) {
            return Err(KinematicsError::shape(
                format!("confidence [{}, {}]", frames, n),
                format!("confidence {:?}", confidence.shape()),
            ));
        }
        for (frame, p) in positions.axis_iter(Axis(0)).enumerate() {
            check_finite(&joints, frame, p)?;
        }
        for row in confidence.rows() {
            check_confidence(&joints, row)?;
        }
        Ok(Self {
            joints,
            positions,
            confidence,
        })
    }

    /// 信頼度 1.0 で位置だけから生成
    pub fn from_positions(joints: Vec<String>, positions: Array3<f64>) -> Result<Self> {
        let (frames, n, _) = positions.dim();
        Self::from_arrays(joints, positions, Array2::ones((frames, n)))
    }

    /// 1フレーム追加
    pub fn push_frame(
        &mut self,
        positions: ArrayView2<'_, f64>,
        confidence: ArrayView1<'_, f64>,
    ) -> Result<()> {
        let expected = (self.joint_count(), self.dims());
        if positions.dim() != expected {
            return Err(KinematicsError::shape(
                format!("frame [{}, {}]", expected.0, expected.1),
                format!("frame {:?}", positions.shape()),
            ));
        }
        if confidence.len() != expected.0 {
            return Err(KinematicsError::shape(
                format!("{} confidences", expected.0),
                format!("{} confidences", confidence.len()),
            ));
        }
        check_finite(&self.joints, self.len(), positions)?;
        check_confidence(&self.joints, confidence)?;

        self.positions
            .push(Axis(0), positions)
            .map_err(|e| KinematicsError::shape("appendable frame", e.to_string()))?;
        self.confidence
            .push(Axis(0), confidence)
            .map_err(|e| KinematicsError::shape("appendable confidence", e.to_string()))?;
        Ok(())
    }

    /// 検出結果 1 フレームを追加。関節名と順序が一致しなければ失敗
    pub fn push_pose(&mut self, pose: &Pose) -> Result<()> {
        if pose.keypoints.len() != self.joint_count() {
            return Err(KinematicsError::shape(
                format!("{} keypoints", self.joint_count()),
                format!("{} keypoints", pose.keypoints.len()),
            ));
        }
        let dims = self.dims();
        let mut positions = Array2::zeros((self.joint_count(), dims));
        let mut confidence = Array1::zeros(self.joint_count());

        for (j, (kp, name)) in pose.keypoints.iter().zip(&self.joints).enumerate() {
            if &kp.name != name {
                return Err(KinematicsError::shape(
                    format!("joint {} at index {}", name, j),
                    format!("joint {}", kp.name),
                ));
            }
            if kp.dims() != dims {
                return Err(KinematicsError::shape(
                    format!("{}D keypoint", dims),
                    format!("{}D keypoint {}", kp.dims(), kp.name),
                ));
            }
            for (c, v) in kp.coords().enumerate() {
                positions[[j, c]] = v;
            }
            confidence[j] = kp.confidence;
        }

        self.push_frame(positions.view(), confidence.view())
    }

    pub fn len(&self) -> usize {
        self.positions.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn dims(&self) -> usize {
        self.positions.len_of(Axis(2))
    }

    pub fn joints(&self) -> &[String] {
        &self.joints
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j == name)
    }

    /// 1関節の全時系列 [frame, coord]
    pub fn joint_series(&self, joint: usize) -> Option<ArrayView2<'_, f64>> {
        (joint < self.joint_count()).then(|| self.positions.index_axis(Axis(1), joint))
    }

    /// 1フレーム分 [joint, coord]
    pub fn frame(&self, index: usize) -> Option<ArrayView2<'_, f64>> {
        (index < self.len()).then(|| self.positions.index_axis(Axis(0), index))
    }

    pub fn frame_confidence(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        (index < self.len()).then(|| self.confidence.index_axis(Axis(0), index))
    }

    /// フレームを [start, end) に制限したビュー
    pub fn slice(&self, range: Range<usize>) -> Result<TrajectoryView<'_>> {
        if range.start > range.end || range.end > self.len() {
            return Err(KinematicsError::too_short("slice", range.end, self.len()));
        }
        Ok(TrajectoryView {
            joints: &self.joints,
            positions: self.positions.slice(s![range.clone(), .., ..]),
            confidence: self.confidence.slice(s![range, ..]),
        })
    }

    pub fn positions(&self) -> ArrayView3<'_, f64> {
        self.positions.view()
    }

    pub fn confidence(&self) -> ArrayView2<'_, f64> {
        self.confidence.view()
    }

    pub fn into_parts(self) -> (Vec<String>, Array3<f64>, Array2<f64>) {
        (self.joints, self.positions, self.confidence)
    }
}

/// フレーム範囲を切り出した借用ビュー
#[derive(Debug, Clone)]
pub struct TrajectoryView<'a> {
    joints: &'a [String],
    positions: ArrayView3<'a, f64>,
    confidence: ArrayView2<'a, f64>,
}

impl<'a> TrajectoryView<'a> {
    pub fn len(&self) -> usize {
        self.positions.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn joints(&self) -> &'a [String] {
        self.joints
    }

    pub fn positions(&self) -> ArrayView3<'a, f64> {
        self.positions.clone()
    }

    pub fn confidence(&self) -> ArrayView2<'a, f64> {
        self.confidence.clone()
    }

    pub fn to_owned(&self) -> Trajectory {
        Trajectory {
            joints: self.joints.to_vec(),
            positions: self.positions.to_owned(),
            confidence: self.confidence.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("j{}", i)).collect()
    }

    #[test]
    fn test_streaming_append() {
        let mut t = Trajectory::new(names(2), 3).unwrap();
        assert!(t.is_empty());
        t.push_frame(array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]].view(), array![1.0, 0.5].view())
            .unwrap();
        t.push_frame(array![[1.0, 0.0, 0.0], [2.0, 1.0, 1.0]].view(), array![1.0, 0.5].view())
            .unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.joint_count(), 2);
        assert_eq!(t.dims(), 3);
        assert_eq!(t.frame(1).unwrap(), array![[1.0, 0.0, 0.0], [2.0, 1.0, 1.0]]);
        assert_eq!(t.joint_series(0).unwrap(), array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        assert_eq!(t.frame_confidence(0).unwrap(), array![1.0, 0.5]);
        assert!(t.frame(2).is_none());
        assert!(t.joint_series(2).is_none());
    }

    #[test]
    fn test_append_rejects_wrong_shape() {
        let mut t = Trajectory::new(names(2), 2).unwrap();
        let err = t
            .push_frame(array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]].view(), array![1.0, 1.0].view())
            .unwrap_err();
        assert!(matches!(err, KinematicsError::ShapeMismatch { .. }));

        let err = t
            .push_frame(array![[0.0, 0.0]].view(), array![1.0].view())
            .unwrap_err();
        assert!(matches!(err, KinematicsError::ShapeMismatch { .. }));
        assert!(t.is_empty());
    }

    #[test]
    fn test_invalid_dims() {
        assert!(matches!(
            Trajectory::new(names(1), 4),
            Err(KinematicsError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_confidence_out_of_range() {
        let mut t = Trajectory::new(names(1), 2).unwrap();
        let err = t.push_frame(array![[0.0, 0.0]].view(), array![1.5].view()).unwrap_err();
        assert_eq!(
            err,
            KinematicsError::InvalidConfidence {
                joint: "j0".to_string(),
                value: 1.5
            }
        );
    }

    #[test]
    fn test_push_pose() {
        let mut t = Trajectory::new(vec!["a".into(), "b".into()], 2).unwrap();
        let pose = Pose::new(vec![
            Keypoint::new("a", 1.0, 2.0, 0.9),
            Keypoint::new("b", 3.0, 4.0, 0.8),
        ]);
        t.push_pose(&pose).unwrap();
        assert_eq!(t.frame(0).unwrap(), array![[1.0, 2.0], [3.0, 4.0]]);

        // 順序違い
        let swapped = Pose::new(vec![
            Keypoint::new("b", 1.0, 2.0, 0.9),
            Keypoint::new("a", 3.0, 4.0, 0.8),
        ]);
        assert!(matches!(t.push_pose(&swapped), Err(KinematicsError::ShapeMismatch { .. })));

        // 次元違い
        let deep = Pose::new(vec![
            Keypoint::new_3d("a", 1.0, 2.0, 0.0, 0.9),
            Keypoint::new_3d("b", 3.0, 4.0, 0.0, 0.8),
        ]);
        assert!(matches!(t.push_pose(&deep), Err(KinematicsError::ShapeMismatch { .. })));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_from_arrays_shape_checks() {
        let positions = Array3::<f64>::zeros((4, 2, 3));
        let build = |joints: usize, confidence: Array2<f64>| {
            Trajectory::from_arrays(names(joints), positions.clone(), confidence)
        };
        assert!(build(2, Array2::ones((4, 2))).is_ok());
        assert!(build(3, Array2::ones((4, 2))).is_err());
        assert!(build(2, Array2::ones((3, 2))).is_err());
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        let mut positions = Array3::<f64>::zeros((3, 2, 3));
        positions[[1, 1, 0]] = f64::NAN;
        assert_eq!(
            Trajectory::from_positions(names(2), positions).unwrap_err(),
            KinematicsError::NonFiniteCoordinate {
                joint: "j1".to_string(),
                frame: 1
            }
        );

        let mut t = Trajectory::new(names(1), 2).unwrap();
        t.push_frame(array![[0.0, 0.0]].view(), array![1.0].view()).unwrap();
        let err = t
            .push_frame(array![[f64::INFINITY, 0.0]].view(), array![1.0].view())
            .unwrap_err();
        assert_eq!(
            err,
            KinematicsError::NonFiniteCoordinate {
                joint: "j0".to_string(),
                frame: 1
            }
        );
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_slice() {
        let mut positions = Array3::<f64>::zeros((5, 1, 2));
        for f in 0..5 {
            positions[[f, 0, 0]] = f as f64;
        }
        let t = Trajectory::from_positions(names(1), positions).unwrap();
        let view = t.slice(1..4).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.positions()[[0, 0, 0]], 1.0);
        let owned = view.to_owned();
        assert_eq!(owned.len(), 3);
        assert_eq!(owned.joints(), t.joints());

        assert!(t.slice(2..2).unwrap().is_empty());
        assert!(t.slice(3..6).is_err());
    }
}
