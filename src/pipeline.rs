//! Runs acquisition → filtering → lifting → kinematics → output for one
//! recording.
//!
//! Detector, lifter and sink are external collaborators. They are moved into
//! [`Pipeline::run`] and dropped when it returns, whether the run succeeded
//! or not.

use std::fmt;

use ndarray::Array3;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::KinematicsError;
use crate::filter::{Alignment, FilterStrategy, TemporalFilter};
use crate::kinematics::{JointAngleSeries, Kinematics, Skeleton};
use crate::pose::{PoseLifter, PoseSource, Trajectory};

/// 解析結果の受け取り先（保存・可視化は外部の責務）
pub trait ResultSink {
    fn write(&mut self, analysis: &Analysis) -> anyhow::Result<()>;
}

impl<T: ResultSink + ?Sized> ResultSink for &mut T {
    fn write(&mut self, analysis: &Analysis) -> anyhow::Result<()> {
        (**self).write(analysis)
    }
}

/// 1 回の実行の完全な結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub fps: f64,
    /// 検出なしで捨てたフレーム数
    pub dropped_frames: usize,
    pub filter: &'static str,
    pub alignment: Alignment,
    /// フィルタ後の 2D キーポイント
    pub filtered: Trajectory,
    /// リフト後の 3D キーポイント
    pub keypoints_3d: Trajectory,
    pub joint_angles: Vec<JointAngleSeries>,
    pub velocity: Array3<f64>,
    pub acceleration: Array3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquisition,
    Filtering,
    Lifting,
    Kinematics,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Acquisition => "acquisition",
            Stage::Filtering => "filtering",
            Stage::Lifting => "lifting",
            Stage::Kinematics => "kinematics",
            Stage::Output => "output",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("acquisition failed: {0:#}")]
    Acquisition(anyhow::Error),

    #[error("acquisition failed: {0}")]
    Frames(#[source] KinematicsError),

    #[error("acquisition produced no usable frames")]
    NoFrames,

    #[error("filtering failed: {0}")]
    Filter(#[source] KinematicsError),

    #[error("lifting failed: {0:#}")]
    Lifting(anyhow::Error),

    #[error("lifter returned an invalid trajectory: {0}")]
    Lifted(#[source] KinematicsError),

    #[error("kinematics failed: {0}")]
    Kinematics(#[source] KinematicsError),

    #[error("writing results failed: {0:#}")]
    Output(anyhow::Error),
}

impl PipelineError {
    /// 失敗した段
    pub fn stage(&self) -> Stage {
        match self {
            Self::Acquisition(_) | Self::Frames(_) | Self::NoFrames => Stage::Acquisition,
            Self::Filter(_) => Stage::Filtering,
            Self::Lifting(_) | Self::Lifted(_) => Stage::Lifting,
            Self::Kinematics(_) => Stage::Kinematics,
            Self::Output(_) => Stage::Output,
        }
    }

    /// コア側の不変条件違反なら、その内容
    pub fn invariant(&self) -> Option<&KinematicsError> {
        match self {
            Self::Frames(e) | Self::Filter(e) | Self::Lifted(e) | Self::Kinematics(e) => Some(e),
            _ => None,
        }
    }
}

pub struct Pipeline {
    config: Config,
    skeleton: Skeleton,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let skeleton = config.skeleton.to_skeleton();
        Self { config, skeleton }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// 1 本の入力を最後まで処理する。失敗時は sink に何も書かない
    pub fn run<S, L, W>(
        &self,
        mut source: S,
        mut lifter: L,
        mut sink: W,
    ) -> Result<Analysis, PipelineError>
    where
        S: PoseSource,
        L: PoseLifter,
        W: ResultSink,
    {
        let fps = source.fps();
        let (raw, dropped_frames) = self.acquire(&mut source)?;
        info!(frames = raw.len(), dropped_frames, fps, "acquired keypoints");

        let strategy =
            FilterStrategy::from_config(&self.config.filter, fps).map_err(PipelineError::Filter)?;
        let filtered = strategy.apply(raw).map_err(PipelineError::Filter)?;
        info!(
            filter = strategy.name(),
            frames = filtered.trajectory.len(),
            shrinkage = filtered.alignment.shrinkage,
            "filtered keypoints"
        );

        let keypoints_3d = lifter
            .lift(filtered.trajectory.clone())
            .map_err(PipelineError::Lifting)?;
        Self::check_lifted(&filtered.trajectory, &keypoints_3d).map_err(PipelineError::Lifted)?;
        debug!(frames = keypoints_3d.len(), "lifted to 3D");

        let kinematics = Kinematics::from_trajectory(&keypoints_3d, &self.skeleton, fps)
            .map_err(PipelineError::Kinematics)?;
        info!(
            connections = kinematics.joint_angles.len(),
            velocity_frames = kinematics.velocity.len_of(ndarray::Axis(0)),
            "computed kinematics"
        );

        let analysis = Analysis {
            fps,
            dropped_frames,
            filter: strategy.name(),
            alignment: filtered.alignment,
            filtered: filtered.trajectory,
            keypoints_3d,
            joint_angles: kinematics.joint_angles,
            velocity: kinematics.velocity,
            acceleration: kinematics.acceleration,
        };
        sink.write(&analysis).map_err(PipelineError::Output)?;
        Ok(analysis)
    }

    /// キーポイントが 1 つも検出されなかったフレームだけ捨てる。
    /// 信頼度が低くても検出があれば時間軸を保つため採用する
    fn acquire<S: PoseSource>(
        &self,
        source: &mut S,
    ) -> Result<(Trajectory, usize), PipelineError> {
        let mut trajectory: Option<Trajectory> = None;
        let mut dropped = 0;
        let mut index = 0usize;

        while let Some(pose) = source.next_pose().map_err(PipelineError::Acquisition)? {
            index += 1;
            if pose.is_empty() {
                debug!(frame = index - 1, "no detection, frame dropped");
                dropped += 1;
                continue;
            }

            // 最初に採用したフレームで関節名と次元が決まる
            if trajectory.is_none() {
                let names = pose.keypoints.iter().map(|k| k.name.clone()).collect();
                let dims = pose.keypoints[0].dims();
                trajectory = Some(Trajectory::new(names, dims).map_err(PipelineError::Frames)?);
            }
            if let Some(t) = trajectory.as_mut() {
                t.push_pose(&pose).map_err(PipelineError::Frames)?;
            }
        }

        if dropped > 0 && dropped * 2 > index {
            warn!(dropped, total = index, "more than half of the frames had no detection");
        }

        match trajectory {
            Some(t) if !t.is_empty() => Ok((t, dropped)),
            _ => Err(PipelineError::NoFrames),
        }
    }

    fn check_lifted(input: &Trajectory, lifted: &Trajectory) -> Result<(), KinematicsError> {
        let expected = (input.len(), input.joint_count(), 3);
        let actual = (lifted.len(), lifted.joint_count(), lifted.dims());
        if expected != actual {
            return Err(KinematicsError::shape(
                format!("{:?} [frames, joints, dims]", expected),
                format!("{:?}", actual),
            ));
        }
        if input.joints() != lifted.joints() {
            return Err(KinematicsError::shape(
                format!("joints {:?}", input.joints()),
                format!("joints {:?}", lifted.joints()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterKind;
    use crate::kinematics::JointConnection;
    use crate::pose::{Keypoint, Pose};
    use anyhow::bail;

    struct VecSource {
        fps: f64,
        frames: std::vec::IntoIter<Pose>,
    }

    impl PoseSource for VecSource {
        fn fps(&self) -> f64 {
            self.fps
        }

        fn next_pose(&mut self) -> anyhow::Result<Option<Pose>> {
            Ok(self.frames.next())
        }
    }

    /// z = 関節番号 を足すだけのリフター
    struct FlatLifter;

    impl PoseLifter for FlatLifter {
        fn lift(&mut self, trajectory: Trajectory) -> anyhow::Result<Trajectory> {
            let (joints, positions, confidence) = trajectory.into_parts();
            let (f, n, _) = positions.dim();
            let lifted = Array3::from_shape_fn((f, n, 3), |(i, j, c)| {
                if c < 2 {
                    positions[[i, j, c]]
                } else {
                    j as f64
                }
            });
            Ok(Trajectory::from_arrays(joints, lifted, confidence)?)
        }
    }

    struct FailingLifter;

    impl PoseLifter for FailingLifter {
        fn lift(&mut self, _: Trajectory) -> anyhow::Result<Trajectory> {
            bail!("model not loaded")
        }
    }

    #[derive(Default)]
    struct CountingSink {
        writes: usize,
    }

    impl ResultSink for CountingSink {
        fn write(&mut self, _: &Analysis) -> anyhow::Result<()> {
            self.writes += 1;
            Ok(())
        }
    }

    fn pose(frame: usize) -> Pose {
        Pose::new(vec![
            Keypoint::new("hip", frame as f64, 0.0, 0.9),
            Keypoint::new("knee", frame as f64, 1.0, 0.9),
        ])
    }

    fn source(poses: Vec<Pose>) -> VecSource {
        VecSource {
            fps: 30.0,
            frames: poses.into_iter(),
        }
    }

    fn config(kind: FilterKind) -> Config {
        let mut config = Config::default();
        config.filter.kind = kind;
        config.filter.moving_avg_window = 3;
        config.skeleton.connections = vec![("hip".into(), "knee".into())];
        config
    }

    #[test]
    fn test_run_drops_empty_frames() {
        let mut poses: Vec<Pose> = (0..6).map(pose).collect();
        poses.insert(2, Pose::default());
        let pipeline = Pipeline::new(config(FilterKind::Kalman));
        let mut sink = CountingSink::default();
        let analysis = pipeline.run(source(poses), FlatLifter, &mut sink).unwrap();
        assert_eq!(analysis.dropped_frames, 1);
        assert_eq!(analysis.filtered.len(), 6);
        assert_eq!(analysis.velocity.dim(), (5, 2, 3));
        assert_eq!(analysis.acceleration.dim(), (4, 2, 3));
        assert_eq!(sink.writes, 1);
    }

    #[test]
    fn test_run_keeps_low_confidence_detections() {
        // 1 単位/フレームで動く関節、信頼度は 0.9 と 0.1 を交互に
        let poses: Vec<Pose> = (0..8)
            .map(|f| {
                let c = if f % 2 == 0 { 0.9 } else { 0.1 };
                Pose::new(vec![
                    Keypoint::new("hip", f as f64, 0.0, c),
                    Keypoint::new("knee", f as f64, 1.0, c),
                ])
            })
            .collect();
        let mut config = config(FilterKind::MovingAverage);
        config.filter.moving_avg_window = 1;
        let pipeline = Pipeline::new(config);
        let mut sink = CountingSink::default();
        let analysis = pipeline.run(source(poses), FlatLifter, &mut sink).unwrap();
        assert_eq!(analysis.dropped_frames, 0);
        assert_eq!(analysis.filtered.len(), 8);
        assert!(analysis
            .velocity
            .index_axis(ndarray::Axis(2), 0)
            .iter()
            .all(|&v| (v - 30.0).abs() < 1e-9));
    }

    #[test]
    fn test_nan_keypoint_fails_acquisition() {
        let mut poses: Vec<Pose> = (0..6).map(pose).collect();
        poses[3].keypoints[1].x = f64::NAN;
        let pipeline = Pipeline::new(config(FilterKind::Kalman));
        let mut sink = CountingSink::default();
        let err = pipeline.run(source(poses), FlatLifter, &mut sink).unwrap_err();
        assert_eq!(err.stage(), Stage::Acquisition);
        assert_eq!(
            err.invariant(),
            Some(&KinematicsError::NonFiniteCoordinate {
                joint: "knee".to_string(),
                frame: 3
            })
        );
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn test_run_tracks_moving_average_shrinkage() {
        let pipeline = Pipeline::new(config(FilterKind::MovingAverage));
        let mut sink = CountingSink::default();
        let analysis = pipeline
            .run(source((0..8).map(pose).collect()), FlatLifter, &mut sink)
            .unwrap();
        assert_eq!(analysis.filter, "moving_average");
        assert_eq!(analysis.alignment.shrinkage, 2);
        assert_eq!(analysis.keypoints_3d.len(), 6);
        assert_eq!(analysis.joint_angles[0].degrees.len(), 6);
    }

    #[test]
    fn test_lifter_failure_writes_nothing() {
        let pipeline = Pipeline::new(config(FilterKind::Kalman));
        let mut sink = CountingSink::default();
        let err = pipeline
            .run(source((0..6).map(pose).collect()), FailingLifter, &mut sink)
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Lifting);
        assert!(err.to_string().contains("model not loaded"));
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn test_short_recording_fails_in_filter_stage() {
        let pipeline = Pipeline::new(config(FilterKind::Butterworth));
        let mut sink = CountingSink::default();
        let err = pipeline
            .run(source((0..3).map(pose).collect()), FlatLifter, &mut sink)
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Filtering);
        assert!(matches!(
            err.invariant(),
            Some(KinematicsError::InsufficientFrames { required: 13, actual: 3, .. })
        ));
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn test_no_frames() {
        let pipeline = Pipeline::new(config(FilterKind::Kalman));
        let mut sink = CountingSink::default();
        let err = pipeline
            .run(source(vec![Pose::default(); 3]), FlatLifter, &mut sink)
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoFrames));
        assert_eq!(err.stage(), Stage::Acquisition);
    }

    #[test]
    fn test_inconsistent_joint_set_is_rejected() {
        let mut poses: Vec<Pose> = (0..4).map(pose).collect();
        poses.push(Pose::new(vec![Keypoint::new("hip", 0.0, 0.0, 0.9)]));
        let pipeline = Pipeline::new(config(FilterKind::Kalman));
        let mut sink = CountingSink::default();
        let err = pipeline.run(source(poses), FlatLifter, &mut sink).unwrap_err();
        assert_eq!(err.stage(), Stage::Acquisition);
        assert!(matches!(err.invariant(), Some(KinematicsError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_degenerate_geometry_fails_kinematics() {
        let poses: Vec<Pose> = (0..5)
            .map(|f| {
                Pose::new(vec![
                    Keypoint::new("hip", f as f64, 0.0, 0.9),
                    Keypoint::new("knee", f as f64, 0.0, 0.9),
                ])
            })
            .collect();
        let mut config = config(FilterKind::MovingAverage);
        config.skeleton.connections = vec![("hip".into(), "hip".into())];
        let pipeline = Pipeline::new(config);
        let mut sink = CountingSink::default();
        let err = pipeline.run(source(poses), FlatLifter, &mut sink).unwrap_err();
        assert_eq!(err.stage(), Stage::Kinematics);
        assert!(matches!(err.invariant(), Some(KinematicsError::DegenerateVector { .. })));
    }

    #[test]
    fn test_pipeline_uses_configured_skeleton() {
        let pipeline = Pipeline::new(config(FilterKind::Kalman));
        assert_eq!(pipeline.skeleton().connections(), &[JointConnection::new("hip", "knee")]);
    }
}
