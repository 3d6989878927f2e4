use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::keypoint::Pose;

/// 2D/3D 姿勢の供給元（外部の姿勢検出器）
///
/// `next_pose` は 1 フレームごとに呼ばれ、ストリーム終端で `None` を返す。
/// 検出ゼロのフレームは空の `Pose` として返してよい（パイプライン側で捨てる）。
pub trait PoseSource {
    /// サンプリングレート (Hz)。元動画のフレームレート
    fn fps(&self) -> f64;

    fn next_pose(&mut self) -> Result<Option<Pose>>;
}

#[derive(Debug, Deserialize)]
struct Recording {
    fps: f64,
    frames: Vec<Pose>,
}

/// 検出器の出力を記録した JSON を再生するソース
///
/// ```json
/// {"fps": 30.0, "frames": [[{"name": "nose", "x": 0.5, "y": 0.2, "confidence": 0.9}]]}
/// ```
pub struct JsonPoseSource {
    fps: f64,
    frames: VecDeque<Pose>,
}

impl JsonPoseSource {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open pose recording {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid pose recording {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let recording: Recording = serde_json::from_reader(reader)?;
        if !(recording.fps.is_finite() && recording.fps > 0.0) {
            bail!("recording fps must be > 0, got {}", recording.fps);
        }
        Ok(Self {
            fps: recording.fps,
            frames: recording.frames.into(),
        })
    }

    /// 残りフレーム数
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl PoseSource for JsonPoseSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_pose(&mut self) -> Result<Option<Pose>> {
        Ok(self.frames.pop_front())
    }
}
