use anyhow::{bail, Result};
use ndarray::{Array3, Axis};

use super::trajectory::Trajectory;
use crate::config::LifterConfig;

/// 2D → 3D リフティング（外部の学習済みモデル）
///
/// 入力と同じフレーム数・関節数で座標だけ 3 次元にしたトラジェクトリを返すこと。
pub trait PoseLifter {
    fn lift(&mut self, trajectory: Trajectory) -> Result<Trajectory>;
}

/// 頭頂〜足元のピクセル高さから奥行きを推定する簡易リフター
///
/// Z = f * H / h （f: 焦点距離px, H: 身長m, h: 目〜かかとの高さpx）
/// 頭から足元に向かって最大 10% 奥行きを増やす。
/// 目・足元が 2 点ずつ見えないフレームは奥行き 0。
#[derive(Debug, Clone)]
pub struct PerspectiveLifter {
    image_width: f64,
    image_height: f64,
    focal_length: f64,
    subject_height: f64,
    visibility_threshold: f64,
}

/// 足元とみなす関節名の候補（かかとが無ければ足首）
const FOOT_MARKERS: [&str; 2] = ["heel", "ankle"];

impl PerspectiveLifter {
    pub fn new(image_width: f64, image_height: f64) -> Self {
        Self {
            image_width,
            image_height,
            focal_length: 1000.0,
            subject_height: 1.75,
            visibility_threshold: 0.5,
        }
    }

    pub fn from_config(config: &LifterConfig) -> Self {
        Self {
            image_width: config.image_width,
            image_height: config.image_height,
            focal_length: config.focal_length,
            subject_height: config.subject_height,
            visibility_threshold: config.visibility_threshold,
        }
    }

    fn joints_matching(joints: &[String], needle: &str) -> Vec<usize> {
        joints
            .iter()
            .enumerate()
            .filter(|(_, name)| name.to_lowercase().contains(needle))
            .map(|(i, _)| i)
            .collect()
    }

    /// 1フレーム分の奥行き
    fn frame_depths(
        &self,
        ys: &[f64],
        confidence: &[f64],
        eyes: &[usize],
        feet: &[usize],
    ) -> Vec<f64> {
        let visible = |idx: &[usize]| -> Vec<f64> {
            idx.iter()
                .filter(|&&i| confidence[i] > self.visibility_threshold)
                .map(|&i| ys[i])
                .collect()
        };
        let eye_ys = visible(eyes);
        let foot_ys = visible(feet);
        if eye_ys.len() < 2 || foot_ys.len() < 2 {
            return vec![0.0; ys.len()];
        }

        let eye_y = eye_ys.iter().copied().fold(f64::INFINITY, f64::min);
        let foot_y = foot_ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let height_px = foot_y - eye_y;
        if height_px <= 0.0 {
            return vec![0.0; ys.len()];
        }

        let base_depth = self.focal_length * self.subject_height / height_px;
        ys.iter()
            .map(|&y| base_depth * (1.0 + (y - eye_y) / height_px * 0.1))
            .collect()
    }
}

impl PoseLifter for PerspectiveLifter {
    fn lift(&mut self, trajectory: Trajectory) -> Result<Trajectory> {
        if trajectory.dims() != 2 {
            bail!("perspective lifter expects 2D keypoints, got {}D", trajectory.dims());
        }
        let (joints, positions, confidence) = trajectory.into_parts();
        let eyes = Self::joints_matching(&joints, "eye");
        let feet = FOOT_MARKERS
            .iter()
            .map(|m| Self::joints_matching(&joints, m))
            .find(|idx| idx.len() >= 2)
            .unwrap_or_default();

        let (frames, n, _) = positions.dim();
        let mut lifted = Array3::zeros((frames, n, 3));
        for (f, frame) in positions.axis_iter(Axis(0)).enumerate() {
            let ys: Vec<f64> = frame.column(1).to_vec();
            let conf: Vec<f64> = confidence.row(f).to_vec();
            let depths = self.frame_depths(&ys, &conf, &eyes, &feet);
            for j in 0..n {
                lifted[[f, j, 0]] = frame[[j, 0]] - self.image_width / 2.0;
                lifted[[f, j, 1]] = -(frame[[j, 1]] - self.image_height / 2.0);
                lifted[[f, j, 2]] = -depths[j];
            }
        }

        Ok(Trajectory::from_arrays(joints, lifted, confidence)?)
    }
}
