use ndarray::{Array2, Array3, ArrayView1, Axis};

use super::{Alignment, Filtered, TemporalFilter};
use crate::error::{KinematicsError, Result};
use crate::pose::Trajectory;

/// 単純移動平均 (valid モード)
///
/// パディングしないので出力は `len - window + 1` フレームに縮む。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingAverage {
    window: usize,
}

impl MovingAverage {
    pub const DEFAULT_WINDOW: usize = 5;

    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(KinematicsError::InvalidWindow(window));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn alignment(&self) -> Alignment {
        Alignment {
            offset: (self.window - 1) as f64 / 2.0,
            shrinkage: self.window - 1,
            causal: false,
        }
    }
}

/// 1系列の移動平均。`series.len() >= window` であること
pub fn moving_average(series: ArrayView1<f64>, window: usize) -> Vec<f64> {
    let n = series.len();
    if window == 0 || n < window {
        return Vec::new();
    }
    let scale = 1.0 / window as f64;
    (0..=n - window)
        .map(|start| series.slice(ndarray::s![start..start + window]).sum() * scale)
        .collect()
}

impl TemporalFilter for MovingAverage {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn apply(&self, trajectory: Trajectory) -> Result<Filtered> {
        let frames = trajectory.len();
        if frames < self.window {
            return Err(KinematicsError::too_short("moving_average", self.window, frames));
        }

        let (joints, positions, confidence) = trajectory.into_parts();
        let (_, n, dims) = positions.dim();
        let out_frames = frames - self.window + 1;

        let mut smoothed = Array3::zeros((out_frames, n, dims));
        for ((j, c), lane) in positions
            .lanes(Axis(0))
            .into_iter()
            .enumerate()
            .map(|(i, lane)| ((i / dims, i % dims), lane))
        {
            for (f, v) in moving_average(lane, self.window).into_iter().enumerate() {
                smoothed[[f, j, c]] = v;
            }
        }

        // 信頼度も同じ窓で平均して形をそろえる
        let mut conf = Array2::zeros((out_frames, n));
        for (j, lane) in confidence.lanes(Axis(0)).into_iter().enumerate() {
            for (f, v) in moving_average(lane, self.window).into_iter().enumerate() {
                conf[[f, j]] = v.clamp(0.0, 1.0);
            }
        }

        Ok(Filtered {
            trajectory: Trajectory::from_arrays(joints, smoothed, conf)?,
            alignment: self.alignment(),
        })
    }
}
