//! Temporal filters for keypoint trajectories.
//!
//! Every strategy takes a trajectory of shape (frames, joints, dims) and
//! filters each (joint, axis) series independently.

pub mod butterworth;
pub mod kalman;
pub mod moving_average;

use serde::Serialize;
use tracing::debug;

use crate::config::{FilterConfig, FilterKind};
use crate::error::Result;
use crate::pose::Trajectory;

pub use butterworth::Butterworth;
pub use kalman::{KalmanFilter, KalmanParams, KalmanTrack};
pub use moving_average::{moving_average, MovingAverage};

/// 出力フレームと入力フレームの対応
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Alignment {
    /// 出力フレーム 0 が対応する入力上の位置（窓中心。偶数窓では .5）
    pub offset: f64,
    /// 失われたフレーム数
    pub shrinkage: usize,
    /// 過去のフレームだけで推定（遅れを含む）
    pub causal: bool,
}

impl Alignment {
    /// 長さも位相も変えない
    pub const IDENTITY: Alignment = Alignment {
        offset: 0.0,
        shrinkage: 0,
        causal: false,
    };

    /// 出力フレーム index に対応する入力上の位置
    pub fn source_position(&self, index: usize) -> f64 {
        self.offset + index as f64
    }
}

/// フィルタ結果。長さ・位置合わせの変化を必ず伴う
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub trajectory: Trajectory,
    pub alignment: Alignment,
}

pub trait TemporalFilter {
    fn name(&self) -> &'static str;

    fn apply(&self, trajectory: Trajectory) -> Result<Filtered>;
}

/// 設定で選ぶフィルタ
#[derive(Debug, Clone)]
pub enum FilterStrategy {
    Butterworth(Butterworth),
    Kalman(KalmanParams),
    MovingAverage(MovingAverage),
}

impl FilterStrategy {
    /// サンプリングレートは動画ごとに呼び出し側が渡す
    pub fn from_config(config: &FilterConfig, sampling_rate: f64) -> Result<Self> {
        let strategy = match config.kind {
            FilterKind::Butterworth => Self::Butterworth(Butterworth::new(
                config.butterworth_cutoff,
                sampling_rate,
                config.butterworth_order,
            )?),
            FilterKind::Kalman => Self::Kalman(KalmanParams::from(&config.kalman)),
            FilterKind::MovingAverage => {
                Self::MovingAverage(MovingAverage::new(config.moving_avg_window)?)
            }
        };
        debug!(filter = strategy.name(), sampling_rate, "filter selected");
        Ok(strategy)
    }
}

impl TemporalFilter for FilterStrategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Butterworth(f) => f.name(),
            Self::Kalman(f) => f.name(),
            Self::MovingAverage(f) => f.name(),
        }
    }

    fn apply(&self, trajectory: Trajectory) -> Result<Filtered> {
        match self {
            Self::Butterworth(f) => f.apply(trajectory),
            Self::Kalman(f) => f.apply(trajectory),
            Self::MovingAverage(f) => f.apply(trajectory),
        }
    }
}
