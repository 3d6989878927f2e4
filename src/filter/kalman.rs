use nalgebra::{Matrix2, RowVector2, Vector2};
use ndarray::{Array2, Array3, ArrayView2, Axis};

use super::{Alignment, Filtered, TemporalFilter};
use crate::config::KalmanConfig;
use crate::error::{KinematicsError, Result};
use crate::pose::Trajectory;

/// 等速度モデルの共分散スカラー
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanParams {
    /// R
    pub measurement_noise: f64,
    /// Q
    pub process_noise: f64,
    /// P0
    pub initial_uncertainty: f64,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self::from(&KalmanConfig::default())
    }
}

impl From<&KalmanConfig> for KalmanParams {
    fn from(config: &KalmanConfig) -> Self {
        Self {
            measurement_noise: config.measurement_noise,
            process_noise: config.process_noise,
            initial_uncertainty: config.initial_uncertainty,
        }
    }
}

/// 1座標ぶんのカルマンフィルタ
///
/// 状態 [位置, 速度]、dt = 1 フレームの等速度モデル。位置のみ観測する。
#[derive(Debug, Clone)]
pub struct KalmanTrack {
    x: Vector2<f64>,
    p: Matrix2<f64>,
    f: Matrix2<f64>,
    h: RowVector2<f64>,
    q: Matrix2<f64>,
    r: f64,
}

impl KalmanTrack {
    pub fn new(params: KalmanParams) -> Self {
        Self {
            x: Vector2::zeros(),
            p: Matrix2::identity() * params.initial_uncertainty,
            f: Matrix2::new(1.0, 1.0, 0.0, 1.0),
            h: RowVector2::new(1.0, 0.0),
            q: Matrix2::identity() * params.process_noise,
            r: params.measurement_noise,
        }
    }

    /// 予測 → 更新を 1 回行い、位置の推定値を返す
    pub fn step(&mut self, measurement: f64) -> f64 {
        // predict
        self.x = self.f * self.x;
        self.p = self.f * self.p * self.f.transpose() + self.q;

        // update
        let innovation = measurement - (self.h * self.x)[0];
        let s = (self.h * self.p * self.h.transpose())[0] + self.r;
        let k: Vector2<f64> = self.p * self.h.transpose() / s;
        self.x += k * innovation;

        // Joseph form
        let i_kh = Matrix2::identity() - k * self.h;
        self.p = i_kh * self.p * i_kh.transpose() + k * k.transpose() * self.r;

        self.x[0]
    }

    pub fn position(&self) -> f64 {
        self.x[0]
    }

    pub fn velocity(&self) -> f64 {
        self.x[1]
    }

    pub fn covariance(&self) -> Matrix2<f64> {
        self.p
    }
}

/// キーポイント全体（関節 × 座標）のカルマンフィルタ群
///
/// 生成は系列ごとに 1 回。同じインスタンスに 1 フレームずつ渡していく。
/// フレームごとに作り直すと平滑化が効かなくなる。
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    joints: usize,
    dims: usize,
    params: KalmanParams,
    tracks: Vec<KalmanTrack>,
    frames_seen: usize,
}

impl KalmanFilter {
    pub fn new(joints: usize, dims: usize, params: KalmanParams) -> Self {
        Self {
            joints,
            dims,
            params,
            tracks: vec![KalmanTrack::new(params); joints * dims],
            frames_seen: 0,
        }
    }

    /// 観測 1 フレーム [joint, coord] を取り込み、位置の推定値を返す
    pub fn step(&mut self, frame: ArrayView2<f64>) -> Result<Array2<f64>> {
        if frame.dim() != (self.joints, self.dims) {
            return Err(KinematicsError::shape(
                format!("frame [{}, {}]", self.joints, self.dims),
                format!("frame {:?}", frame.shape()),
            ));
        }
        let dims = self.dims;
        let mut out = Array2::zeros((self.joints, dims));
        for ((j, c), &z) in frame.indexed_iter() {
            out[[j, c]] = self.tracks[j * dims + c].step(z);
        }
        self.frames_seen += 1;
        Ok(out)
    }

    /// 明示的な再初期化
    pub fn reset(&mut self) {
        self.tracks = vec![KalmanTrack::new(self.params); self.joints * self.dims];
        self.frames_seen = 0;
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    pub fn track(&self, joint: usize, coord: usize) -> Option<&KalmanTrack> {
        if joint < self.joints && coord < self.dims {
            self.tracks.get(joint * self.dims + coord)
        } else {
            None
        }
    }
}

impl TemporalFilter for KalmanParams {
    fn name(&self) -> &'static str {
        "kalman"
    }

    /// 1 回の呼び出しごとに新しいフィルタ群を作り、全フレームを順に流す
    fn apply(&self, trajectory: Trajectory) -> Result<Filtered> {
        let (joints, positions, confidence) = trajectory.into_parts();
        let (frames, n, dims) = positions.dim();

        let mut filter = KalmanFilter::new(n, dims, *self);
        let mut filtered = Array3::zeros((frames, n, dims));
        for (f, frame) in positions.axis_iter(Axis(0)).enumerate() {
            let estimate = filter.step(frame)?;
            filtered.index_axis_mut(Axis(0), f).assign(&estimate);
        }

        Ok(Filtered {
            trajectory: Trajectory::from_arrays(joints, filtered, confidence)?,
            alignment: Alignment {
                offset: 0.0,
                shrinkage: 0,
                causal: true,
            },
        })
    }
}
