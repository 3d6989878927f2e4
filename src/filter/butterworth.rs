use std::f64::consts::PI;

use ndarray::{ArrayView1, Axis};
use tracing::debug;

use super::{Alignment, Filtered, TemporalFilter};
use crate::error::{check_frame_rate, KinematicsError, Result};
use crate::pose::Trajectory;

/// 2次セクション (Direct Form II Transposed)。a[0] = 1
#[derive(Debug, Clone, Copy, PartialEq)]
struct Biquad {
    b: [f64; 3],
    a: [f64; 3],
}

impl Biquad {
    /// DC ゲイン
    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (self.a[0] + self.a[1] + self.a[2])
    }

    /// 単位ステップ入力での定常状態
    fn step_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        let z2 = self.b[2] - self.a[2] * g;
        let z1 = self.b[1] - self.a[1] * g + z2;
        [z1, z2]
    }

    fn run(&self, signal: &mut [f64], mut state: [f64; 2]) {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        for x in signal.iter_mut() {
            let input = *x;
            let y = b0 * input + state[0];
            state[0] = b1 * input - a1 * y + state[1];
            state[1] = b2 * input - a2 * y;
            *x = y;
        }
    }
}

/// ゼロ位相 Butterworth ローパス
///
/// 双一次変換（プリワープあり）で 2 次セクションの縦続に設計し、
/// 時間軸方向に順方向・逆方向の 2 回かけて位相遅れを打ち消す。
/// 全フレームが揃っている必要がある（逐次適用不可）。
#[derive(Debug, Clone)]
pub struct Butterworth {
    cutoff: f64,
    sampling_rate: f64,
    order: usize,
    sections: Vec<Biquad>,
}

impl Butterworth {
    pub const DEFAULT_ORDER: usize = 4;

    pub fn new(cutoff: f64, sampling_rate: f64, order: usize) -> Result<Self> {
        check_frame_rate(sampling_rate)?;
        let nyquist = sampling_rate / 2.0;
        if !(cutoff > 0.0 && cutoff < nyquist) {
            return Err(KinematicsError::InvalidCutoff { cutoff, nyquist });
        }
        if order == 0 || order % 2 != 0 {
            return Err(KinematicsError::InvalidOrder(order));
        }

        let normalized = cutoff / nyquist;
        let sections = Self::design(normalized, order);
        debug!(cutoff, sampling_rate, order, normalized, "butterworth designed");

        Ok(Self {
            cutoff,
            sampling_rate,
            order,
            sections,
        })
    }

    /// 正規化カットオフ (0, 1) の低域通過セクション群。各セクションの DC ゲインは 1
    fn design(normalized: f64, order: usize) -> Vec<Biquad> {
        let k = (PI * normalized / 2.0).tan();
        let k2 = k * k;
        (0..order / 2)
            .map(|i| {
                // 共役極対の減衰 2ζ
                let q = 2.0 * ((2 * i + 1) as f64 * PI / (2 * order) as f64).sin();
                let norm = 1.0 / (1.0 + q * k + k2);
                let b0 = k2 * norm;
                Biquad {
                    b: [b0, 2.0 * b0, b0],
                    a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - q * k + k2) * norm],
                }
            })
            .collect()
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// 端の反射パディング長
    fn pad_len(&self) -> usize {
        3 * self.order
    }

    /// 安定して往復フィルタできる最小フレーム数
    pub fn min_frames(&self) -> usize {
        self.pad_len() + 1
    }

    fn cascade(&self, signal: &mut [f64]) {
        let mut level = signal[0];
        for section in &self.sections {
            let [z1, z2] = section.step_state();
            section.run(signal, [z1 * level, z2 * level]);
            level *= section.dc_gain();
        }
    }

    /// 1 系列の往復フィルタ。長さは min_frames() 以上であること
    fn filtfilt(&self, series: &[f64]) -> Vec<f64> {
        let n = series.len();
        let pad = self.pad_len();
        let first = series[0];
        let last = series[n - 1];

        // 奇対称の延長
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - series[i]));
        ext.extend_from_slice(series);
        ext.extend((1..=pad).map(|i| 2.0 * last - series[n - 1 - i]));

        self.cascade(&mut ext);
        ext.reverse();
        self.cascade(&mut ext);
        ext.reverse();

        ext[pad..pad + n].to_vec()
    }
}

impl TemporalFilter for Butterworth {
    fn name(&self) -> &'static str {
        "butterworth"
    }

    fn apply(&self, trajectory: Trajectory) -> Result<Filtered> {
        if trajectory.len() < self.min_frames() {
            return Err(KinematicsError::too_short(
                "butterworth",
                self.min_frames(),
                trajectory.len(),
            ));
        }

        let (joints, mut positions, confidence) = trajectory.into_parts();
        for mut lane in positions.lanes_mut(Axis(0)) {
            let filtered = self.filtfilt(&lane.to_vec());
            lane.assign(&ArrayView1::from(&filtered[..]));
        }

        Ok(Filtered {
            trajectory: Trajectory::from_arrays(joints, positions, confidence)?,
            alignment: Alignment::IDENTITY,
        })
    }
}
