use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::kinematics::{JointConnection, Skeleton};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// 検出器出力の記録 (JSON)
    #[serde(default = "default_input")]
    pub input: String,
    /// 解析結果の保存先
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub lifter: LifterConfig,
    #[serde(default)]
    pub skeleton: SkeletonConfig,
}

fn default_input() -> String { "poses.json".to_string() }
fn default_output() -> String { "analysis.json".to_string() }

/// 使用する時間フィルタ（1 実行につき 1 つ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Butterworth,
    Kalman,
    #[serde(alias = "moving_avg")]
    MovingAverage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_filter_kind")]
    pub kind: FilterKind,
    /// カットオフ周波数 (Hz)
    #[serde(default = "default_butterworth_cutoff")]
    pub butterworth_cutoff: f64,
    /// 次数（偶数）
    #[serde(default = "default_butterworth_order")]
    pub butterworth_order: usize,
    /// 移動平均の窓幅（フレーム）
    #[serde(default = "default_moving_avg_window")]
    pub moving_avg_window: usize,
    #[serde(default)]
    pub kalman: KalmanConfig,
}

fn default_filter_kind() -> FilterKind { FilterKind::Butterworth }
fn default_butterworth_cutoff() -> f64 { 7.0 }
fn default_butterworth_order() -> usize { 4 }
fn default_moving_avg_window() -> usize { 5 }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: default_filter_kind(),
            butterworth_cutoff: default_butterworth_cutoff(),
            butterworth_order: default_butterworth_order(),
            moving_avg_window: default_moving_avg_window(),
            kalman: KalmanConfig::default(),
        }
    }
}

/// カルマンフィルタの共分散スカラー（単位行列に掛ける）
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct KalmanConfig {
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    #[serde(default = "default_initial_uncertainty")]
    pub initial_uncertainty: f64,
}

fn default_measurement_noise() -> f64 { 0.01 }
fn default_process_noise() -> f64 { 0.1 }
fn default_initial_uncertainty() -> f64 { 1000.0 }

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            measurement_noise: default_measurement_noise(),
            process_noise: default_process_noise(),
            initial_uncertainty: default_initial_uncertainty(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifterConfig {
    /// 入力画像の幅 (px)
    #[serde(default = "default_image_width")]
    pub image_width: f64,
    /// 入力画像の高さ (px)
    #[serde(default = "default_image_height")]
    pub image_height: f64,
    /// 推定焦点距離 (px)
    #[serde(default = "default_focal_length")]
    pub focal_length: f64,
    /// 被写体の身長 (m)
    #[serde(default = "default_subject_height")]
    pub subject_height: f64,
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
}

fn default_image_width() -> f64 { 1280.0 }
fn default_image_height() -> f64 { 720.0 }
fn default_focal_length() -> f64 { 1000.0 }
fn default_subject_height() -> f64 { 1.75 }
fn default_visibility_threshold() -> f64 { 0.5 }

impl Default for LifterConfig {
    fn default() -> Self {
        Self {
            image_width: default_image_width(),
            image_height: default_image_height(),
            focal_length: default_focal_length(),
            subject_height: default_subject_height(),
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkeletonConfig {
    /// 関節名のペア。省略時は COCO 骨格
    #[serde(default = "default_connections")]
    pub connections: Vec<(String, String)>,
}

fn default_connections() -> Vec<(String, String)> {
    Skeleton::coco()
        .connections()
        .iter()
        .map(|c| (c.a.clone(), c.b.clone()))
        .collect()
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            connections: default_connections(),
        }
    }
}

impl SkeletonConfig {
    pub fn to_skeleton(&self) -> Skeleton {
        Skeleton::new(
            self.connections
                .iter()
                .map(|(a, b)| JointConnection::new(a.clone(), b.clone()))
                .collect(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            filter: FilterConfig::default(),
            lifter: LifterConfig::default(),
            skeleton: SkeletonConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// ファイルが無ければデフォルト
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
