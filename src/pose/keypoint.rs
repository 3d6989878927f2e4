use serde::{Deserialize, Serialize};

/// COCO の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    const ALL: [KeypointIndex; Self::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// トラジェクトリ上の関節名 (snake_case)
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// 17点すべての関節名（インデックス順）
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|k| k.name().to_string()).collect()
    }
}

/// 単一キーポイント
///
/// 名前が同一性を表す。位置と信頼度はフレームごとに変わる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// 3D の場合のみ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f64,
}

impl Keypoint {
    pub fn new(name: impl Into<String>, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            z: None,
            confidence,
        }
    }

    pub fn new_3d(name: impl Into<String>, x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            z: Some(z),
            confidence,
        }
    }

    /// 座標次元 (2 or 3)
    pub fn dims(&self) -> usize {
        if self.z.is_some() {
            3
        } else {
            2
        }
    }

    /// 信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    pub(crate) fn coords(&self) -> impl Iterator<Item = f64> + '_ {
        [self.x, self.y].into_iter().chain(self.z)
    }
}

/// 1フレーム分の検出結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    /// 検出ゼロのフレーム
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.name == name)
    }
}
