use serde::Serialize;

use crate::error::{KinematicsError, Result};
use crate::pose::KeypointIndex;

/// 剛体セグメントとして扱う関節ペア（順序なし）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JointConnection {
    pub a: String,
    pub b: String,
}

impl JointConnection {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }

    /// 結果のキー ("{a}_{b}")
    pub fn id(&self) -> String {
        format!("{}_{}", self.a, self.b)
    }
}

/// 固定の骨格グラフ。データから推定せず設定で与える
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skeleton {
    connections: Vec<JointConnection>,
}

impl Skeleton {
    pub fn new(connections: Vec<JointConnection>) -> Self {
        Self { connections }
    }

    /// COCO 17 点の標準骨格（目・耳・肩・肘・手首・腰・膝・足首）
    pub fn coco() -> Self {
        use KeypointIndex::*;
        let pairs = [
            (LeftEye, RightEye),
            (LeftEye, LeftEar),
            (RightEye, RightEar),
            (LeftShoulder, RightShoulder),
            (LeftShoulder, LeftElbow),
            (LeftElbow, LeftWrist),
            (RightShoulder, RightElbow),
            (RightElbow, RightWrist),
            (LeftShoulder, LeftHip),
            (RightShoulder, RightHip),
            (LeftHip, RightHip),
            (LeftHip, LeftKnee),
            (LeftKnee, LeftAnkle),
            (RightHip, RightKnee),
            (RightKnee, RightAnkle),
        ];
        Self::new(
            pairs
                .iter()
                .map(|(a, b)| JointConnection::new(a.name(), b.name()))
                .collect(),
        )
    }

    pub fn connections(&self) -> &[JointConnection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// 各接続の関節インデックスを解決する
    pub fn resolve(&self, joints: &[String]) -> Result<Vec<(usize, usize)>> {
        let index_of = |name: &str| {
            joints
                .iter()
                .position(|j| j == name)
                .ok_or_else(|| KinematicsError::UnknownJoint(name.to_string()))
        };
        self.connections
            .iter()
            .map(|c| Ok((index_of(&c.a)?, index_of(&c.b)?)))
            .collect()
    }
}
