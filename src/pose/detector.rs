use crate::camera::frame::ColorFrame;
use crate::error::Result;

/// 検出器が返す単一関節（生ラベル + 正規化2D座標 + 信頼度）
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedJoint {
    /// 検出器固有のラベル（例: "left_shoulder", "left_upLeg_joint"）
    pub label: String,
    /// 正規化X座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化Y座標 (0.0〜1.0)
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl DetectedJoint {
    pub fn new(label: impl Into<String>, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            label: label.into(),
            x,
            y,
            confidence,
        }
    }
}

/// 1フレーム分の検出結果
#[derive(Debug, Clone, Default)]
pub struct DetectedPose {
    pub joints: Vec<DetectedJoint>,
}

impl DetectedPose {
    /// 閾値以上の関節が1つでもあるか
    pub fn any_above(&self, threshold: f32) -> bool {
        self.joints.iter().any(|j| j.confidence >= threshold)
    }
}

/// 姿勢検出器の境界トレイト
///
/// プラットフォームの検出API（Vision / MoveNet等）はこの背後に置く。
/// 状態を持たない純関数として扱う。人物が写っていなければ `Ok(None)`。
pub trait PoseDetector: Send + Sync {
    fn detect(&self, frame: &ColorFrame) -> Result<Option<DetectedPose>>;
}
