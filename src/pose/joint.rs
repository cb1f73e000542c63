use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// 正規化された関節名ボキャブラリ
///
/// 検出器ごとの名称差異（MoveNet系のsnake_case、ARKit系の`*_joint`）は
/// `from_detector_label` でこの列挙型へ一度だけ解決する。
/// 下流（計測エスティメータ）は生の文字列を扱わない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointName {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    Head,
    HeadTop,
    Neck,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    SpineUpper,
    SpineMid,
    SpineLower,
    Root,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

/// 検出器ラベル → 正規関節名の候補表
///
/// 先頭から順に照合する。未知のラベルはNone（破棄される）。
const LABEL_CANDIDATES: &[(JointName, &[&str])] = &[
    (JointName::Nose, &["nose"]),
    (JointName::LeftEye, &["left_eye"]),
    (JointName::RightEye, &["right_eye"]),
    (JointName::LeftEar, &["left_ear"]),
    (JointName::RightEar, &["right_ear"]),
    (JointName::Head, &["head", "head_joint"]),
    (JointName::HeadTop, &["head_top", "top_of_head"]),
    (JointName::Neck, &["neck", "neck_1_joint"]),
    (
        JointName::LeftShoulder,
        &["left_shoulder", "left_shoulder_1_joint"],
    ),
    (
        JointName::RightShoulder,
        &["right_shoulder", "right_shoulder_1_joint"],
    ),
    (JointName::LeftElbow, &["left_elbow", "left_forearm_joint"]),
    (
        JointName::RightElbow,
        &["right_elbow", "right_forearm_joint"],
    ),
    (JointName::LeftWrist, &["left_wrist", "left_hand_joint"]),
    (JointName::RightWrist, &["right_wrist", "right_hand_joint"]),
    (JointName::Root, &["root", "hips_joint", "pelvis"]),
    (JointName::LeftHip, &["left_hip", "left_upLeg_joint"]),
    (JointName::RightHip, &["right_hip", "right_upLeg_joint"]),
    (JointName::LeftKnee, &["left_knee", "left_leg_joint"]),
    (JointName::RightKnee, &["right_knee", "right_leg_joint"]),
    (JointName::LeftAnkle, &["left_ankle", "left_foot_joint"]),
    (JointName::RightAnkle, &["right_ankle", "right_foot_joint"]),
];

impl JointName {
    /// 検出器の生ラベルを正規関節名へ解決する
    pub fn from_detector_label(label: &str) -> Option<Self> {
        for (name, candidates) in LABEL_CANDIDATES {
            if candidates.iter().any(|c| *c == label) {
                return Some(*name);
            }
        }
        None
    }
}

/// 1フレーム分の関節集合（関節名 → カメラ座標系の3D位置、メートル）
///
/// 欠損はオクルージョンとして正常。下流は全て欠損に耐える。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointSet {
    pub joints: BTreeMap<JointName, [f32; 3]>,
}

impl JointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: JointName, position: Vector3<f32>) {
        self.joints.insert(name, [position.x, position.y, position.z]);
    }

    pub fn get(&self, name: JointName) -> Option<Vector3<f32>> {
        self.joints.get(&name).map(|p| Vector3::new(p[0], p[1], p[2]))
    }

    pub fn contains(&self, name: JointName) -> bool {
        self.joints.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// 2関節間のユークリッド距離（メートル）。どちらか欠損ならNone。
    pub fn segment(&self, a: JointName, b: JointName) -> Option<f32> {
        Some((self.get(a)? - self.get(b)?).norm())
    }

    /// 2関節の中点。どちらか欠損ならNone。
    pub fn midpoint(&self, a: JointName, b: JointName) -> Option<Vector3<f32>> {
        Some((self.get(a)? + self.get(b)?) * 0.5)
    }
}

/// 永続化する関節レコード（joints.json の中身）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointRecord {
    pub timestamp_ms: u64,
    pub joints: JointSet,
}
