pub mod constants;
pub mod ellipse;

pub use constants::CalibrationConstants;
pub use ellipse::ellipse_circumference;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pose::{JointName, JointSet};

/// 計測結果を生成したアルゴリズムの版。再調整の追跡に使う。
pub const ALGORITHM_VERSION: &str = "v1.0-photo";

/// 関節由来の計測が1つも無い場合の中立信頼度
/// デフォルトのみの結果も利用可能ではあるため、ゼロにはしない。
const NEUTRAL_CONFIDENCE: f32 = 0.6;

/// 写真から導出しうる計測の固定数（front_rise / back_rise を除く16）
/// 信頼度の分母を固定することで、アンカー欠損が信頼度を
/// 押し上げることがないようにする。
const WEIGHTED_MEASUREMENT_COUNT: f32 = 16.0;

/// 参照身長（ユーザー入力）へフォールバックした場合の重み
const REFERENCE_HEIGHT_WEIGHT: f32 = 0.5;

/// 正規計測名。出力は常にこの全名称を含む。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementName {
    HeightCm,
    NeckCm,
    ShoulderCm,
    ChestCm,
    UnderbustCm,
    WaistNaturalCm,
    SleeveCm,
    BicepCm,
    ForearmCm,
    HipLowCm,
    ThighCm,
    KneeCm,
    CalfCm,
    AnkleCm,
    FrontRiseCm,
    BackRiseCm,
    InseamCm,
    OutseamCm,
}

impl MeasurementName {
    pub const ALL: [MeasurementName; 18] = [
        Self::HeightCm,
        Self::NeckCm,
        Self::ShoulderCm,
        Self::ChestCm,
        Self::UnderbustCm,
        Self::WaistNaturalCm,
        Self::SleeveCm,
        Self::BicepCm,
        Self::ForearmCm,
        Self::HipLowCm,
        Self::ThighCm,
        Self::KneeCm,
        Self::CalfCm,
        Self::AnkleCm,
        Self::FrontRiseCm,
        Self::BackRiseCm,
        Self::InseamCm,
        Self::OutseamCm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeightCm => "height_cm",
            Self::NeckCm => "neck_cm",
            Self::ShoulderCm => "shoulder_cm",
            Self::ChestCm => "chest_cm",
            Self::UnderbustCm => "underbust_cm",
            Self::WaistNaturalCm => "waist_natural_cm",
            Self::SleeveCm => "sleeve_cm",
            Self::BicepCm => "bicep_cm",
            Self::ForearmCm => "forearm_cm",
            Self::HipLowCm => "hip_low_cm",
            Self::ThighCm => "thigh_cm",
            Self::KneeCm => "knee_cm",
            Self::CalfCm => "calf_cm",
            Self::AnkleCm => "ankle_cm",
            Self::FrontRiseCm => "front_rise_cm",
            Self::BackRiseCm => "back_rise_cm",
            Self::InseamCm => "inseam_cm",
            Self::OutseamCm => "outseam_cm",
        }
    }

    /// 集団平均のデフォルト値（cm）。アンカー欠損時に使用。
    pub fn default_cm(&self) -> f32 {
        match self {
            Self::HeightCm => 170.0,
            Self::NeckCm => 37.0,
            Self::ShoulderCm => 45.0,
            Self::ChestCm => 100.0,
            Self::UnderbustCm => 90.0,
            Self::WaistNaturalCm => 80.0,
            Self::SleeveCm => 60.0,
            Self::BicepCm => 30.0,
            Self::ForearmCm => 25.0,
            Self::HipLowCm => 100.0,
            Self::ThighCm => 55.0,
            Self::KneeCm => 38.0,
            Self::CalfCm => 35.0,
            Self::AnkleCm => 22.0,
            Self::FrontRiseCm => 25.0,
            Self::BackRiseCm => 35.0,
            Self::InseamCm => 76.0,
            Self::OutseamCm => 100.0,
        }
    }

    /// 関節由来で計測できた場合の信頼度重み
    ///
    /// 直接距離 > 楕円近似 > 四肢乗数の順に高い。front_rise / back_rise は
    /// 写真から導出できないため常にデフォルト（重みなし）。
    fn weight(&self) -> f32 {
        match self {
            Self::HeightCm | Self::ShoulderCm | Self::SleeveCm | Self::InseamCm => 0.9,
            Self::ChestCm
            | Self::UnderbustCm
            | Self::WaistNaturalCm
            | Self::HipLowCm
            | Self::OutseamCm => 0.85,
            Self::NeckCm => 0.8,
            Self::BicepCm
            | Self::ForearmCm
            | Self::ThighCm
            | Self::KneeCm
            | Self::CalfCm
            | Self::AnkleCm => 0.7,
            Self::FrontRiseCm | Self::BackRiseCm => 0.0,
        }
    }
}

/// 採寸結果（正規計測名の完全な集合 + 信頼度）
///
/// 作成後は不変。新しい推定は更新ではなく置き換えで扱う。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementSet {
    pub values: BTreeMap<MeasurementName, f32>,
    /// [0,1] の信頼度。デフォルトのみでも 0.6 を下回らない。
    pub confidence: f32,
    pub source: String,
    pub algorithm_version: String,
}

impl MeasurementSet {
    pub fn get(&self, name: MeasurementName) -> f32 {
        // ALLを網羅して構築するため欠損はない
        self.values.get(&name).copied().unwrap_or(name.default_cm())
    }
}

/// 関節集合から採寸結果を計算するエスティメータ
///
/// 決して失敗しない: 全計測にデフォルトがあり、検出が完全に失敗しても
/// 提出可能な完全な結果を返す（精度より可用性を優先する設計）。
pub struct MeasurementEstimator {
    constants: CalibrationConstants,
}

struct Accumulator {
    values: BTreeMap<MeasurementName, f32>,
    weight_sum: f32,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            weight_sum: 0.0,
        }
    }

    /// 関節由来の計測値を重み付きで登録
    fn measured(&mut self, name: MeasurementName, value_cm: f32) {
        self.values.insert(name, value_cm.max(0.0));
        self.weight_sum += name.weight();
    }

    /// 重みを明示した登録（参照身長フォールバック用）
    fn measured_with_weight(&mut self, name: MeasurementName, value_cm: f32, weight: f32) {
        self.values.insert(name, value_cm.max(0.0));
        self.weight_sum += weight;
    }
}

impl MeasurementEstimator {
    pub fn new(constants: CalibrationConstants) -> Self {
        Self { constants }
    }

    /// 関節集合を採寸結果へ変換する
    ///
    /// `reference_height_cm`: 頭頂・足の欠損時に使うユーザー入力の身長。
    /// 身長は個人差が大きく集団平均では許容できないため、専用の
    /// フォールバック経路を持つ（重み0.5）。
    pub fn estimate(&self, joints: &JointSet, reference_height_cm: Option<f32>) -> MeasurementSet {
        let c = &self.constants;
        let mut acc = Accumulator::new();

        let shoulder_width = joints.segment(JointName::LeftShoulder, JointName::RightShoulder);
        let hip_width = joints.segment(JointName::LeftHip, JointName::RightHip);
        let root = joints
            .get(JointName::Root)
            .or_else(|| joints.midpoint(JointName::LeftHip, JointName::RightHip));
        let foot_mid = joints.midpoint(JointName::LeftAnkle, JointName::RightAnkle);

        // 身長: 頭頂〜足中点の距離。無ければ参照身長（低重み）。
        match (joints.get(JointName::HeadTop), foot_mid) {
            (Some(top), Some(foot)) => {
                acc.measured(MeasurementName::HeightCm, (top - foot).norm() * 100.0);
            }
            _ => {
                if let Some(height) = reference_height_cm {
                    acc.measured_with_weight(
                        MeasurementName::HeightCm,
                        height,
                        REFERENCE_HEIGHT_WEIGHT,
                    );
                }
            }
        }

        if let Some(width) = shoulder_width {
            acc.measured(MeasurementName::ShoulderCm, width * 100.0);
            acc.measured(
                MeasurementName::NeckCm,
                width * 100.0 * c.neck_shoulder_ratio,
            );

            // 胸囲: 肩幅由来の幅と比率推定の前後径による楕円近似
            let a = width * c.chest_breadth_ratio / 2.0;
            let b = a * c.chest_depth_ratio;
            let chest_cm = ellipse_circumference(a, b) * 100.0;
            acc.measured(MeasurementName::ChestCm, chest_cm);
            acc.measured(
                MeasurementName::UnderbustCm,
                chest_cm * c.underbust_chest_ratio,
            );
        }

        if let Some(width) = hip_width {
            let a = width * c.waist_breadth_ratio / 2.0;
            let b = a * c.waist_depth_ratio;
            acc.measured(
                MeasurementName::WaistNaturalCm,
                ellipse_circumference(a, b) * 100.0,
            );

            let a = width * c.hip_breadth_ratio / 2.0;
            let b = a * c.hip_depth_ratio;
            acc.measured(
                MeasurementName::HipLowCm,
                ellipse_circumference(a, b) * 100.0,
            );
        }

        // 袖丈: 肩→肘→手首の経路長（左優先、無ければ右）
        if let Some(sleeve) = self.arm_length(joints) {
            acc.measured(MeasurementName::SleeveCm, sleeve * 100.0);
        }

        // 四肢の周囲長: セグメント長 × 経験的乗数（幾何導出ではない近似、低重み）
        if let Some(upper_arm) = side_segment(
            joints,
            (JointName::LeftShoulder, JointName::LeftElbow),
            (JointName::RightShoulder, JointName::RightElbow),
        ) {
            acc.measured(MeasurementName::BicepCm, upper_arm * 100.0 * c.bicep_ratio);
        }
        if let Some(forearm) = side_segment(
            joints,
            (JointName::LeftElbow, JointName::LeftWrist),
            (JointName::RightElbow, JointName::RightWrist),
        ) {
            acc.measured(
                MeasurementName::ForearmCm,
                forearm * 100.0 * c.forearm_ratio,
            );
        }
        if let Some(upper_leg) = side_segment(
            joints,
            (JointName::LeftHip, JointName::LeftKnee),
            (JointName::RightHip, JointName::RightKnee),
        ) {
            acc.measured(MeasurementName::ThighCm, upper_leg * 100.0 * c.thigh_ratio);
            acc.measured(MeasurementName::KneeCm, upper_leg * 100.0 * c.knee_ratio);
        }
        if let Some(lower_leg) = side_segment(
            joints,
            (JointName::LeftKnee, JointName::LeftAnkle),
            (JointName::RightKnee, JointName::RightAnkle),
        ) {
            acc.measured(MeasurementName::CalfCm, lower_leg * 100.0 * c.calf_ratio);
            acc.measured(MeasurementName::AnkleCm, lower_leg * 100.0 * c.ankle_ratio);
        }

        // 股下: ルート〜足中点。総丈は股下からの比率推定。
        if let (Some(root), Some(foot)) = (root, foot_mid) {
            let inseam_cm = (root - foot).norm() * 100.0;
            acc.measured(MeasurementName::InseamCm, inseam_cm);
            acc.measured(
                MeasurementName::OutseamCm,
                inseam_cm * c.outseam_inseam_ratio,
            );
        }

        let confidence = if acc.weight_sum > 0.0 {
            (acc.weight_sum / WEIGHTED_MEASUREMENT_COUNT).max(NEUTRAL_CONFIDENCE)
        } else {
            NEUTRAL_CONFIDENCE
        };

        // 出力は常に全計測名を含む。欠けた分はデフォルトで埋める。
        let mut values = acc.values;
        for name in MeasurementName::ALL {
            values.entry(name).or_insert_with(|| name.default_cm());
        }

        debug!(
            joints = joints.len(),
            confidence, "measurement estimate complete"
        );

        MeasurementSet {
            values,
            confidence,
            source: "photo_capture".to_string(),
            algorithm_version: ALGORITHM_VERSION.to_string(),
        }
    }

    fn arm_length(&self, joints: &JointSet) -> Option<f32> {
        let chain = |s, e, w| Some(joints.segment(s, e)? + joints.segment(e, w)?);
        chain(
            JointName::LeftShoulder,
            JointName::LeftElbow,
            JointName::LeftWrist,
        )
        .or_else(|| {
            chain(
                JointName::RightShoulder,
                JointName::RightElbow,
                JointName::RightWrist,
            )
        })
    }
}

/// 左側のセグメントを優先し、欠損していれば右側を使う
fn side_segment(
    joints: &JointSet,
    left: (JointName, JointName),
    right: (JointName, JointName),
) -> Option<f32> {
    joints
        .segment(left.0, left.1)
        .or_else(|| joints.segment(right.0, right.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn estimator() -> MeasurementEstimator {
        MeasurementEstimator::new(CalibrationConstants::default())
    }

    /// 全アンカーが揃った基準関節集合（カメラ座標、Y下向き、メートル）
    fn full_joints() -> JointSet {
        let mut js = JointSet::new();
        js.insert(JointName::HeadTop, Vector3::new(0.0, -0.85, 2.0));
        js.insert(JointName::LeftShoulder, Vector3::new(-0.195, -0.55, 2.0));
        js.insert(JointName::RightShoulder, Vector3::new(0.195, -0.55, 2.0));
        js.insert(JointName::LeftElbow, Vector3::new(-0.25, -0.25, 2.0));
        js.insert(JointName::RightElbow, Vector3::new(0.25, -0.25, 2.0));
        js.insert(JointName::LeftWrist, Vector3::new(-0.27, 0.01, 2.0));
        js.insert(JointName::RightWrist, Vector3::new(0.27, 0.01, 2.0));
        js.insert(JointName::Root, Vector3::new(0.0, 0.0, 2.0));
        js.insert(JointName::LeftHip, Vector3::new(-0.085, 0.0, 2.0));
        js.insert(JointName::RightHip, Vector3::new(0.085, 0.0, 2.0));
        js.insert(JointName::LeftKnee, Vector3::new(-0.09, 0.42, 2.0));
        js.insert(JointName::RightKnee, Vector3::new(0.09, 0.42, 2.0));
        js.insert(JointName::LeftAnkle, Vector3::new(-0.09, 0.82, 2.0));
        js.insert(JointName::RightAnkle, Vector3::new(0.09, 0.82, 2.0));
        js
    }

    #[test]
    fn test_empty_set_returns_all_defaults_at_neutral_confidence() {
        let result = estimator().estimate(&JointSet::new(), None);

        assert_eq!(result.values.len(), 18);
        for name in MeasurementName::ALL {
            assert_eq!(result.get(name), name.default_cm(), "{}", name.as_str());
        }
        assert_eq!(result.confidence, 0.6);
    }

    #[test]
    fn test_completeness_under_partial_detection() {
        let mut js = JointSet::new();
        js.insert(JointName::LeftShoulder, Vector3::new(-0.2, -0.5, 2.0));
        js.insert(JointName::RightShoulder, Vector3::new(0.2, -0.5, 2.0));
        let result = estimator().estimate(&js, None);

        for name in MeasurementName::ALL {
            assert!(result.get(name) >= 0.0, "{}", name.as_str());
        }
        // 肩幅は実測、脚は全てデフォルト
        assert!((result.get(MeasurementName::ShoulderCm) - 40.0).abs() < 0.01);
        assert_eq!(
            result.get(MeasurementName::ThighCm),
            MeasurementName::ThighCm.default_cm()
        );
    }

    #[test]
    fn test_full_detection_height_and_confidence() {
        let result = estimator().estimate(&full_joints(), None);

        // 手計算: |(0,-0.85,2) - (0,0.82,2)| = 1.67m
        let expected_height = 167.0;
        let height = result.get(MeasurementName::HeightCm);
        assert!(
            (height - expected_height).abs() / expected_height < 0.01,
            "height {height}"
        );
        assert!(result.confidence >= 0.8, "confidence {}", result.confidence);
    }

    #[test]
    fn test_full_detection_plausible_circumferences() {
        let result = estimator().estimate(&full_joints(), None);

        let chest = result.get(MeasurementName::ChestCm);
        assert!((80.0..130.0).contains(&chest), "chest {chest}");
        let waist = result.get(MeasurementName::WaistNaturalCm);
        assert!((60.0..110.0).contains(&waist), "waist {waist}");
        let hip = result.get(MeasurementName::HipLowCm);
        assert!((75.0..125.0).contains(&hip), "hip {hip}");
        // アンダーバストは胸囲×0.9
        let underbust = result.get(MeasurementName::UnderbustCm);
        assert!((underbust - chest * 0.9).abs() < 0.01);
    }

    #[test]
    fn test_confidence_monotonic_under_anchor_removal() {
        let full = full_joints();
        let full_confidence = estimator().estimate(&full, None).confidence;

        let anchors: Vec<JointName> = full.joints.keys().copied().collect();
        for anchor in anchors {
            let mut reduced = full.clone();
            reduced.joints.remove(&anchor);
            let confidence = estimator().estimate(&reduced, None).confidence;
            assert!(
                confidence <= full_confidence + 1e-6,
                "removing {anchor:?} raised confidence {confidence} > {full_confidence}"
            );
        }
    }

    #[test]
    fn test_reference_height_fallback() {
        let mut js = full_joints();
        js.joints.remove(&JointName::HeadTop);

        let with_reference = estimator().estimate(&js, Some(181.0));
        assert_eq!(with_reference.get(MeasurementName::HeightCm), 181.0);

        let without_reference = estimator().estimate(&js, None);
        assert_eq!(
            without_reference.get(MeasurementName::HeightCm),
            MeasurementName::HeightCm.default_cm()
        );
        // 参照身長は重み0.5で信頼度に寄与する
        assert!(with_reference.confidence >= without_reference.confidence);
    }

    #[test]
    fn test_right_side_fallback_for_limbs() {
        let mut js = full_joints();
        js.joints.remove(&JointName::LeftElbow);
        js.joints.remove(&JointName::LeftWrist);
        let result = estimator().estimate(&js, None);

        // 右腕チェーンから導出され、デフォルトにはならない
        // 右上腕 ≈ 0.305m、右前腕 ≈ 0.261m
        let sleeve = result.get(MeasurementName::SleeveCm);
        assert!((sleeve - 56.6).abs() < 1.0, "sleeve {sleeve}");
        let bicep = result.get(MeasurementName::BicepCm);
        assert!((bicep - 30.5).abs() < 1.0, "bicep {bicep}");
    }

    #[test]
    fn test_rise_measurements_always_default() {
        let result = estimator().estimate(&full_joints(), None);
        assert_eq!(result.get(MeasurementName::FrontRiseCm), 25.0);
        assert_eq!(result.get(MeasurementName::BackRiseCm), 35.0);
    }

    #[test]
    fn test_measurement_set_serialization() {
        let result = estimator().estimate(&full_joints(), None);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("waist_natural_cm"));
        assert!(json.contains("photo_capture"));
        assert!(json.contains(ALGORITHM_VERSION));
    }
}
