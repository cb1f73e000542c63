use serde::Deserialize;

/// 採寸アルゴリズムのキャリブレーション定数
///
/// 経験的に調整された比率の集合。再調整はコード変更ではなくこの
/// データ（TOML）の差し替えで行う。各比率の由来は実測データの
/// 無い近似であり、変更は計測セマンティクスを静かに変える点に注意。
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConstants {
    /// 胸部幅 = 肩幅 × この比率
    #[serde(default = "default_chest_breadth_ratio")]
    pub chest_breadth_ratio: f32,
    /// 胸部前後径（半軸） = 胸部半幅 × この比率
    #[serde(default = "default_chest_depth_ratio")]
    pub chest_depth_ratio: f32,
    /// ウエスト幅 = 腰関節間距離 × この比率
    #[serde(default = "default_waist_breadth_ratio")]
    pub waist_breadth_ratio: f32,
    #[serde(default = "default_waist_depth_ratio")]
    pub waist_depth_ratio: f32,
    /// ヒップ幅 = 腰関節間距離 × この比率（関節は体の内側にある）
    #[serde(default = "default_hip_breadth_ratio")]
    pub hip_breadth_ratio: f32,
    #[serde(default = "default_hip_depth_ratio")]
    pub hip_depth_ratio: f32,
    /// 首回り = 肩幅(cm) × この比率
    #[serde(default = "default_neck_shoulder_ratio")]
    pub neck_shoulder_ratio: f32,
    /// アンダーバスト = 胸囲 × この比率
    #[serde(default = "default_underbust_chest_ratio")]
    pub underbust_chest_ratio: f32,
    /// 四肢の周囲長 = セグメント長 × 各乗数
    #[serde(default = "default_bicep_ratio")]
    pub bicep_ratio: f32,
    #[serde(default = "default_forearm_ratio")]
    pub forearm_ratio: f32,
    #[serde(default = "default_thigh_ratio")]
    pub thigh_ratio: f32,
    #[serde(default = "default_knee_ratio")]
    pub knee_ratio: f32,
    #[serde(default = "default_calf_ratio")]
    pub calf_ratio: f32,
    #[serde(default = "default_ankle_ratio")]
    pub ankle_ratio: f32,
    /// 総丈 = 股下 × この比率
    #[serde(default = "default_outseam_inseam_ratio")]
    pub outseam_inseam_ratio: f32,
}

fn default_chest_breadth_ratio() -> f32 { 1.0 }
fn default_chest_depth_ratio() -> f32 { 0.65 }
fn default_waist_breadth_ratio() -> f32 { 1.7 }
fn default_waist_depth_ratio() -> f32 { 0.75 }
fn default_hip_breadth_ratio() -> f32 { 2.0 }
fn default_hip_depth_ratio() -> f32 { 0.8 }
fn default_neck_shoulder_ratio() -> f32 { 0.95 }
fn default_underbust_chest_ratio() -> f32 { 0.9 }
fn default_bicep_ratio() -> f32 { 1.0 }
fn default_forearm_ratio() -> f32 { 0.95 }
fn default_thigh_ratio() -> f32 { 1.35 }
fn default_knee_ratio() -> f32 { 0.9 }
fn default_calf_ratio() -> f32 { 0.9 }
fn default_ankle_ratio() -> f32 { 0.55 }
fn default_outseam_inseam_ratio() -> f32 { 1.32 }

impl Default for CalibrationConstants {
    fn default() -> Self {
        Self {
            chest_breadth_ratio: default_chest_breadth_ratio(),
            chest_depth_ratio: default_chest_depth_ratio(),
            waist_breadth_ratio: default_waist_breadth_ratio(),
            waist_depth_ratio: default_waist_depth_ratio(),
            hip_breadth_ratio: default_hip_breadth_ratio(),
            hip_depth_ratio: default_hip_depth_ratio(),
            neck_shoulder_ratio: default_neck_shoulder_ratio(),
            underbust_chest_ratio: default_underbust_chest_ratio(),
            bicep_ratio: default_bicep_ratio(),
            forearm_ratio: default_forearm_ratio(),
            thigh_ratio: default_thigh_ratio(),
            knee_ratio: default_knee_ratio(),
            calf_ratio: default_calf_ratio(),
            ankle_ratio: default_ankle_ratio(),
            outseam_inseam_ratio: default_outseam_inseam_ratio(),
        }
    }
}
