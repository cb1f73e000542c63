use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::estimator::constants::CalibrationConstants;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub calibration: CalibrationConstants,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// 関節採用の信頼度閾値
    #[serde(default = "default_min_joint_confidence")]
    pub min_joint_confidence: f32,
    /// JPEG品質 (0〜100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// 深度が無い場合のフォールバック深度（メートル）
    #[serde(default = "default_fallback_depth_m")]
    pub fallback_depth_m: f32,
    /// フォールバック内部パラメータ用の垂直画角（度）
    #[serde(default = "default_fallback_fov_v_deg")]
    pub fallback_fov_v_deg: f32,
}

fn default_min_joint_confidence() -> f32 { 0.3 }
fn default_jpeg_quality() -> u8 { 85 }
fn default_fallback_depth_m() -> f32 { 2.0 }
fn default_fallback_fov_v_deg() -> f32 { 60.0 }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_joint_confidence: default_min_joint_confidence(),
            jpeg_quality: default_jpeg_quality(),
            fallback_depth_m: default_fallback_depth_m(),
            fallback_fov_v_deg: default_fallback_fov_v_deg(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlowConfig {
    /// 正面撮影のカウントダウン秒数
    #[serde(default = "default_countdown_front_secs")]
    pub countdown_front_secs: u32,
    /// 側面撮影のカウントダウン秒数（正面で立ち位置が決まるため短い）
    #[serde(default = "default_countdown_side_secs")]
    pub countdown_side_secs: u32,
}

fn default_countdown_front_secs() -> u32 { 10 }
fn default_countdown_side_secs() -> u32 { 5 }

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            countdown_front_secs: default_countdown_front_secs(),
            countdown_side_secs: default_countdown_side_secs(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルが無ければデフォルトで起動
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_default()
    }
}
