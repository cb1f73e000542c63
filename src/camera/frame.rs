use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// カメラ内部パラメータ（焦点距離・主点・基準解像度）
///
/// 深度フレームに付随するキャリブレーション。逆投影でのみ使用する。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// 基準解像度（このパラメータが前提とするピクセル座標系）
    pub width: f32,
    pub height: f32,
}

impl CameraIntrinsics {
    /// 垂直画角から内部パラメータを構築（正方ピクセル・主点中央を仮定）
    pub fn from_vertical_fov(fov_v_deg: f32, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        let fy = h / (2.0 * (fov_v_deg.to_radians() / 2.0).tan());
        Self {
            fx: fy,
            fy,
            cx: w / 2.0,
            cy: h / 2.0,
            width: w,
            height: h,
        }
    }
}

/// カラーフレーム（RGB8）
#[derive(Debug, Clone)]
pub struct ColorFrame {
    pub width: u32,
    pub height: u32,
    /// RGB8、行優先、width * height * 3 バイト
    pub data: Vec<u8>,
    pub timestamp_ms: u64,
}

impl ColorFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            width,
            height,
            data,
            timestamp_ms,
        }
    }

    /// バッファ長が解像度と一致しているか
    pub fn is_complete(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

/// 深度フレーム（メートル単位のサンプル + 内部パラメータ）
///
/// カラーより低レートで届くため、セッション側で最新値をキャッシュし
/// 次のカラーフレームと機会的にペアリングする。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    /// 行優先の深度サンプル（メートル）。無効値は非正またはNaN。
    pub samples: Vec<f32>,
    pub intrinsics: CameraIntrinsics,
    pub timestamp_ms: u64,
}

impl DepthFrame {
    /// 正規化座標に対応する深度サンプルを返す。無効・範囲外はNone。
    pub fn sample_at(&self, x_norm: f32, y_norm: f32) -> Option<f32> {
        if !(0.0..=1.0).contains(&x_norm) || !(0.0..=1.0).contains(&y_norm) {
            return None;
        }
        let px = ((x_norm * self.width as f32) as usize).min(self.width as usize - 1);
        let py = ((y_norm * self.height as f32) as usize).min(self.height as usize - 1);
        let depth = *self.samples.get(py * self.width as usize + px)?;
        if depth.is_finite() && depth > 0.0 {
            Some(depth)
        } else {
            None
        }
    }
}

/// フレームソースからの配信イベント
///
/// カラーと深度は独立したチャンネルで届く（深度は低レート）。
#[derive(Debug, Clone)]
pub enum FrameEvent {
    Color(ColorFrame),
    Depth(DepthFrame),
}

/// ハードウェアフレーム配信の境界トレイト
///
/// プッシュ型: `start` が返すレシーバへハードウェアのタイミングで
/// イベントが流れる。`stop` 後は配信が止まり、送信側が閉じられる。
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<mpsc::Receiver<FrameEvent>>;
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fov_intrinsics() {
        // 90度FOV: fy = h / (2 * tan(45°)) = h / 2
        let intr = CameraIntrinsics::from_vertical_fov(90.0, 640, 480);
        assert!((intr.fy - 240.0).abs() < 1e-3);
        assert!((intr.fx - intr.fy).abs() < 1e-6);
        assert!((intr.cx - 320.0).abs() < 1e-6);
        assert!((intr.cy - 240.0).abs() < 1e-6);
    }

    #[test]
    fn test_color_frame_completeness() {
        let frame = ColorFrame::new(2, 2, vec![0u8; 12], 0);
        assert!(frame.is_complete());
        let short = ColorFrame::new(2, 2, vec![0u8; 7], 0);
        assert!(!short.is_complete());
    }

    #[test]
    fn test_depth_sample_lookup() {
        let intrinsics = CameraIntrinsics::from_vertical_fov(60.0, 4, 4);
        let mut samples = vec![1.5f32; 16];
        samples[0] = -1.0; // 無効サンプル
        samples[5] = f32::NAN;
        let depth = DepthFrame {
            width: 4,
            height: 4,
            samples,
            intrinsics,
            timestamp_ms: 0,
        };

        assert_eq!(depth.sample_at(0.0, 0.0), None);
        assert_eq!(depth.sample_at(0.3, 0.3), None); // NaN → None
        assert_eq!(depth.sample_at(0.9, 0.9), Some(1.5));
        assert_eq!(depth.sample_at(1.5, 0.5), None); // 範囲外
        // 端の座標は最終ピクセルへクランプ
        assert_eq!(depth.sample_at(1.0, 1.0), Some(1.5));
    }
}
