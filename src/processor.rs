use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tracing::{debug, warn};

use crate::camera::frame::{CameraIntrinsics, ColorFrame, DepthFrame};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::pose::{derive_auxiliary_joints, JointName, JointRecord, JointSet, PoseDetector};
use crate::projection::project_detection;
use crate::storage::{ArtifactStore, CapturedBundle};

/// 1組の（カラー, 任意の深度）フレームを永続化済みバンドルへ変換する
///
/// 手順: 姿勢検出 → 閾値以上の関節を3D化 → 補助関節の合成 →
/// JPEG化 → 画像・深度・関節セットをセッションストアへ書き込み。
pub struct FrameProcessor {
    detector: Arc<dyn PoseDetector>,
    store: Arc<dyn ArtifactStore>,
    config: CaptureConfig,
}

impl FrameProcessor {
    pub fn new(
        detector: Arc<dyn PoseDetector>,
        store: Arc<dyn ArtifactStore>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            detector,
            store,
            config,
        }
    }

    pub fn process(
        &self,
        frame: &ColorFrame,
        depth: Option<&DepthFrame>,
    ) -> Result<CapturedBundle> {
        if frame.data.is_empty() {
            return Err(CaptureError::MissingFrame);
        }

        let pose = self
            .detector
            .detect(frame)?
            .ok_or(CaptureError::MissingBody)?;
        if !pose.any_above(self.config.min_joint_confidence) {
            return Err(CaptureError::MissingBody);
        }

        let joints = self.project_pose(&pose, frame, depth);
        if joints.is_empty() {
            // ラベルが全て未知だった場合も身体なし扱い
            return Err(CaptureError::MissingBody);
        }

        let prefix = format!("capture_{}", frame.timestamp_ms);

        let jpeg = encode_jpeg(frame, self.config.jpeg_quality)?;
        let image = self.store.write(&format!("{prefix}.jpg"), &jpeg)?;

        let depth_ref = match depth {
            Some(depth_frame) => {
                let bytes = bincode::serialize(depth_frame)
                    .map_err(|e| CaptureError::ImageEncodingFailed(e.to_string()))?;
                Some(self.store.write(&format!("{prefix}_depth.bin"), &bytes)?)
            }
            None => None,
        };

        let record = JointRecord {
            timestamp_ms: frame.timestamp_ms,
            joints,
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| CaptureError::ImageEncodingFailed(e.to_string()))?;
        let joints_ref = self.store.write(&format!("{prefix}_joints.json"), &json)?;

        debug!(
            timestamp_ms = frame.timestamp_ms,
            joints = record.joints.len(),
            has_depth = depth.is_some(),
            "capture persisted"
        );

        Ok(CapturedBundle {
            image,
            depth: depth_ref,
            joints: Some(joints_ref),
            captured_at_ms: frame.timestamp_ms,
        })
    }

    /// 検出結果を正規関節名へ解決し、3Dへ投影する
    fn project_pose(
        &self,
        pose: &crate::pose::DetectedPose,
        frame: &ColorFrame,
        depth: Option<&DepthFrame>,
    ) -> JointSet {
        let fallback_intrinsics = CameraIntrinsics::from_vertical_fov(
            self.config.fallback_fov_v_deg,
            frame.width,
            frame.height,
        );

        let mut joints = JointSet::new();
        for detection in &pose.joints {
            if detection.confidence < self.config.min_joint_confidence {
                continue;
            }
            let Some(name) = JointName::from_detector_label(&detection.label) else {
                warn!(label = %detection.label, "unknown joint label, dropping");
                continue;
            };
            let position = project_detection(
                detection.x,
                detection.y,
                depth,
                self.config.fallback_depth_m,
                &fallback_intrinsics,
            );
            joints.insert(name, position);
        }

        derive_auxiliary_joints(&mut joints);
        joints
    }
}

/// カラーフレームをJPEGへエンコードする
fn encode_jpeg(frame: &ColorFrame, quality: u8) -> Result<Vec<u8>> {
    if !frame.is_complete() {
        return Err(CaptureError::ImageEncodingFailed(format!(
            "buffer length {} does not match {}x{} RGB8",
            frame.data.len(),
            frame.width,
            frame.height
        )));
    }
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .write_image(
            &frame.data,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CaptureError::ImageEncodingFailed(e.to_string()))?;
    Ok(buf)
}
