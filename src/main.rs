//! 採寸デモ: 合成フレームソースとスクリプト検出器でフロー全体を
//! 通しで実行し、計測結果のテーブルを表示する。

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

use saisun::camera::{CameraIntrinsics, CaptureSession, ColorFrame, DepthFrame, FrameEvent, FrameSource};
use saisun::config::Config;
use saisun::error::{ApiError, Result as CaptureResult};
use saisun::estimator::{MeasurementEstimator, MeasurementName};
use saisun::flow::{
    CameraPermission, CountdownStep, FlowController, MeasurementApi, PermissionGate,
    SubmissionReceipt, SubmissionRequest,
};
use saisun::pose::{DetectedJoint, DetectedPose, PoseDetector};
use saisun::processor::FrameProcessor;
use saisun::storage::DirStore;

const CONFIG_PATH: &str = "saisun.toml";

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

/// 33ms周期でカラーフレーム、10フレームごとに深度を流す合成ソース
#[derive(Default)]
struct SyntheticSource {
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl FrameSource for SyntheticSource {
    fn start(&mut self) -> CaptureResult<mpsc::Receiver<FrameEvent>> {
        let (tx, rx) = mpsc::channel(4);
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(33));
            let mut frame_no = 0u64;
            loop {
                ticker.tick().await;
                frame_no += 1;
                let timestamp_ms = frame_no * 33;

                if frame_no % 10 == 0 {
                    let depth = DepthFrame {
                        width: 16,
                        height: 12,
                        samples: vec![1.9; 16 * 12],
                        intrinsics: CameraIntrinsics::from_vertical_fov(60.0, 16, 12),
                        timestamp_ms,
                    };
                    if tx.send(FrameEvent::Depth(depth)).await.is_err() {
                        break;
                    }
                }

                let data = vec![96u8; (FRAME_WIDTH * FRAME_HEIGHT * 3) as usize];
                let frame = ColorFrame::new(FRAME_WIDTH, FRAME_HEIGHT, data, timestamp_ms);
                if tx.send(FrameEvent::Color(frame)).await.is_err() {
                    break;
                }
            }
        }));
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// 直立姿勢を返すスクリプト検出器
struct DemoDetector;

impl PoseDetector for DemoDetector {
    fn detect(&self, _frame: &ColorFrame) -> CaptureResult<Option<DetectedPose>> {
        Ok(Some(DetectedPose {
            joints: vec![
                DetectedJoint::new("nose", 0.50, 0.16, 0.92),
                DetectedJoint::new("left_ear", 0.46, 0.15, 0.85),
                DetectedJoint::new("right_ear", 0.54, 0.15, 0.85),
                DetectedJoint::new("left_shoulder", 0.42, 0.30, 0.95),
                DetectedJoint::new("right_shoulder", 0.58, 0.30, 0.95),
                DetectedJoint::new("left_elbow", 0.38, 0.42, 0.88),
                DetectedJoint::new("right_elbow", 0.62, 0.42, 0.88),
                DetectedJoint::new("left_wrist", 0.36, 0.54, 0.84),
                DetectedJoint::new("right_wrist", 0.64, 0.54, 0.84),
                DetectedJoint::new("left_hip", 0.45, 0.52, 0.93),
                DetectedJoint::new("right_hip", 0.55, 0.52, 0.93),
                DetectedJoint::new("left_knee", 0.45, 0.70, 0.90),
                DetectedJoint::new("right_knee", 0.55, 0.70, 0.90),
                DetectedJoint::new("left_ankle", 0.45, 0.88, 0.87),
                DetectedJoint::new("right_ankle", 0.55, 0.88, 0.87),
            ],
        }))
    }
}

struct AutoGrant;

impl PermissionGate for AutoGrant {
    async fn request_camera_access(&self) -> CameraPermission {
        CameraPermission::Granted
    }

    fn device_capable(&self) -> bool {
        true
    }
}

/// 送信をログに出すだけのAPIスタブ
struct StdoutApi;

impl MeasurementApi for StdoutApi {
    async fn submit(
        &self,
        request: SubmissionRequest<'_>,
    ) -> std::result::Result<SubmissionReceipt, ApiError> {
        info!(
            session_id = %request.session_id,
            confidence = request.measurements.confidence,
            "submitting measurements"
        );
        Ok(SubmissionReceipt {
            reference: format!("demo-receipt-{}", request.front.captured_at_ms),
        })
    }
}

async fn capture_stage<G: PermissionGate, A: MeasurementApi>(
    flow: &mut FlowController<G, A>,
    stage: &str,
) -> Result<()> {
    let mut remaining = flow.start_countdown()?;
    while remaining > 0 {
        println!("{stage}撮影まで {remaining} 秒...");
        sleep(Duration::from_secs(1)).await;
        match flow.tick()? {
            CountdownStep::Remaining(n) => remaining = n,
            CountdownStep::Capture => break,
        }
    }
    flow.capture_photo().await?;
    println!("{stage}を撮影しました");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("saisun demo ({})", env!("GIT_VERSION"));

    let mut config = Config::load_or_default(CONFIG_PATH);
    // デモ用にカウントダウンを短縮
    config.flow.countdown_front_secs = 3;
    config.flow.countdown_side_secs = 2;

    let session_dir = std::env::temp_dir().join(format!("saisun_demo_{}", std::process::id()));
    let store = Arc::new(DirStore::create(&session_dir)?);

    println!("=== Saisun 採寸デモ ===");
    println!("アーティファクト保存先: {}", session_dir.display());
    println!();

    let processor = FrameProcessor::new(
        Arc::new(DemoDetector),
        store.clone(),
        config.capture.clone(),
    );
    let session = Arc::new(CaptureSession::new(
        Box::new(SyntheticSource::default()),
        processor,
    ));
    let estimator = MeasurementEstimator::new(config.calibration.clone());
    let mut flow = FlowController::new(
        session,
        store,
        estimator,
        AutoGrant,
        StdoutApi,
        config.flow.clone(),
        format!("demo-{}", std::process::id()),
    );
    flow.set_reference_height(Some(172.0));

    flow.begin().await?;
    for stage in ["正面", "側面"] {
        capture_stage(&mut flow, stage).await?;
        flow.accept()?;
    }

    let measurements = flow.process_and_submit().await?;

    println!();
    println!("計測結果 ({}):", measurements.algorithm_version);
    for name in MeasurementName::ALL {
        println!("  {:<18} {:>7.1} cm", name.as_str(), measurements.get(name));
    }
    println!();
    println!("信頼度: {:.2}", measurements.confidence);

    Ok(())
}
