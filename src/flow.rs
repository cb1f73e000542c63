use std::mem;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::CaptureSession;
use crate::config::FlowConfig;
use crate::error::{ApiError, CaptureError};
use crate::estimator::{MeasurementEstimator, MeasurementSet};
use crate::pose::{JointRecord, JointSet};
use crate::storage::{ArtifactStore, CapturedBundle};

/// カメラ権限の確認結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPermission {
    Granted,
    Denied,
}

/// 権限・デバイス能力チェックの境界トレイト
pub trait PermissionGate {
    /// カメラ権限を要求する（プロンプト表示中はサスペンドする）
    async fn request_camera_access(&self) -> CameraPermission;
    /// 撮影に使えるカメラをデバイスが持つか
    fn device_capable(&self) -> bool;
}

/// 計測結果の送信要求
pub struct SubmissionRequest<'a> {
    pub session_id: &'a str,
    pub front: &'a CapturedBundle,
    pub side: &'a CapturedBundle,
    pub measurements: &'a MeasurementSet,
}

#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub reference: String,
}

/// 計測結果送信APIの境界トレイト
///
/// リトライ・バックオフはこのコアの責務外（APIクライアント側で行う）。
pub trait MeasurementApi {
    async fn submit(&self, request: SubmissionRequest<'_>) -> Result<SubmissionReceipt, ApiError>;
}

/// 終端エラー状態の内容
#[derive(Debug, Clone)]
pub struct FlowFailure {
    pub message: String,
    /// デバイスが撮影に対応していない場合true。
    /// 提示層はこのフラグで手動入力フォールバックへの誘導を選ぶ。
    pub manual_fallback: bool,
}

/// キャプチャフローの状態
///
/// ペイロードを持つ状態はタグ付きで表現し、不正な組み合わせ
/// （例: Idleなのにバンドルを保持）を型で排除する。
#[derive(Debug)]
pub enum FlowState {
    Idle,
    RequestingPermissions,
    ReadyForFront,
    CountdownFront(u32),
    CapturingFront,
    ReviewFront(CapturedBundle),
    ReadyForSide {
        front: CapturedBundle,
    },
    CountdownSide {
        front: CapturedBundle,
        remaining: u32,
    },
    CapturingSide {
        front: CapturedBundle,
    },
    ReviewSide {
        front: CapturedBundle,
        side: CapturedBundle,
    },
    Processing {
        front: CapturedBundle,
        side: CapturedBundle,
    },
    Completed,
    Error(FlowFailure),
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::RequestingPermissions => "RequestingPermissions",
            Self::ReadyForFront => "ReadyForFront",
            Self::CountdownFront(_) => "CountdownFront",
            Self::CapturingFront => "CapturingFront",
            Self::ReviewFront(_) => "ReviewFront",
            Self::ReadyForSide { .. } => "ReadyForSide",
            Self::CountdownSide { .. } => "CountdownSide",
            Self::CapturingSide { .. } => "CapturingSide",
            Self::ReviewSide { .. } => "ReviewSide",
            Self::Processing { .. } => "Processing",
            Self::Completed => "Completed",
            Self::Error(_) => "Error",
        }
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("{operation} is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("camera permission denied")]
    PermissionDenied,

    #[error("device lacks a usable camera")]
    DeviceUnsupported,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("submission failed: {0}")]
    Submit(#[from] ApiError),
}

/// カウントダウン1ステップの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Remaining(u32),
    Capture,
}

/// 撮影対象（正面 or 側面。側面は受理済みの正面バンドルを保持する）
enum CaptureTarget {
    Front,
    Side(CapturedBundle),
}

/// キャプチャフローコントローラ
///
/// 権限確認 → カウントダウン → 正面/側面撮影 → レビュー → 採寸 →
/// 送信を順序付ける状態機械。セッション状態の唯一の所有者であり、
/// 下位コンポーネントの失敗に対するリトライ可否もここでのみ判断する。
pub struct FlowController<G, A> {
    session: Arc<CaptureSession>,
    store: Arc<dyn ArtifactStore>,
    estimator: MeasurementEstimator,
    permissions: G,
    api: A,
    config: FlowConfig,
    session_id: String,
    /// ユーザー入力の参照身長（頭頂検出に失敗した場合のフォールバック）
    reference_height_cm: Option<f32>,
    state: FlowState,
}

impl<G: PermissionGate, A: MeasurementApi> FlowController<G, A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<CaptureSession>,
        store: Arc<dyn ArtifactStore>,
        estimator: MeasurementEstimator,
        permissions: G,
        api: A,
        config: FlowConfig,
        session_id: String,
    ) -> Self {
        Self {
            session,
            store,
            estimator,
            permissions,
            api,
            config,
            session_id,
            reference_height_cm: None,
            state: FlowState::Idle,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn set_reference_height(&mut self, height_cm: Option<f32>) {
        self.reference_height_cm = height_cm;
    }

    /// フローを開始する: 権限確認 → デバイス能力確認 → セッション起動
    pub async fn begin(&mut self) -> Result<(), FlowError> {
        if !matches!(self.state, FlowState::Idle) {
            return Err(self.invalid("begin"));
        }
        self.transition(FlowState::RequestingPermissions);

        match self.permissions.request_camera_access().await {
            CameraPermission::Denied => {
                self.enter_error("camera permission denied", false);
                return Err(FlowError::PermissionDenied);
            }
            CameraPermission::Granted => {}
        }

        if !self.permissions.device_capable() {
            // 前面カメラの無いデバイス: 手動入力フォールバックへ誘導する
            self.enter_error("device lacks a usable camera", true);
            return Err(FlowError::DeviceUnsupported);
        }

        if let Err(e) = self.session.start() {
            self.enter_error(&e.to_string(), false);
            return Err(e.into());
        }
        self.transition(FlowState::ReadyForFront);
        Ok(())
    }

    /// カウントダウンを開始し、残り秒数を返す
    pub fn start_countdown(&mut self) -> Result<u32, FlowError> {
        match self.take_state() {
            FlowState::ReadyForFront => {
                let n = self.config.countdown_front_secs;
                if n == 0 {
                    self.transition(FlowState::CapturingFront);
                } else {
                    self.transition(FlowState::CountdownFront(n));
                }
                Ok(n)
            }
            FlowState::ReadyForSide { front } => {
                let n = self.config.countdown_side_secs;
                if n == 0 {
                    self.transition(FlowState::CapturingSide { front });
                } else {
                    self.transition(FlowState::CountdownSide {
                        front,
                        remaining: n,
                    });
                }
                Ok(n)
            }
            other => {
                self.state = other;
                Err(self.invalid("start_countdown"))
            }
        }
    }

    /// カウントダウンを1秒進める
    pub fn tick(&mut self) -> Result<CountdownStep, FlowError> {
        match self.take_state() {
            FlowState::CountdownFront(1) => {
                self.transition(FlowState::CapturingFront);
                Ok(CountdownStep::Capture)
            }
            FlowState::CountdownFront(n) if n > 1 => {
                self.transition(FlowState::CountdownFront(n - 1));
                Ok(CountdownStep::Remaining(n - 1))
            }
            FlowState::CountdownSide {
                front,
                remaining: 1,
            } => {
                self.transition(FlowState::CapturingSide { front });
                Ok(CountdownStep::Capture)
            }
            FlowState::CountdownSide { front, remaining } if remaining > 1 => {
                self.transition(FlowState::CountdownSide {
                    front,
                    remaining: remaining - 1,
                });
                Ok(CountdownStep::Remaining(remaining - 1))
            }
            other => {
                self.state = other;
                Err(self.invalid("tick"))
            }
        }
    }

    /// カウントダウンを中断して撮影準備状態に戻す
    ///
    /// タイマーの副作用は残らない: セッションは稼働したまま、
    /// キャプチャ要求は発行されない。
    pub fn cancel_countdown(&mut self) -> Result<(), FlowError> {
        match self.take_state() {
            FlowState::CountdownFront(_) => {
                self.transition(FlowState::ReadyForFront);
                Ok(())
            }
            FlowState::CountdownSide { front, .. } => {
                self.transition(FlowState::ReadyForSide { front });
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("cancel_countdown"))
            }
        }
    }

    /// カウントダウンを1Hzで駆動する。キャンセルで即座に中断する。
    ///
    /// 戻り値: 撮影状態まで到達したらtrue、キャンセルされたらfalse。
    pub async fn run_countdown(&mut self, cancel: &CancellationToken) -> Result<bool, FlowError> {
        self.start_countdown()?;
        if matches!(
            self.state,
            FlowState::CapturingFront | FlowState::CapturingSide { .. }
        ) {
            return Ok(true);
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cancel_countdown()?;
                    return Ok(false);
                }
                _ = sleep(Duration::from_secs(1)) => {
                    if matches!(self.tick()?, CountdownStep::Capture) {
                        return Ok(true);
                    }
                }
            }
        }
    }

    /// 現在の撮影対象のフレームをキャプチャする
    ///
    /// リトライ可能な失敗（MissingBody等）は撮影準備状態へ戻して
    /// エラー値を返す。セッション停止は終端エラー。
    pub async fn capture_photo(&mut self) -> Result<(), FlowError> {
        let target = match self.take_state() {
            FlowState::CapturingFront => CaptureTarget::Front,
            FlowState::CapturingSide { front } => CaptureTarget::Side(front),
            other => {
                self.state = other;
                return Err(self.invalid("capture_photo"));
            }
        };

        match self.session.capture_current_frame().await {
            Ok(bundle) => {
                match target {
                    CaptureTarget::Front => self.transition(FlowState::ReviewFront(bundle)),
                    CaptureTarget::Side(front) => {
                        self.transition(FlowState::ReviewSide {
                            front,
                            side: bundle,
                        });
                    }
                }
                Ok(())
            }
            Err(e) if e.retry_in_place() => {
                warn!(error = %e, "capture failed, returning to ready state");
                match target {
                    CaptureTarget::Front => self.transition(FlowState::ReadyForFront),
                    CaptureTarget::Side(front) => {
                        self.transition(FlowState::ReadyForSide { front });
                    }
                }
                Err(e.into())
            }
            Err(e) => {
                self.enter_error(&e.to_string(), false);
                Err(e.into())
            }
        }
    }

    /// レビュー中のバンドルを受理して次の段階へ進む
    pub fn accept(&mut self) -> Result<(), FlowError> {
        match self.take_state() {
            FlowState::ReviewFront(front) => {
                self.transition(FlowState::ReadyForSide { front });
                Ok(())
            }
            FlowState::ReviewSide { front, side } => {
                self.transition(FlowState::Processing { front, side });
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("accept"))
            }
        }
    }

    /// レビュー中のバンドルを破棄して同じ撮影をやり直す
    pub fn retake(&mut self) -> Result<(), FlowError> {
        match self.take_state() {
            FlowState::ReviewFront(bundle) => {
                self.discard(&bundle);
                self.transition(FlowState::ReadyForFront);
                Ok(())
            }
            FlowState::ReviewSide { front, side } => {
                self.discard(&side);
                self.transition(FlowState::ReadyForSide { front });
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("retake"))
            }
        }
    }

    /// 受理済みの正面バンドルから採寸し、結果を送信する
    ///
    /// エスティメータは決して失敗しない。送信失敗は終端エラーとして
    /// そのまま表面化する（自動リトライしない）。
    pub async fn process_and_submit(&mut self) -> Result<MeasurementSet, FlowError> {
        let (front, side) = match self.take_state() {
            FlowState::Processing { front, side } => (front, side),
            other => {
                self.state = other;
                return Err(self.invalid("process_and_submit"));
            }
        };

        let joints = self.load_joints(&front);
        let measurements = self
            .estimator
            .estimate(&joints, self.reference_height_cm);

        let request = SubmissionRequest {
            session_id: &self.session_id,
            front: &front,
            side: &side,
            measurements: &measurements,
        };
        match self.api.submit(request).await {
            Ok(receipt) => {
                info!(reference = %receipt.reference, "measurements submitted");
                self.session.stop();
                self.transition(FlowState::Completed);
                Ok(measurements)
            }
            Err(e) => {
                self.enter_error(&e.to_string(), false);
                Err(e.into())
            }
        }
    }

    /// 終端状態からフロー全体をやり直す
    pub fn reset(&mut self) {
        self.session.stop();
        self.transition(FlowState::Idle);
    }

    /// 正面バンドルの関節セットを読み出す。欠損・破損は空集合として
    /// 扱い、エスティメータのデフォルト経路に任せる。
    fn load_joints(&self, bundle: &CapturedBundle) -> JointSet {
        let Some(joints_ref) = &bundle.joints else {
            warn!("bundle has no joint artifact, estimating from defaults");
            return JointSet::default();
        };
        match self
            .store
            .read(joints_ref)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<JointRecord>(&bytes).map_err(|e| e.to_string())
            }) {
            Ok(record) => record.joints,
            Err(e) => {
                warn!(error = %e, "failed to load joint record, estimating from defaults");
                JointSet::default()
            }
        }
    }

    fn discard(&self, bundle: &CapturedBundle) {
        for artifact in bundle.refs() {
            if let Err(e) = self.store.remove(artifact) {
                debug!(name = %artifact.name, error = %e, "failed to remove discarded artifact");
            }
        }
    }

    fn take_state(&mut self) -> FlowState {
        mem::replace(&mut self.state, FlowState::Idle)
    }

    fn transition(&mut self, next: FlowState) {
        debug!(state = next.name(), "flow transition");
        self.state = next;
    }

    fn enter_error(&mut self, message: &str, manual_fallback: bool) {
        self.session.stop();
        self.transition(FlowState::Error(FlowFailure {
            message: message.to_string(),
            manual_fallback,
        }));
    }

    fn invalid(&self, operation: &'static str) -> FlowError {
        FlowError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }
}
