use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::frame::{DepthFrame, FrameEvent, FrameSource};
use crate::error::{CaptureError, Result};
use crate::processor::FrameProcessor;
use crate::storage::CapturedBundle;

type PendingRequest = oneshot::Sender<Result<CapturedBundle>>;

/// ハードウェアキャプチャセッション
///
/// フレーム配信はプッシュ型（ハードウェア駆動）、キャプチャ要求は
/// プル型（呼び出し側駆動）。両者を1スロットの保留要求レジスタで
/// 橋渡しする:
/// - フレーム到着時に要求が保留中なら、アトミックに取り出して解決する
/// - 保留要求が無ければフレームは破棄する（キューイングしない）
/// - 深度は低レートの別チャンネルで届くため最新値のみキャッシュし、
///   次のカラーフレームと機会的にペアリングする
///
/// 同時に保留できる要求は最大1つ。2つ目は `CaptureInProgress` で
/// 即座に失敗する（ブロックも黙殺もしない）。
pub struct CaptureSession {
    source: Mutex<Box<dyn FrameSource>>,
    processor: Arc<FrameProcessor>,
    pending: Arc<Mutex<Option<PendingRequest>>>,
    last_depth: Arc<Mutex<Option<DepthFrame>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSession {
    pub fn new(source: Box<dyn FrameSource>, processor: FrameProcessor) -> Self {
        Self {
            source: Mutex::new(source),
            processor: Arc::new(processor),
            pending: Arc::new(Mutex::new(None)),
            last_depth: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// キャプチャパイプラインを開始する。既に稼働中なら何もしない。
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return Ok(());
        }

        let rx = self.source.lock().start()?;
        let pending = Arc::clone(&self.pending);
        let last_depth = Arc::clone(&self.last_depth);
        let processor = Arc::clone(&self.processor);

        *task = Some(tokio::spawn(frame_loop(rx, pending, last_depth, processor)));
        debug!("capture session started");
        Ok(())
    }

    /// フレーム配信を停止しハードウェアを解放する。冪等。
    ///
    /// 保留中の要求は `SessionStopped` で明示的に失敗させる
    /// （呼び出し側を永遠に待たせない）。
    pub fn stop(&self) {
        self.source.lock().stop();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        if let Some(request) = self.pending.lock().take() {
            let _ = request.send(Err(CaptureError::SessionStopped));
        }
        *self.last_depth.lock() = None;
        debug!("capture session stopped");
    }

    /// エラー状態からの回復、または新しいセッションの開始
    pub fn reset(&self) -> Result<()> {
        self.stop();
        self.start()
    }

    /// 次のフレームをキャプチャして処理済みバンドルを返す
    ///
    /// 要求を登録し、次のカラーフレームが処理されるまでサスペンドする。
    /// 既に要求が保留中なら `CaptureInProgress`。
    pub async fn capture_current_frame(&self) -> Result<CapturedBundle> {
        if !self.is_running() {
            return Err(CaptureError::SessionStopped);
        }

        let receiver = {
            let mut slot = self.pending.lock();
            if slot.is_some() {
                return Err(CaptureError::CaptureInProgress);
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(tx);
            rx
        };

        // 登録とstop()の競合: 停止済みなら自分の要求を回収して失敗させる
        if !self.is_running() {
            self.pending.lock().take();
            return Err(CaptureError::SessionStopped);
        }

        receiver
            .await
            .map_err(|_| CaptureError::SessionStopped)?
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// フレーム処理ループ（専用タスク上で走る）
async fn frame_loop(
    mut rx: mpsc::Receiver<FrameEvent>,
    pending: Arc<Mutex<Option<PendingRequest>>>,
    last_depth: Arc<Mutex<Option<DepthFrame>>>,
    processor: Arc<FrameProcessor>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            FrameEvent::Depth(depth) => {
                *last_depth.lock() = Some(depth);
            }
            FrameEvent::Color(frame) => {
                let Some(request) = pending.lock().take() else {
                    trace!(timestamp_ms = frame.timestamp_ms, "no pending request, frame dropped");
                    continue;
                };
                let depth = last_depth.lock().clone();
                let result = processor.process(&frame, depth.as_ref());
                // 受信側が消えていても問題ない（キャンセル済み）
                let _ = request.send(result);
            }
        }
    }

    // ソースが閉じた。残った保留要求を起こす。
    if let Some(request) = pending.lock().take() {
        let _ = request.send(Err(CaptureError::SessionStopped));
    }
    debug!("frame loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::frame::{CameraIntrinsics, ColorFrame};
    use crate::config::CaptureConfig;
    use crate::error::Result;
    use crate::pose::{DetectedJoint, DetectedPose, PoseDetector};
    use crate::storage::MemoryStore;

    /// テストから手動でフレームを流し込むソース
    struct ScriptedSource {
        rx: Option<mpsc::Receiver<FrameEvent>>,
        stopped: Arc<Mutex<bool>>,
    }

    impl ScriptedSource {
        fn new() -> (Self, mpsc::Sender<FrameEvent>, Arc<Mutex<bool>>) {
            let (tx, rx) = mpsc::channel(8);
            let stopped = Arc::new(Mutex::new(false));
            (
                Self {
                    rx: Some(rx),
                    stopped: stopped.clone(),
                },
                tx,
                stopped,
            )
        }
    }

    impl FrameSource for ScriptedSource {
        fn start(&mut self) -> Result<mpsc::Receiver<FrameEvent>> {
            self.rx.take().ok_or(CaptureError::SessionStopped)
        }

        fn stop(&mut self) {
            *self.stopped.lock() = true;
        }
    }

    struct FixedDetector;

    impl PoseDetector for FixedDetector {
        fn detect(&self, _frame: &ColorFrame) -> Result<Option<DetectedPose>> {
            Ok(Some(DetectedPose {
                joints: vec![
                    DetectedJoint::new("left_shoulder", 0.4, 0.3, 0.9),
                    DetectedJoint::new("right_shoulder", 0.6, 0.3, 0.9),
                ],
            }))
        }
    }

    fn session() -> (Arc<CaptureSession>, mpsc::Sender<FrameEvent>, Arc<Mutex<bool>>) {
        let (source, tx, stopped) = ScriptedSource::new();
        let processor = FrameProcessor::new(
            Arc::new(FixedDetector),
            Arc::new(MemoryStore::new()),
            CaptureConfig::default(),
        );
        (
            Arc::new(CaptureSession::new(Box::new(source), processor)),
            tx,
            stopped,
        )
    }

    fn color(timestamp_ms: u64) -> FrameEvent {
        FrameEvent::Color(ColorFrame::new(8, 8, vec![100u8; 8 * 8 * 3], timestamp_ms))
    }

    fn depth(value: f32) -> FrameEvent {
        FrameEvent::Depth(DepthFrame {
            width: 4,
            height: 4,
            samples: vec![value; 16],
            intrinsics: CameraIntrinsics::from_vertical_fov(60.0, 4, 4),
            timestamp_ms: 0,
        })
    }

    #[tokio::test]
    async fn test_capture_resolves_with_next_frame() {
        let (session, tx, _) = session();
        session.start().unwrap();

        let s = session.clone();
        let pending = tokio::spawn(async move { s.capture_current_frame().await });
        tokio::task::yield_now().await;

        tx.send(color(7)).await.unwrap();
        let bundle = pending.await.unwrap().unwrap();
        assert_eq!(bundle.captured_at_ms, 7);
        assert!(bundle.depth.is_none());
    }

    #[tokio::test]
    async fn test_second_request_fails_immediately() {
        let (session, _tx, _) = session();
        session.start().unwrap();

        let s = session.clone();
        let pending = tokio::spawn(async move { s.capture_current_frame().await });
        tokio::task::yield_now().await;

        // 1つ目が保留中の2つ目はブロックせず即失敗
        let err = session.capture_current_frame().await.unwrap_err();
        assert!(matches!(err, CaptureError::CaptureInProgress));
        pending.abort();
    }

    #[tokio::test]
    async fn test_frame_without_request_is_dropped() {
        let (session, tx, _) = session();
        session.start().unwrap();

        // 要求前のフレームは破棄される
        tx.send(color(1)).await.unwrap();
        tokio::task::yield_now().await;

        let s = session.clone();
        let pending = tokio::spawn(async move { s.capture_current_frame().await });
        tokio::task::yield_now().await;

        tx.send(color(2)).await.unwrap();
        let bundle = pending.await.unwrap().unwrap();
        // 要求後の「次の」フレームで解決される（古いフレームではない）
        assert_eq!(bundle.captured_at_ms, 2);
    }

    #[tokio::test]
    async fn test_latest_depth_is_paired_with_next_color() {
        let (session, tx, _) = session();
        session.start().unwrap();

        tx.send(depth(1.0)).await.unwrap();
        tx.send(depth(1.5)).await.unwrap();
        tokio::task::yield_now().await;

        let s = session.clone();
        let pending = tokio::spawn(async move { s.capture_current_frame().await });
        tokio::task::yield_now().await;

        tx.send(color(3)).await.unwrap();
        let bundle = pending.await.unwrap().unwrap();
        // 最新の深度がペアリングされている
        assert!(bundle.depth.is_some());
    }

    #[tokio::test]
    async fn test_stop_fails_pending_request() {
        let (session, _tx, stopped) = session();
        session.start().unwrap();

        let s = session.clone();
        let pending = tokio::spawn(async move { s.capture_current_frame().await });
        tokio::task::yield_now().await;

        session.stop();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, CaptureError::SessionStopped));
        assert!(*stopped.lock());
    }

    #[tokio::test]
    async fn test_capture_after_stop_fails() {
        let (session, _tx, _) = session();
        session.start().unwrap();
        session.stop();

        let err = session.capture_current_frame().await.unwrap_err();
        assert!(matches!(err, CaptureError::SessionStopped));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (session, tx, _) = session();
        session.start().unwrap();
        // 2回目はno-op（ソースの再startは呼ばれない）
        session.start().unwrap();
        assert!(session.is_running());

        let s = session.clone();
        let pending = tokio::spawn(async move { s.capture_current_frame().await });
        tokio::task::yield_now().await;
        tx.send(color(9)).await.unwrap();
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_request_after_fulfillment_works() {
        let (session, tx, _) = session();
        session.start().unwrap();

        for ts in [10u64, 11] {
            let s = session.clone();
            let pending = tokio::spawn(async move { s.capture_current_frame().await });
            tokio::task::yield_now().await;
            tx.send(color(ts)).await.unwrap();
            let bundle = pending.await.unwrap().unwrap();
            assert_eq!(bundle.captured_at_ms, ts);
        }
    }
}
