use thiserror::Error;

/// キャプチャパイプラインの失敗型
///
/// 失敗は値として上位（フローコントローラ）へ伝播し、
/// リトライ可否の判断はコントローラのみが行う。
#[derive(Error, Debug)]
pub enum CaptureError {
    /// フレームバッファが未到着（即時リトライ可）
    #[error("no frame buffer available")]
    MissingFrame,

    /// 姿勢検出に失敗（人物がフレーム内にいない）
    #[error("no body detected in frame")]
    MissingBody,

    /// キャプチャ要求が既に進行中（at-most-one-in-flight違反）
    #[error("a capture request is already in flight")]
    CaptureInProgress,

    /// 画像エンコード失敗（この試行のみ失敗、撮影からやり直し）
    #[error("image encoding failed: {0}")]
    ImageEncodingFailed(String),

    /// セッション停止中、または停止によって保留中の要求が打ち切られた
    #[error("capture session is not running")]
    SessionStopped,

    /// アーティファクト書き込み・読み出し失敗
    #[error("artifact storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl CaptureError {
    /// セッション状態を維持したまま同じ撮影ステップをやり直せるか
    pub fn retry_in_place(&self) -> bool {
        matches!(
            self,
            Self::MissingFrame
                | Self::MissingBody
                | Self::CaptureInProgress
                | Self::ImageEncodingFailed(_)
                | Self::Storage(_)
        )
    }
}

/// 計測結果送信APIの失敗型
///
/// リトライ・バックオフはAPIクライアント側の責務。ここでは値として返すのみ。
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_in_place() {
        assert!(CaptureError::MissingFrame.retry_in_place());
        assert!(CaptureError::MissingBody.retry_in_place());
        assert!(CaptureError::CaptureInProgress.retry_in_place());
        assert!(CaptureError::ImageEncodingFailed("oops".into()).retry_in_place());
        assert!(!CaptureError::SessionStopped.retry_in_place());
    }
}
