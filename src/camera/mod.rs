pub mod frame;
pub mod session;

pub use frame::{CameraIntrinsics, ColorFrame, DepthFrame, FrameEvent, FrameSource};
pub use session::CaptureSession;
