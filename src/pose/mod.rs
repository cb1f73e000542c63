pub mod detector;
pub mod joint;
pub mod skeleton;

pub use detector::{DetectedJoint, DetectedPose, PoseDetector};
pub use joint::{JointName, JointRecord, JointSet};
pub use skeleton::derive_auxiliary_joints;
