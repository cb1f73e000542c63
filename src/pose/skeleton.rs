use nalgebra::Vector3;

use super::joint::{JointName, JointSet};

/// 頭頂の合成オフセット（メートル）
/// カメラ座標系はY軸が下向きのため、上方向は負のY。
/// 耳の中点から頭頂まで、および頭関節から頭頂までの経験的距離。
const HEAD_TOP_FROM_EARS_M: f32 = 0.12;
const HEAD_TOP_FROM_HEAD_M: f32 = 0.15;
const HEAD_TOP_FROM_NOSE_M: f32 = 0.18;

/// 検出器の出力に含まれない補助関節を合成する
///
/// 採寸の幾何計算は検出器の完全性に依らず最小限のスケルトンを前提と
/// するため、欠けている場合のみここで導出する:
/// - 首: 両肩の中点
/// - ルート（骨盤）: 両腰の中点
/// - 頭頂: 耳の中点（なければ頭、鼻）に垂直オフセット
/// - 脊椎下・中・上: ルート→首の線形補間 (t = 0.25, 0.5, 0.75)
pub fn derive_auxiliary_joints(joints: &mut JointSet) {
    if !joints.contains(JointName::Neck) {
        if let Some(mid) = joints.midpoint(JointName::LeftShoulder, JointName::RightShoulder) {
            joints.insert(JointName::Neck, mid);
        }
    }

    if !joints.contains(JointName::Root) {
        if let Some(mid) = joints.midpoint(JointName::LeftHip, JointName::RightHip) {
            joints.insert(JointName::Root, mid);
        }
    }

    if !joints.contains(JointName::HeadTop) {
        if let Some(top) = synthesize_head_top(joints) {
            joints.insert(JointName::HeadTop, top);
        }
    }

    if let (Some(neck), Some(root)) = (joints.get(JointName::Neck), joints.get(JointName::Root)) {
        for (name, t) in [
            (JointName::SpineLower, 0.25),
            (JointName::SpineMid, 0.5),
            (JointName::SpineUpper, 0.75),
        ] {
            if !joints.contains(name) {
                joints.insert(name, root + (neck - root) * t);
            }
        }
    }
}

fn synthesize_head_top(joints: &JointSet) -> Option<Vector3<f32>> {
    let up = -Vector3::y();
    if let Some(ears) = joints.midpoint(JointName::LeftEar, JointName::RightEar) {
        return Some(ears + up * HEAD_TOP_FROM_EARS_M);
    }
    if let Some(head) = joints.get(JointName::Head) {
        return Some(head + up * HEAD_TOP_FROM_HEAD_M);
    }
    joints
        .get(JointName::Nose)
        .map(|nose| nose + up * HEAD_TOP_FROM_NOSE_M)
}
