use nalgebra::Vector3;

use crate::camera::frame::{CameraIntrinsics, DepthFrame};

/// 正規化2D座標をカメラ座標系の3D点へ逆投影する
///
/// ピンホールモデル: X = (u - cx) * z / fx, Y = (v - cy) * z / fy, Z = z
/// (u, v) は内部パラメータの基準解像度におけるピクセル座標。
/// カメラ座標系はX右・Y下・Z前方（メートル）。
pub fn back_project(
    x_norm: f32,
    y_norm: f32,
    depth_m: f32,
    intrinsics: &CameraIntrinsics,
) -> Vector3<f32> {
    let u = x_norm * intrinsics.width;
    let v = y_norm * intrinsics.height;
    Vector3::new(
        (u - intrinsics.cx) * depth_m / intrinsics.fx,
        (v - intrinsics.cy) * depth_m / intrinsics.fy,
        depth_m,
    )
}

/// 深度の有無に応じて関節の2D検出位置を3D化する
///
/// 深度フレームがあれば対応ピクセルの実測値とそのキャリブレーションを
/// 使う。無い（またはそのピクセルが無効な）場合は固定のフォールバック
/// 深度とフォールバック内部パラメータで逆投影し、下流が深度有無で
/// 分岐せずに済むようにする。
pub fn project_detection(
    x_norm: f32,
    y_norm: f32,
    depth: Option<&DepthFrame>,
    fallback_depth_m: f32,
    fallback_intrinsics: &CameraIntrinsics,
) -> Vector3<f32> {
    if let Some(depth_frame) = depth {
        if let Some(z) = depth_frame.sample_at(x_norm, y_norm) {
            return back_project(x_norm, y_norm, z, &depth_frame.intrinsics);
        }
    }
    back_project(x_norm, y_norm, fallback_depth_m, fallback_intrinsics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_point_projects_on_axis() {
        let intr = CameraIntrinsics::from_vertical_fov(60.0, 640, 480);
        let p = back_project(0.5, 0.5, 2.0, &intr);
        assert!(p.x.abs() < 1e-5);
        assert!(p.y.abs() < 1e-5);
        assert!((p.z - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_back_project_known_point() {
        let intr = CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
            width: 640.0,
            height: 480.0,
        };
        // u = 0.75 * 640 = 480, X = (480 - 320) * 1.0 / 500 = 0.32
        let p = back_project(0.75, 0.5, 1.0, &intr);
        assert!((p.x - 0.32).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
    }

    #[test]
    fn test_depth_scales_offsets() {
        let intr = CameraIntrinsics::from_vertical_fov(60.0, 640, 480);
        let near = back_project(0.7, 0.3, 1.0, &intr);
        let far = back_project(0.7, 0.3, 3.0, &intr);
        assert!((far.x - near.x * 3.0).abs() < 1e-5);
        assert!((far.y - near.y * 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_fallback_when_depth_missing() {
        let fallback = CameraIntrinsics::from_vertical_fov(60.0, 640, 480);
        let p = project_detection(0.5, 0.5, None, 2.0, &fallback);
        assert!((p.z - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_fallback_when_depth_sample_invalid() {
        let fallback = CameraIntrinsics::from_vertical_fov(60.0, 640, 480);
        let depth = DepthFrame {
            width: 2,
            height: 2,
            samples: vec![0.0; 4], // 全サンプル無効
            intrinsics: CameraIntrinsics::from_vertical_fov(70.0, 2, 2),
            timestamp_ms: 0,
        };
        let p = project_detection(0.5, 0.5, Some(&depth), 2.0, &fallback);
        assert!((p.z - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_measured_depth_wins() {
        let fallback = CameraIntrinsics::from_vertical_fov(60.0, 640, 480);
        let depth = DepthFrame {
            width: 2,
            height: 2,
            samples: vec![1.25; 4],
            intrinsics: CameraIntrinsics::from_vertical_fov(70.0, 640, 480),
            timestamp_ms: 0,
        };
        let p = project_detection(0.5, 0.5, Some(&depth), 2.0, &fallback);
        assert!((p.z - 1.25).abs() < 1e-6);
    }
}
