/// 楕円周のRamanujan近似
///
/// h = (a - b)² / (a + b)²
/// C ≈ π(a + b)(1 + 3h / (10 + √(4 - 3h)))
///
/// 単純な平均半径近似は高離心率で1%超の誤差が出るためこちらを使う。
/// a = b（円）では 2πa と一致する。
pub fn ellipse_circumference(a: f32, b: f32) -> f32 {
    let a = a.abs();
    let b = b.abs();
    let sum = a + b;
    if sum == 0.0 {
        return 0.0;
    }
    let h = ((a - b) / sum).powi(2);
    std::f32::consts::PI * sum * (1.0 + 3.0 * h / (10.0 + (4.0 - 3.0 * h).sqrt()))
}
