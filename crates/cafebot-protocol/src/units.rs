//! 单位换算
//!
//! 配置服务和驱动都以「度」报告姿态角，上层统一使用弧度并保留 4 位小数。
//! 偏移向量布局：`[x, y, z, roll, pitch, yaw]`，前三项为平移（mm），后三项为角度。

/// 偏移值舍入的小数位数
pub const ROUND_DECIMALS: i32 = 4;

/// 角度转弧度
#[inline]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

/// 弧度转角度
#[inline]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// 按小数位四舍五入
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// 将线上/驱动格式（角度为度）规范化为上层格式（角度为弧度，4 位小数）
///
/// ```rust
/// use cafebot_protocol::normalize_offset;
///
/// let normalized = normalize_offset([10.0, 20.0, 30.0, 90.0, 0.0, 180.0]);
/// assert_eq!(normalized, [10.0, 20.0, 30.0, 1.5708, 0.0, 3.1416]);
/// ```
pub fn normalize_offset(raw: [f64; 6]) -> [f64; 6] {
    let mut values = raw;
    for angle in &mut values[3..] {
        *angle = deg_to_rad(*angle);
    }
    values.map(|v| round_to(v, ROUND_DECIMALS))
}

/// 将上层格式（弧度）转换为驱动格式（度）
pub fn to_driver_units(values: [f64; 6]) -> [f64; 6] {
    let mut raw = values;
    for angle in &mut raw[3..] {
        *angle = rad_to_deg(*angle);
    }
    raw
}
