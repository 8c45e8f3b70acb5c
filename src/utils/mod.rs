pub mod jacobian;
pub mod matrix;
pub mod mvn;
pub mod state;

pub fn deg2rad(x: f64) -> f64 {
    const DEG2RAD_FACTOR: f64 = std::f64::consts::PI / 180.0;
    x * DEG2RAD_FACTOR
}
