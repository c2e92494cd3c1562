use std::cmp::Ordering;

/// Tolerance used for all floating point threshold comparisons in the scan.
pub const EPSILON: f64 = 1e-9;

/// Compare two floats with a tolerance scaled to the magnitude of the larger
/// operand.
pub fn fcmp(x: f64, y: f64, epsilon: f64) -> Ordering {
    let (_, max_exponent) = libm::frexp(if x.abs() > y.abs() { x } else { y });
    let delta = libm::ldexp(epsilon, max_exponent);
    let diff = x - y;

    if diff > delta {
        Ordering::Greater
    } else if diff < -delta {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}
