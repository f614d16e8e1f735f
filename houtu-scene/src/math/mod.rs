mod high_low;

pub use high_low::*;

pub const EPSILON1: f64 = 0.1;
pub const EPSILON7: f64 = 0.0000001;
pub const EPSILON10: f64 = 0.0000000001;
pub const EPSILON12: f64 = 0.000000000001;
pub const EPSILON14: f64 = 0.00000000000001;

/// Linear interpolation between `a` and `b`, `t` is not clamped.
pub fn lerp(t: f64, a: f64, b: f64) -> f64 {
    return a + (b - a) * t;
}

pub fn equals_epsilon(left: f64, right: f64, relative_epsilon: f64) -> bool {
    let diff = (left - right).abs();
    return diff <= relative_epsilon || diff <= relative_epsilon * left.abs().max(right.abs());
}

pub fn log2_u32(value: u32) -> u32 {
    if value == 0 {
        return 0;
    }
    31 - value.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_between_lod_sizes() {
        assert_eq!(lerp(0.0, 250.0, 312.0), 250.0);
        assert_eq!(lerp(1.0, 250.0, 312.0), 312.0);
        assert_eq!(lerp(0.5, 250.0, 312.0), 281.0);
    }

    #[test]
    fn log2_of_grid_sizes() {
        assert_eq!(log2_u32(1), 0);
        assert_eq!(log2_u32(2), 1);
        assert_eq!(log2_u32(32), 5);
        assert_eq!(log2_u32(64), 6);
        assert_eq!(log2_u32(0), 0);
    }

    #[test]
    fn relative_epsilon() {
        assert!(equals_epsilon(6378137.0, 6378137.0000001, EPSILON10));
        assert!(!equals_epsilon(1.0, 1.1, EPSILON7));
    }
}
