//! Fixed-point scale and offset

/// Divisor for `scale_factor`, which carries two implied decimals
pub const SCALE_ONE: i64 = 100;

/// `floor(raw * scale / 100) + offset`, clamped to `i32`
///
/// Negative intermediate products round toward negative infinity, so `-5 * 2.00 + 10`
/// is `0` and `-1 * 0.50` is `-1`.
pub fn apply(raw: i32, scale_factor: i32, offset: i32) -> i32 {
    let scaled = (raw as i64 * scale_factor as i64).div_euclid(SCALE_ONE);
    let shifted = scaled + offset as i64;
    shifted.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Clamps a value to the signed range of `width` bytes (1..=4)
pub fn clamp_to_width(value: i32, width: usize) -> i32 {
    match width {
        0 => 0,
        1 => value.clamp(i8::MIN as i32, i8::MAX as i32),
        2 => value.clamp(i16::MIN as i32, i16::MAX as i32),
        3 => value.clamp(-(1 << 23), (1 << 23) - 1),
        _ => value,
    }
}
