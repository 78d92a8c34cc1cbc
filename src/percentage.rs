//! Mapping from a device's ranged speed values to percentages.

/// Number of discrete states in an inclusive `(low, high)` range.
pub fn int_states_in_range((low, high): (u16, u16)) -> u32 {
    u32::from(high.saturating_sub(low)) + 1
}

/// Percentage (floor) that `value` represents inside `range`.
///
/// ```
/// use recomd::percentage::ranged_value_to_percentage;
///
/// assert_eq!(ranged_value_to_percentage((1, 255), 127), 49);
/// assert_eq!(ranged_value_to_percentage((0, 100), 40), 40);
/// ```
pub fn ranged_value_to_percentage(range: (u16, u16), value: u16) -> u8 {
    let offset = i64::from(range.0) - 1;
    let scaled = (i64::from(value) - offset) * 100 / i64::from(int_states_in_range(range));
    scaled.clamp(0, 100) as u8
}
