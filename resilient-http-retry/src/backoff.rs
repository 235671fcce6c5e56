use std::time::Duration;

/// Delay in milliseconds before retry number `retry_number` (starting at `1`).
///
/// The delay is `exponent^(retry_number - 1) * initial_interval_ms`. When that comes out as zero
/// or is not a finite number (for instance with an exponent of `0`), `initial_interval_ms` is
/// used instead, so exponents of `0` and `1` both give a constant delay.
pub fn compute_retry_delay(exponent: f64, retry_number: u32, initial_interval_ms: u64) -> u64 {
    let power = i32::try_from(retry_number).unwrap_or(i32::MAX) - 1;
    let delay = exponent.powi(power) * initial_interval_ms as f64;

    if delay.is_finite() && delay > 0.0 {
        // float to int casts saturate
        delay as u64
    } else {
        initial_interval_ms
    }
}

/// [`compute_retry_delay`] as a [`Duration`].
pub fn retry_delay(exponent: f64, retry_number: u32, initial_interval_ms: u64) -> Duration {
    Duration::from_millis(compute_retry_delay(
        exponent,
        retry_number,
        initial_interval_ms,
    ))
}
