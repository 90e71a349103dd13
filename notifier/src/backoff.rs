use std::time::Duration;

pub const BASE: Duration = Duration::from_secs(2);
pub const CAP: Duration = Duration::from_secs(60);
pub const MAX_ATTEMPTS: u32 = 5;

/// `attempt` is 0-indexed (the first retry after a failed attempt 0 waits
/// `delay_for(0)`). Exponential with a 60s ceiling (spec §4.8).
pub fn delay_for(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    BASE.checked_mul(factor as u32).unwrap_or(CAP).min(CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_then_caps() {
        assert_eq!(delay_for(0), Duration::from_secs(2));
        assert_eq!(delay_for(1), Duration::from_secs(4));
        assert_eq!(delay_for(2), Duration::from_secs(8));
        assert_eq!(delay_for(5), Duration::from_secs(60));
        assert_eq!(delay_for(30), Duration::from_secs(60));
    }
}
