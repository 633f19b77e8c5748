use std::{num::ParseIntError, time::Duration};

/// Status polls the CLI makes before giving up.
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 120;

/// Same as poll_interval but panics on error.
pub fn get_poll_interval(units: TimeUnit, env_var_name: &str, default: u64) -> Duration {
    match poll_interval(units, env_var_name, default) {
        Ok(interval) => interval,
        Err(e) => panic!("{} must be a valid number: {}", env_var_name, e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    fn duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
        }
    }
}

/// Retrieves the value of the environment variable as a duration.
pub fn poll_interval(units: TimeUnit, env_var_name: &str, default: u64) -> Result<Duration, ParseIntError> {
    let amount = match std::env::var(env_var_name) {
        Ok(v) => v.trim().parse::<u64>()?,
        Err(_) => default,
    };
    Ok(units.duration(amount))
}

/// POLL_MAX_ATTEMPTS, or [`DEFAULT_POLL_MAX_ATTEMPTS`]. Panics on a value that is not a positive integer.
pub fn get_poll_max_attempts() -> u32 {
    match std::env::var("POLL_MAX_ATTEMPTS") {
        Ok(v) => match v.trim().parse::<u32>() {
            Ok(attempts) if attempts > 0 => attempts,
            _ => panic!("POLL_MAX_ATTEMPTS must be a positive integer, got '{}'", v),
        },
        Err(_) => DEFAULT_POLL_MAX_ATTEMPTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(TimeUnit::Seconds.duration(2), Duration::from_secs(2));
        assert_eq!(TimeUnit::Milliseconds.duration(250), Duration::from_millis(250));
    }

    #[test]
    fn test_unset_variable_uses_default() {
        let interval = poll_interval(TimeUnit::Milliseconds, "CBV_TEST_UNSET_POLL_INTERVAL", 1000).unwrap();
        assert_eq!(interval, Duration::from_secs(1));
    }
}
