use std::num::ParseIntError;

/// The default maximum concurrency value.
pub const DEFAULT: usize = 1000;

/// Same as max_concurrency but panics on an invalid value. Unset means `override_default`, else [`DEFAULT`].
pub fn get_max_concurrency(override_default: Option<usize>) -> usize {
    match max_concurrency() {
        Ok(Some(v)) => v,
        Ok(None) => override_default.unwrap_or(DEFAULT),
        Err(e) => panic!("{}", e),
    }
}

/// Retrieves WORKER_MAX_CONCURRENCY as a usize, the permit count of the pipeline semaphore.
pub fn max_concurrency() -> Result<Option<usize>, MaxConcurrencyError> {
    match std::env::var("WORKER_MAX_CONCURRENCY") {
        Ok(v) => parse_max_concurrency(&v).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_max_concurrency(raw: &str) -> Result<usize, MaxConcurrencyError> {
    match raw.trim().parse::<usize>()? {
        0 => Err(MaxConcurrencyError::NonPositive),
        v => Ok(v),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MaxConcurrencyError {
    #[error("WORKER_MAX_CONCURRENCY is not an integer: {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("WORKER_MAX_CONCURRENCY must be a positive number")]
    NonPositive,
}
