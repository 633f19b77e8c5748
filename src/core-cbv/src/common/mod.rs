pub mod db_env;
pub mod hostname;
pub mod logging;
pub mod max_concurrency;
pub mod poll_interval;
pub mod source_hosts;
pub mod workspace_env;
