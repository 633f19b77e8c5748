use crate::source_url::DEFAULT_ALLOWED_HOSTS;

/// Hosts accepted in source URLs, from the comma-separated ALLOWED_SOURCE_HOSTS.
///
/// Falls back to [`DEFAULT_ALLOWED_HOSTS`] when the variable is unset or lists no host.
pub fn get_allowed_source_hosts() -> Vec<String> {
    parse_allowed_hosts(std::env::var("ALLOWED_SOURCE_HOSTS").ok().as_deref())
}

fn parse_allowed_hosts(raw: Option<&str>) -> Vec<String> {
    let hosts: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect();

    if hosts.is_empty() {
        DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect()
    } else {
        hosts
    }
}
