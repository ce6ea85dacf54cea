//! Helpers for joining the configured API base URL with endpoint paths.

/// Strip trailing slashes so endpoints can be appended with a single `/`.
///
/// # Examples
///
/// ```
/// use flexgpt::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8100/api/"), "http://localhost:8100/api");
/// assert_eq!(normalize_base_url("https://chat.example.com//"), "https://chat.example.com");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path.
///
/// ```
/// use flexgpt::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8100/api/", "/chat/send"),
///     "http://localhost:8100/api/chat/send"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalize_base_url(base_url), endpoint)
}
