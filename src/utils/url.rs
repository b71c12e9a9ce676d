//! Endpoint construction for the completion API.

use crate::core::config::ApiFlavor;

/// Normalize a base URL by removing trailing slashes
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use mcp_agent::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// Chat completions endpoint for the given API flavor.
///
/// DIAL routes by deployment, so the model name is part of the path there.
pub fn chat_completions_url(
    base_url: &str,
    flavor: ApiFlavor,
    model: &str,
    api_version: Option<&str>,
) -> String {
    let url = match flavor {
        ApiFlavor::OpenAi => construct_api_url(base_url, "chat/completions"),
        ApiFlavor::Dial => construct_api_url(
            base_url,
            &format!("openai/deployments/{model}/chat/completions"),
        ),
    };
    match api_version.map(str::trim).filter(|version| !version.is_empty()) {
        Some(version) => format!("{url}?api-version={version}"),
        None => url,
    }
}
