//! Authentication headers for completion requests.

use crate::core::config::ApiFlavor;

/// Add flavor-specific authentication headers to an HTTP request
///
/// - DIAL: `Api-Key` header
/// - OpenAI-compatible: `Authorization: Bearer`
///
/// A blank key adds nothing, for local servers that do not check credentials.
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    flavor: ApiFlavor,
    api_key: &str,
) -> reqwest::RequestBuilder {
    if api_key.trim().is_empty() {
        return request;
    }
    match flavor {
        ApiFlavor::Dial => request.header("Api-Key", api_key),
        ApiFlavor::OpenAi => request.header("Authorization", format!("Bearer {api_key}")),
    }
}
