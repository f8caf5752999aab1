//! HTTP handlers grouped by concern.

pub mod admin;
pub mod auth;
pub mod discord;
pub mod health;
pub mod password;
pub mod security;
pub mod verification;

use axum::http::HeaderMap;

/// Client identity recorded on audit entries: first `x-forwarded-for`
/// hop (or "unknown") plus the user agent.
pub fn request_meta(headers: &HeaderMap) -> (String, String) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    (ip, user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_meta_extracts_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("user-agent", "curl/8.0".parse().unwrap());

        let (ip, user_agent) = request_meta(&headers);
        assert_eq!(ip, "203.0.113.9");
        assert_eq!(user_agent, "curl/8.0");
    }

    #[test]
    fn request_meta_defaults_to_unknown() {
        let (ip, user_agent) = request_meta(&HeaderMap::new());
        assert_eq!(ip, "unknown");
        assert_eq!(user_agent, "unknown");
    }
}
