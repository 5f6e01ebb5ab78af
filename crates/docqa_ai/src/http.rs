use std::time::Duration;

use docqa_core::error::AppError;

pub(crate) const EMBED_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Map a failed `ureq` call to an `AppError`, flagging the cases worth retrying:
/// transport failures, rate limiting and server-side errors.
pub(crate) fn call_error(code: &str, message: &str, url: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            let retryable = status == 408 || status == 429 || status >= 500;
            AppError::new(code, message)
                .with_details(format!("url={url}; status={status}; body={}", truncate(&body, 300)))
                .with_retryable(retryable)
        }
        ureq::Error::Transport(t) => AppError::new(code, message)
            .with_details(format!("url={url}; err={t}"))
            .with_retryable(true),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Ensure a base URL is a bare `http(s)://host[:port]` without path, query or userinfo.
pub(crate) fn normalize_base_url(base_url: &str) -> Option<String> {
    let base_url = base_url.trim().trim_end_matches('/');
    let rest = base_url
        .strip_prefix("http://")
        .or_else(|| base_url.strip_prefix("https://"))?;
    if rest.is_empty() || rest.contains(['/', '?', '#', '@']) {
        return None;
    }
    if let Some((host, port)) = rest.rsplit_once(':') {
        if host.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok()?;
        if port == 0 {
            return None;
        }
    }
    Some(base_url.to_string())
}

/// Host part of a URL already accepted by `normalize_base_url`.
pub(crate) fn host_of(base_url: &str) -> &str {
    let rest = base_url.split_once("://").map(|(_, r)| r).unwrap_or(base_url);
    rest.rsplit_once(':').map(|(h, _)| h).unwrap_or(rest)
}
