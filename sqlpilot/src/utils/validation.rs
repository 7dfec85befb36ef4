// Input validation utilities

use anyhow::Result;
use url::Url;

/// Validate the backend origin and normalize it so relative endpoint paths join
/// underneath it (`http://host:8000/api` → `http://host:8000/api/`).
pub fn validate_backend_url(raw: &str) -> Result<Url> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(anyhow::anyhow!("backend_url is required"));
    }

    let mut url =
        Url::parse(s).map_err(|e| anyhow::anyhow!("backend_url '{}' is not a valid URL: {}", s, e))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow::anyhow!(
            "backend_url must use http or https (got '{}')",
            url.scheme()
        ));
    }

    if url.host_str().map(|h| h.is_empty()).unwrap_or(true) {
        return Err(anyhow::anyhow!("backend_url '{}' has no host", s));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(anyhow::anyhow!(
            "backend_url must not carry a query string or fragment"
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Parse a log level name from configuration.
pub fn parse_log_level(raw: &str) -> Result<log::LevelFilter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" => Ok(log::LevelFilter::Off),
        "error" => Ok(log::LevelFilter::Error),
        "warn" | "warning" => Ok(log::LevelFilter::Warn),
        "info" => Ok(log::LevelFilter::Info),
        "debug" => Ok(log::LevelFilter::Debug),
        "trace" => Ok(log::LevelFilter::Trace),
        other => Err(anyhow::anyhow!(
            "log_level '{}' is not one of off|error|warn|info|debug|trace",
            other
        )),
    }
}

/// Normalize chat input. Blank input is never submitted.
pub fn normalize_chat_input(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_url_gets_trailing_slash() {
        let url = validate_backend_url("http://localhost:8000").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/");

        let url = validate_backend_url("https://example.com/api").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/");
    }

    #[test]
    fn backend_url_rejects_other_schemes() {
        let err = validate_backend_url("ftp://localhost:8000").unwrap_err();
        assert!(err.to_string().contains("http or https"), "{}", err);
    }

    #[test]
    fn backend_url_rejects_garbage_and_empty() {
        assert!(validate_backend_url("").is_err());
        assert!(validate_backend_url("not a url").is_err());
        assert!(validate_backend_url("http://localhost:8000/?x=1").is_err());
    }

    #[test]
    fn log_level_parsing() {
        assert_eq!(parse_log_level("INFO").unwrap(), log::LevelFilter::Info);
        assert_eq!(parse_log_level(" warning ").unwrap(), log::LevelFilter::Warn);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn chat_input_blank_is_rejected_but_content_is_kept_verbatim() {
        assert_eq!(normalize_chat_input("   \t"), None);
        assert_eq!(normalize_chat_input(" top 5 customers "), Some(" top 5 customers "));
    }
}
