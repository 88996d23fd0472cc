use crate::error::AppError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error};

/// Parses a list of parameter strings into key-value pairs.
///
/// Each parameter must be in `key=value` form; it is split at the first `=`.
/// Returns `AppError::InvalidInput` for a parameter without `=` or with an
/// empty key.
pub fn parse_params(params: &[String]) -> Result<Vec<(String, String)>, AppError> {
    debug!("Parsing {} parameters", params.len());

    params
        .iter()
        .map(|param| {
            param
                .split_once('=')
                .map(|(key, value)| (key.trim(), value.trim()))
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| {
                    error!("Invalid param format: {param}");
                    AppError::InvalidInput(format!("Invalid param format: {param}"))
                })
        })
        .collect()
}

/// Build a header map from `key=value` parameters.
pub fn parse_headers(params: &[String]) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();
    for (key, value) in parse_params(params)? {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| AppError::InvalidInput(format!("Invalid header name `{key}`: {e}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| AppError::InvalidInput(format!("Invalid value for header `{key}`: {e}")))?;
        debug!(header = %name, "Added custom header");
        headers.insert(name, value);
    }
    Ok(headers)
}
