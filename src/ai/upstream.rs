//! Upstream AI-service failures
//!
//! Every failure from the generative-AI client is folded into one of a few
//! caller-facing categories, decided by HTTP status first, then the transport
//! or provider error code, then the message text.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCategory {
    ServiceUnavailable,
    RateLimited,
    BadRequest,
    Unauthorized,
    Timeout,
    Unknown,
}

impl std::fmt::Display for UpstreamCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamCategory::ServiceUnavailable => write!(f, "service_unavailable"),
            UpstreamCategory::RateLimited => write!(f, "rate_limited"),
            UpstreamCategory::BadRequest => write!(f, "bad_request"),
            UpstreamCategory::Unauthorized => write!(f, "unauthorized"),
            UpstreamCategory::Timeout => write!(f, "timeout"),
            UpstreamCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl UpstreamCategory {
    pub fn status_code(&self) -> u16 {
        match self {
            UpstreamCategory::ServiceUnavailable => 503,
            UpstreamCategory::RateLimited => 429,
            UpstreamCategory::BadRequest => 400,
            UpstreamCategory::Unauthorized => 401,
            UpstreamCategory::Timeout => 504,
            UpstreamCategory::Unknown => 502,
        }
    }

    /// Message safe to show an end user
    pub fn user_message(&self) -> &'static str {
        match self {
            UpstreamCategory::ServiceUnavailable => {
                "The AI service is unavailable right now. Please try again later."
            }
            UpstreamCategory::RateLimited => {
                "Too many requests to the AI service. Please try again later."
            }
            UpstreamCategory::BadRequest => "The request was rejected. Please check the input data.",
            UpstreamCategory::Unauthorized => {
                "The AI service rejected the credentials. Please check the configuration."
            }
            UpstreamCategory::Timeout => "The AI service timed out. Please try again later.",
            UpstreamCategory::Unknown => "The AI service returned an unexpected response.",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}: {}", self.category(), .message)]
pub struct UpstreamError {
    /// HTTP status returned by the provider, if any
    pub status: Option<u16>,
    /// Transport or provider error code (ETIMEDOUT, RESOURCE_EXHAUSTED, ...)
    pub code: Option<String>,
    pub message: String,
}

impl UpstreamError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn timeout(secs: u64) -> Self {
        Self::with_code("ETIMEDOUT", format!("no response within {}s", secs))
    }

    /// The model answered, but not with parseable JSON
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::with_code("MALFORMED_RESPONSE", message)
    }

    pub fn category(&self) -> UpstreamCategory {
        classify_upstream(self.status, self.code.as_deref(), &self.message)
    }
}

/// Classify an upstream failure
pub fn classify_upstream(status: Option<u16>, code: Option<&str>, message: &str) -> UpstreamCategory {
    if let Some(status) = status {
        match status {
            429 => return UpstreamCategory::RateLimited,
            401 | 403 => return UpstreamCategory::Unauthorized,
            400 | 404 | 413 | 422 => return UpstreamCategory::BadRequest,
            408 | 504 => return UpstreamCategory::Timeout,
            s if s >= 500 => return UpstreamCategory::ServiceUnavailable,
            _ => {}
        }
    }

    if let Some(code) = code {
        match code.to_uppercase().as_str() {
            "ECONNREFUSED" | "ENOTFOUND" | "ECONNRESET" | "UNAVAILABLE" | "INTERNAL" => {
                return UpstreamCategory::ServiceUnavailable
            }
            "ETIMEDOUT" | "DEADLINE_EXCEEDED" => return UpstreamCategory::Timeout,
            "RESOURCE_EXHAUSTED" => return UpstreamCategory::RateLimited,
            "UNAUTHENTICATED" | "PERMISSION_DENIED" => return UpstreamCategory::Unauthorized,
            "INVALID_ARGUMENT" | "FAILED_PRECONDITION" => return UpstreamCategory::BadRequest,
            _ => {}
        }
    }

    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("quota") {
        UpstreamCategory::RateLimited
    } else if lower.contains("timed out") || lower.contains("timeout") {
        UpstreamCategory::Timeout
    } else if lower.contains("unauthorized") || lower.contains("api key") || lower.contains("forbidden") {
        UpstreamCategory::Unauthorized
    } else if lower.contains("service unavailable")
        || lower.contains("overloaded")
        || lower.contains("connection refused")
    {
        UpstreamCategory::ServiceUnavailable
    } else if lower.contains("invalid argument") || lower.contains("bad request") {
        UpstreamCategory::BadRequest
    } else {
        UpstreamCategory::Unknown
    }
}
