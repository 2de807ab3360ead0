use std::fmt;

/// Error raised by the chat relay or a provider.
#[derive(Debug, Clone)]
pub struct AiError {
    /// Error message
    pub message: String,
    /// HTTP status code from the provider, if any
    pub status_code: Option<u16>,
    /// The request itself was unusable (bad history); maps to 400
    pub invalid_request: bool,
}

impl AiError {
    pub fn new(message: impl Into<String>) -> Self {
        AiError {
            message: message.into(),
            status_code: None,
            invalid_request: false,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        AiError {
            message: message.into(),
            status_code: Some(status_code),
            invalid_request: false,
        }
    }

    pub fn invalid_history(message: impl Into<String>) -> Self {
        AiError {
            message: message.into(),
            status_code: None,
            invalid_request: true,
        }
    }

    /// Check if this is an upstream client error (4xx status code)
    pub fn is_client_error(&self) -> bool {
        self.status_code.map(|c| (400..500).contains(&c)).unwrap_or(false)
    }
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[HTTP {}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AiError {}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AiError::with_status(e.to_string(), status.as_u16()),
            None => AiError::new(e.to_string()),
        }
    }
}
