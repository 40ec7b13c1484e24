//! Location and lookup error types.

use climate_core::NetworkError;
use thiserror::Error;

/// Flat classification of every failure the location layer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PermissionDenied,
    Unavailable,
    Timeout,
    Network,
    Auth,
    RateLimited,
    /// Zero results; rendered as "no matches", never as a failure banner
    NotFound,
    Unknown,
}

impl ErrorKind {
    /// User-friendly message for UI display. Each kind gets its own text.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Location permission denied. Please enable location access.",
            Self::Unavailable => "Location information is unavailable.",
            Self::Timeout => "Location request timed out.",
            Self::Network => "Could not reach the lookup service. Check your internet connection.",
            Self::Auth => "The weather service rejected our credentials. Check the API key.",
            Self::RateLimited => "Too many requests. Please wait a moment and try again.",
            Self::NotFound => "No matching places found.",
            Self::Unknown => "An unknown error occurred.",
        }
    }

    /// Whether the failure came from the device position rather than a lookup.
    pub fn is_device(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::Unavailable | Self::Timeout)
    }
}

/// Device position errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    Unavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location error: {0}")]
    Unknown(String),
}

impl LocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::Unavailable => ErrorKind::Unavailable,
            Self::Timeout => ErrorKind::Timeout,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

/// Geocoding and weather lookup errors.
///
/// `Clone` so a failed cache entry can hand the same error to every reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Not authorized by the lookup service")]
    Auth,
    #[error("Rate limited by the lookup service")]
    RateLimited,
    #[error("Nothing found")]
    NotFound,
    #[error("Lookup error: {0}")]
    Unknown(String),
}

impl LookupError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            _ => Self::Network(format!("HTTP {}", status)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Auth => ErrorKind::Auth,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::NotFound => ErrorKind::NotFound,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

impl From<NetworkError> for LookupError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::ServerError { status, .. } => Self::from_status(status),
            NetworkError::InvalidResponse(msg) => Self::Unknown(msg),
            other => Self::Network(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_errors_have_distinct_messages() {
        let messages = [
            LocationError::PermissionDenied.user_message(),
            LocationError::Unavailable.user_message(),
            LocationError::Timeout.user_message(),
            LocationError::Unknown("x".into()).user_message(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(LookupError::from_status(401), LookupError::Auth);
        assert_eq!(LookupError::from_status(403), LookupError::Auth);
        assert_eq!(LookupError::from_status(404), LookupError::NotFound);
        assert_eq!(LookupError::from_status(429), LookupError::RateLimited);
        assert_eq!(LookupError::from_status(502).kind(), ErrorKind::Network);
    }

    #[test]
    fn test_network_error_conversion() {
        let err: LookupError = NetworkError::ServerError {
            status: 429,
            message: "slow down".into(),
        }
        .into();
        assert_eq!(err, LookupError::RateLimited);

        let err: LookupError = NetworkError::Timeout.into();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_device_kinds() {
        assert!(ErrorKind::PermissionDenied.is_device());
        assert!(!ErrorKind::Network.is_device());
        assert_ne!(
            ErrorKind::NotFound.user_message(),
            ErrorKind::Network.user_message()
        );
    }
}
