//! Unified error types for the assurance client.
//!
//! Two layers:
//! - [`ConnectionError`]: user-facing connection failures, each with a title,
//!   a description and a retry hint for the pairing UI.
//! - [`Error`]: everything a library call can fail with, including typed
//!   network failures that carry the HTTP status and response body.

use thiserror::Error;

use crate::close_code::CloseCode;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Connection failures surfaced to the authorization UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection error")]
    Generic,
    #[error("missing org id")]
    NoOrgId,
    #[error("missing pin code")]
    NoPinCode,
    #[error("unable to form socket url")]
    NoUrl,
    #[error("org id mismatch")]
    OrgIdMismatch,
    #[error("connection limit reached")]
    ConnectionLimitReached,
    #[error("event limit reached")]
    EventLimitReached,
    #[error("session deleted")]
    SessionDeleted,
    #[error("client protocol error")]
    ClientProtocolError,
    #[error("user cancelled")]
    UserCancelled,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid request body")]
    InvalidRequestBody,
    #[error("invalid response data")]
    InvalidResponseData,
    #[error("device registration failed")]
    DeviceRegistrationFailed,
    #[error("device status failed")]
    DeviceStatusFailed,
    #[error("device delete failed")]
    DeviceDeleteFailed,
}

impl ConnectionError {
    /// Short heading for the UI.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Generic => "Connection Error",
            Self::NoOrgId => "Invalid Configuration",
            Self::NoPinCode => "Invalid PIN",
            Self::NoUrl => "Socket Connection Error",
            Self::OrgIdMismatch => "Unauthorized Access",
            Self::ConnectionLimitReached => "Connection Limit Reached",
            Self::EventLimitReached => "Event Limit Reached",
            Self::SessionDeleted => "Session Deleted",
            Self::ClientProtocolError => "Client Disconnected",
            Self::UserCancelled => "Session Cancelled",
            Self::InvalidUrl(_) => "Invalid URL",
            Self::InvalidRequestBody => "Invalid Request",
            Self::InvalidResponseData => "Invalid Response",
            Self::DeviceRegistrationFailed => "Device Registration Failed",
            Self::DeviceStatusFailed => "Device Status Failed",
            Self::DeviceDeleteFailed => "Device Delete Failed",
        }
    }

    /// Human-readable explanation shown under the title.
    pub fn description(&self) -> String {
        match self {
            Self::Generic => "The connection may be failing due to a network issue or an incorrect PIN. \
                 Verify internet connectivity or the PIN and try again."
                .to_string(),
            Self::NoOrgId => "The application configuration does not contain an org id. \
                 Verify the configuration and try again."
                .to_string(),
            Self::NoPinCode => "Unable to read the PIN that was entered.".to_string(),
            Self::NoUrl => "Unable to form a valid socket URL for the connection.".to_string(),
            Self::OrgIdMismatch => {
                "The session was created for a different org than the one configured in this application."
                    .to_string()
            }
            Self::ConnectionLimitReached => {
                "The maximum number of devices connected to this session has been reached.".to_string()
            }
            Self::EventLimitReached => {
                "The maximum number of events that can be sent per minute has been reached.".to_string()
            }
            Self::SessionDeleted => "The session this client was connected to has been deleted.".to_string(),
            Self::ClientProtocolError => {
                "This client was disconnected due to an unexpected error (code 4400).".to_string()
            }
            Self::UserCancelled => "The session connection was cancelled.".to_string(),
            Self::InvalidUrl(url) => format!("Attempted a network request with an invalid URL: {url}"),
            Self::InvalidRequestBody => "The request body could not be encoded.".to_string(),
            Self::InvalidResponseData => "The service returned a response that could not be read.".to_string(),
            Self::DeviceRegistrationFailed => "Failed to register this device for pairing.".to_string(),
            Self::DeviceStatusFailed => "Failed to read the pairing status of this device.".to_string(),
            Self::DeviceDeleteFailed => "Failed to remove this device's pairing registration.".to_string(),
        }
    }

    /// Whether the UI should offer a retry.
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Generic | Self::NoPinCode)
    }

    /// Terminal error implied by a close code, if any.
    pub fn from_close_code(code: CloseCode) -> Option<Self> {
        match code {
            CloseCode::OrgMismatch => Some(Self::OrgIdMismatch),
            CloseCode::ConnectionLimit => Some(Self::ConnectionLimitReached),
            CloseCode::EventLimit => Some(Self::EventLimitReached),
            CloseCode::DeletedSession => Some(Self::SessionDeleted),
            CloseCode::ClientError => Some(Self::ClientProtocolError),
            CloseCode::Normal | CloseCode::Abnormal | CloseCode::Other(_) => None,
        }
    }
}

/// Unified error type for the assurance client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Failed HTTP exchange with the pairing or blob service.
    #[error("{error} (status: {status:?}): {message}")]
    Network {
        error: ConnectionError,
        status: Option<u16>,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid deep link: {0}")]
    InvalidDeepLink(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a network error.
    pub fn network(error: ConnectionError, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Network {
            error,
            status,
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn invalid_deep_link(msg: impl Into<String>) -> Self {
        Self::InvalidDeepLink(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The connection error to show in the UI for this failure.
    pub fn connection_error(&self) -> ConnectionError {
        match self {
            Self::Connection(e) => e.clone(),
            Self::Network { error, .. } => error.clone(),
            Self::InvalidUrl(url) => ConnectionError::InvalidUrl(url.clone()),
            _ => ConnectionError::Generic,
        }
    }

    /// HTTP status for network failures.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            _ => None,
        }
    }
}
