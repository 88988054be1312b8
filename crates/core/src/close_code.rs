//! WebSocket close codes used by the inspection service.

use std::fmt;

/// Close code reported with a socket disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: normal closure, also used for an explicit user disconnect
    Normal,
    /// 1006: connection dropped without a close frame
    Abnormal,
    /// 4900: session belongs to another org
    OrgMismatch,
    /// 4901: too many clients connected to the session
    ConnectionLimit,
    /// 4902: too many events per minute
    EventLimit,
    /// 4903: session was deleted
    DeletedSession,
    /// 4400: client violated the protocol
    ClientError,
    /// Anything else, treated as abnormal
    Other(u16),
}

impl CloseCode {
    pub fn from_u16(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1006 => Self::Abnormal,
            4900 => Self::OrgMismatch,
            4901 => Self::ConnectionLimit,
            4902 => Self::EventLimit,
            4903 => Self::DeletedSession,
            4400 => Self::ClientError,
            other => Self::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Abnormal => 1006,
            Self::OrgMismatch => 4900,
            Self::ConnectionLimit => 4901,
            Self::EventLimit => 4902,
            Self::DeletedSession => 4903,
            Self::ClientError => 4400,
            Self::Other(code) => *code,
        }
    }

    /// Whether the session should try to reconnect after this code.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Abnormal | Self::Other(_))
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}
