use core::fmt;

/// Why a channel or listener stopped working.
///
/// A fail reason is latched: once an entity records one it never performs
/// I/O again and has to be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    InvalidAddress,
    ConnectionFailed,
    VerificationSend,
    VerificationResponse,
    InvalidVerification,
    ClientVerification,
    ConnectionBroken,
    FrameTooLarge,
    ShutDown,
    BindFailed,
    NonBlocking,
    AcceptFailed,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::InvalidAddress => "Invalid address",
            FailReason::ConnectionFailed => "Connection failed",
            FailReason::VerificationSend => "Failed to send verification message",
            FailReason::VerificationResponse => "Failed to retrieve verification response",
            FailReason::InvalidVerification => "Server sent invalid verification response",
            FailReason::ClientVerification => "Failed to verify the client",
            FailReason::ConnectionBroken => "Connection broken",
            FailReason::FrameTooLarge => "Frame exceeds the maximum payload size",
            FailReason::ShutDown => "Shut down",
            FailReason::BindFailed => "Bind failed",
            FailReason::NonBlocking => "Failed to make the server socket non-blocking",
            FailReason::AcceptFailed => "Accept failed",
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for FailReason {}

/// Error returned when a textual endpoint cannot be parsed into a [`Target`].
///
/// [`Target`]: crate::transport::Target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetParseError {
    MissingScheme(String),
    UnknownScheme(String),
    InvalidSocketAddr(String),
    InvalidVsock(String),
    EmptyPath,
}

impl fmt::Display for TargetParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetParseError::MissingScheme(s) => write!(f, "Missing endpoint scheme in '{}'", s),
            TargetParseError::UnknownScheme(s) => write!(f, "Unknown endpoint scheme '{}'", s),
            TargetParseError::InvalidSocketAddr(s) => write!(f, "Invalid socket address '{}'", s),
            TargetParseError::InvalidVsock(s) => {
                write!(f, "Invalid vsock endpoint '{}', expected CID:PORT", s)
            }
            TargetParseError::EmptyPath => write!(f, "Empty unix socket path"),
        }
    }
}

impl std::error::Error for TargetParseError {}

pub type Result<T> = core::result::Result<T, FailReason>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_text() {
        assert_eq!(FailReason::ConnectionBroken.to_string(), "Connection broken");
        assert_eq!(FailReason::ShutDown.to_string(), "Shut down");
        assert_eq!(
            FailReason::InvalidVerification.to_string(),
            "Server sent invalid verification response"
        );
    }
}
