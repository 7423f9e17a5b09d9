//! Error types for talking to the connectivity module

use core::fmt;

use thiserror_no_std::Error;

/// Everything that can go wrong while driving the module.
///
/// A `Transport` failure means the serial port itself is unusable. The
/// remaining variants describe a module that is reachable but did not
/// behave as the sequence required.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcmError {
    #[error("no reply to `{command}` within the timeout")]
    Timeout { command: &'static str },
    #[error("serial link error")]
    Transport,
    #[error("reply is not valid text or does not fit the reply buffer")]
    InvalidReply,
    #[error("gave up waiting for {condition}")]
    WaitTimedOut { condition: &'static str },
    #[error("cancelled")]
    Cancelled,
    #[error("connect failed, aborted after {attempts} attempt(s)")]
    Aborted { attempts: u8 },
}

impl CcmError {
    /// Whether the serial link itself failed, as opposed to the module.
    pub const fn is_link_error(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Map an atat client failure for `command`.
    pub(crate) fn from_atat(err: atat::Error, command: &'static str) -> Self {
        match err {
            atat::Error::Timeout => Self::Timeout { command },
            atat::Error::Read | atat::Error::Write => Self::Transport,
            _ => Self::InvalidReply,
        }
    }
}

/// An `ERR<code> <message>` reply from the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleError<'a> {
    pub code: u16,
    pub message: &'a str,
}

impl<'a> ModuleError<'a> {
    /// Parse a reply line such as `ERR14 INVALID PARAM\r\n`.
    ///
    /// Returns `None` for anything that is not an error reply.
    pub fn parse(line: &'a str) -> Option<Self> {
        let rest = line.trim_start().strip_prefix("ERR")?;
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let code = rest[..digits].parse().ok()?;
        let message = rest[digits..].trim();

        Some(Self { code, message })
    }
}

impl fmt::Display for ModuleError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERR{} {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_module_error_with_message() {
        let err = ModuleError::parse("ERR14 INVALID PARAM\r\n").unwrap();
        assert_eq!(err.code, 14);
        assert_eq!(err.message, "INVALID PARAM");
    }

    #[test]
    fn parses_bare_module_error() {
        let err = ModuleError::parse("ERR7\r\n").unwrap();
        assert_eq!(err.code, 7);
        assert_eq!(err.message, "");
    }

    #[test]
    fn ignores_non_error_replies() {
        assert!(ModuleError::parse("OK 1 CONNECTED\r\n").is_none());
        assert!(ModuleError::parse("ERROR\r\n").is_none());
    }

    #[test]
    fn link_errors_are_classified() {
        assert!(CcmError::Transport.is_link_error());
        assert!(!CcmError::InvalidReply.is_link_error());
        assert!(!CcmError::Timeout { command: "AT+CONNECT" }.is_link_error());
    }

    #[test]
    fn atat_errors_keep_the_command_label() {
        assert_eq!(
            CcmError::from_atat(atat::Error::Timeout, "AT+CONNECT"),
            CcmError::Timeout { command: "AT+CONNECT" }
        );
        assert_eq!(
            CcmError::from_atat(atat::Error::Write, "AT+CONNECT"),
            CcmError::Transport
        );
        assert_eq!(
            CcmError::from_atat(atat::Error::Parse, "AT+CONNECT"),
            CcmError::InvalidReply
        );
    }
}
