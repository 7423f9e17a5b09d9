//! AT command catalogue for the CCM
//!
//! The command words and the connect token are the module firmware's
//! grammar and must go out byte for byte. Every command is terminated by a
//! single `\n` on the wire.
//!
//! Each command is its own [`AtatCmd`] type carrying its reply timeout.
//! The CCM grammar separates arguments with a space or `=`, never quotes
//! them and ends lines with a bare `\n`, so the commands write their own
//! bytes instead of going through `serde_at`.

use atat::AtatCmd;

use crate::client::Reply;

/// Default reply budget for configuration commands (ms)
pub const RESPONSE_DELAY_MS: u32 = 5_000;

/// Reply budget for `AT+CONNECT`, which covers DNS, TLS and MQTT setup (ms)
pub const MAX_CONNECT_DELAY_MS: u32 = 120_000;

/// Reply the module sends once the MQTT session is up
pub const CONNECTED_REPLY: &str = "OK 1 CONNECTED\r\n";

/// Reply prefix of a connected `AT+CONNECT?` query
pub const CONNECTED_STATUS: &str = "OK 1 CONNECTED";

/// Reply prefix of a successful `AT+DIAG PING`
pub const PING_OK: &str = "OK";

/// Topic slot 1 is bound to this topic name before publishing
pub const TOPIC: &str = "data";

/// Payload published on topic slot 1
pub const MESSAGE: &str = "Hello World!";

/// Capacity of the command buffer, terminator included
pub const COMMAND_CAPACITY: usize = 192;

const TERMINATOR: u8 = b'\n';

/// An AT command the onboarding sequence sends.
pub trait CcmCommand: AtatCmd<Response = Reply> {
    /// Command word used in logs and errors, e.g. `AT+CONNECT`
    const LABEL: &'static str;

    /// Prefix a successful reply starts with; `None` leaves the reply
    /// unchecked
    const EXPECTED: Option<&'static str> = None;
}

/// Write `label`, `argument` and the terminator into `buf`.
///
/// Output is cut short if `buf` is smaller than the command's `MAX_LEN`,
/// which the client's command buffer rules out.
pub fn write_line(buf: &mut [u8], label: &str, argument: &str) -> usize {
    let mut len = 0;
    for &byte in label.as_bytes().iter().chain(argument.as_bytes()) {
        let Some(slot) = buf.get_mut(len) else {
            return len;
        };
        *slot = byte;
        len += 1;
    }

    if let Some(slot) = buf.get_mut(len) {
        *slot = TERMINATOR;
        len += 1;
    }
    len
}

/// Declare a command type.
///
/// `fixed = ".."` appends a constant argument; `argument = N` gives the
/// type one borrowed `&str` argument of at most `N` bytes.
macro_rules! at_command {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal $(, fixed = $fixed:expr)?,
        timeout_ms = $timeout:expr $(, expects = $token:expr)? $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl $name {
            const ARGUMENT: &'static str = $crate::command::at_command!(@fixed $($fixed)?);
        }

        impl ::atat::AtatCmd for $name {
            type Response = $crate::client::Reply;
            const MAX_LEN: usize = $label.len() + Self::ARGUMENT.len() + 1;
            const MAX_TIMEOUT_MS: u32 = $timeout;

            fn write(&self, buf: &mut [u8]) -> usize {
                $crate::command::write_line(buf, $label, Self::ARGUMENT)
            }

            fn parse(
                &self,
                resp: Result<&[u8], ::atat::InternalError>,
            ) -> Result<Self::Response, ::atat::Error> {
                $crate::client::Reply::from_response(
                    resp,
                    <Self as $crate::command::CcmCommand>::EXPECTED,
                )
            }
        }

        impl $crate::command::CcmCommand for $name {
            const LABEL: &'static str = $label;
            $(const EXPECTED: Option<&'static str> = Some($token);)?
        }
    };
    (
        $(#[$meta:meta])*
        $name:ident<$field:ident>, $label:literal, argument = $cap:expr,
        timeout_ms = $timeout:expr $(, expects = $token:expr)? $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name<'a> {
            pub $field: &'a str,
        }

        impl ::atat::AtatCmd for $name<'_> {
            type Response = $crate::client::Reply;
            const MAX_LEN: usize = $label.len() + $cap + 1;
            const MAX_TIMEOUT_MS: u32 = $timeout;

            fn write(&self, buf: &mut [u8]) -> usize {
                $crate::command::write_line(buf, $label, self.$field)
            }

            fn parse(
                &self,
                resp: Result<&[u8], ::atat::InternalError>,
            ) -> Result<Self::Response, ::atat::Error> {
                $crate::client::Reply::from_response(
                    resp,
                    <Self as $crate::command::CcmCommand>::EXPECTED,
                )
            }
        }

        impl $crate::command::CcmCommand for $name<'_> {
            const LABEL: &'static str = $label;
            $(const EXPECTED: Option<&'static str> = Some($token);)?
        }
    };
    (@fixed $fixed:expr) => { $fixed };
    (@fixed) => { "" };
}

pub(crate) use at_command;

at_command!(
    /// `AT+DISCONNECT`: drop the current Wi-Fi association.
    Disconnect, "AT+DISCONNECT", timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONF? ThingName`: read the device identity.
    ThingName, "AT+CONF? ThingName", timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONF? Certificate pem`: read the device certificate.
    ///
    /// The reply spans several lines, from `-----BEGIN` to `-----END`.
    Certificate, "AT+CONF? Certificate pem", timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONF Endpoint=<endpoint>`
    SetEndpoint<endpoint>, "AT+CONF Endpoint=", argument = 128,
    timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONNECT`: bring up the MQTT session, the one checked command.
    Connect, "AT+CONNECT", timeout_ms = MAX_CONNECT_DELAY_MS, expects = CONNECTED_REPLY
);

at_command!(
    /// `AT+CLOUD_SYNC`: fetch the final endpoint from the onboarding cloud.
    CloudSync, "AT+CLOUD_SYNC", timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONF Topic1=data`
    SetTopic, "AT+CONF Topic1=", fixed = TOPIC, timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+SEND1 Hello World!`
    PublishHello, "AT+SEND1 ", fixed = MESSAGE, timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONFMODE`: enter app-assisted onboarding.
    EnterOnboardingMode, "AT+CONFMODE", timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONF SSID=<ssid>`
    SetSsid<ssid>, "AT+CONF SSID=", argument = 32, timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONF Passphrase=<passphrase>`
    SetPassphrase<passphrase>, "AT+CONF Passphrase=", argument = 64,
    timeout_ms = RESPONSE_DELAY_MS
);

at_command!(
    /// `AT+CONNECT?`: cloud session status.
    ConnectStatus, "AT+CONNECT?", timeout_ms = RESPONSE_DELAY_MS, expects = CONNECTED_STATUS
);

at_command!(
    /// `AT+DIAG PING <host>`: Wi-Fi reachability check.
    Ping<host>, "AT+DIAG PING ", argument = 64, timeout_ms = RESPONSE_DELAY_MS,
    expects = PING_OK
);

#[cfg(test)]
mod tests {
    use super::*;

    fn wire<C: AtatCmd>(cmd: &C) -> std::string::String {
        let mut buf = [0u8; COMMAND_CAPACITY];
        let len = cmd.write(&mut buf);
        assert!(len <= C::MAX_LEN);
        std::string::String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    #[test]
    fn literal_commands_are_bit_exact() {
        assert_eq!(wire(&Disconnect), "AT+DISCONNECT\n");
        assert_eq!(wire(&ThingName), "AT+CONF? ThingName\n");
        assert_eq!(wire(&Certificate), "AT+CONF? Certificate pem\n");
        assert_eq!(wire(&Connect), "AT+CONNECT\n");
        assert_eq!(wire(&CloudSync), "AT+CLOUD_SYNC\n");
        assert_eq!(wire(&SetTopic), "AT+CONF Topic1=data\n");
        assert_eq!(wire(&PublishHello), "AT+SEND1 Hello World!\n");
        assert_eq!(wire(&EnterOnboardingMode), "AT+CONFMODE\n");
        assert_eq!(wire(&ConnectStatus), "AT+CONNECT?\n");
    }

    #[test]
    fn empty_credentials_match_placeholder_commands() {
        assert_eq!(wire(&SetSsid { ssid: "" }), "AT+CONF SSID=\n");
        assert_eq!(wire(&SetPassphrase { passphrase: "" }), "AT+CONF Passphrase=\n");
        assert_eq!(wire(&SetEndpoint { endpoint: "" }), "AT+CONF Endpoint=\n");
    }

    #[test]
    fn credentials_are_appended() {
        assert_eq!(wire(&SetSsid { ssid: "home-net" }), "AT+CONF SSID=home-net\n");
        assert_eq!(wire(&Ping { host: "8.8.8.8" }), "AT+DIAG PING 8.8.8.8\n");
        assert_eq!(SetSsid::LABEL, "AT+CONF SSID=");
        assert_eq!(SetSsid::EXPECTED, None);
    }

    #[test]
    fn connect_uses_extended_timeout_and_token() {
        assert_eq!(Connect::MAX_TIMEOUT_MS, MAX_CONNECT_DELAY_MS);
        assert_eq!(Connect::EXPECTED, Some("OK 1 CONNECTED\r\n"));
        assert_eq!(SetTopic::MAX_TIMEOUT_MS, RESPONSE_DELAY_MS);
        assert_eq!(Ping::EXPECTED, Some("OK"));
    }

    #[test]
    fn every_command_fits_the_command_buffer() {
        assert!(SetEndpoint::MAX_LEN <= COMMAND_CAPACITY);
        assert!(SetPassphrase::MAX_LEN <= COMMAND_CAPACITY);
        assert!(Ping::MAX_LEN <= COMMAND_CAPACITY);
        assert!(PublishHello::MAX_LEN <= COMMAND_CAPACITY);
    }

    #[test]
    fn short_buffer_truncates_instead_of_panicking() {
        let mut buf = [0u8; 4];
        assert_eq!(write_line(&mut buf, "AT+CONNECT", ""), 4);
        assert_eq!(&buf, b"AT+C");
    }
}
