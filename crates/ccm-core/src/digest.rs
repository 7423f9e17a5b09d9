//! Reply framing for the CCM's line protocol
//!
//! The module answers every command with one line starting `OK` or
//! `ERR<n>`, ended by `\r\n`. The certificate query is the exception: its
//! `OK` line opens a PEM block and the reply runs until the line carrying
//! `-----END`. Anything else on the line (command echo, blank lines,
//! boot chatter) is dropped before it can be taken for a reply.

use atat::{AtatUrc, DigestResult, Digester};
use log::{debug, warn};

use crate::client::REPLY_CAPACITY;

const PEM_BEGIN: &[u8] = b"-----BEGIN";
const PEM_END: &[u8] = b"-----END";

/// [`Digester`] that turns the module's reply lines into responses.
#[derive(Debug, Default)]
pub struct ReplyDigester;

impl ReplyDigester {
    pub const fn new() -> Self {
        Self
    }
}

impl Digester for ReplyDigester {
    fn digest<'a>(&mut self, buf: &'a [u8]) -> (DigestResult<'a>, usize) {
        let start = buf
            .iter()
            .position(|b| !matches!(b, b'\r' | b'\n'))
            .unwrap_or(buf.len());
        let rest = &buf[start..];

        let Some(first) = line_len(rest) else {
            if rest.len() >= REPLY_CAPACITY {
                warn!("Dropping {} bytes without a line end", rest.len());
                return (DigestResult::None, buf.len());
            }
            return (DigestResult::None, start);
        };

        if !is_reply(&rest[..first]) {
            debug!("Ignoring line {:?}", LossyLine(&rest[..first]));
            return (DigestResult::None, start + first);
        }

        let len = if contains(&rest[..first], PEM_BEGIN) && !contains(&rest[..first], PEM_END) {
            match pem_len(rest, first) {
                Some(len) => len,
                None if rest.len() >= REPLY_CAPACITY => {
                    warn!("Dropping PEM reply larger than {} bytes", REPLY_CAPACITY);
                    return (DigestResult::None, buf.len());
                }
                None => return (DigestResult::None, start),
            }
        } else {
            first
        };

        (DigestResult::Response(Ok(&rest[..len])), start + len)
    }
}

/// The module sends no unsolicited result codes the sequence listens to.
#[derive(Debug, Clone)]
pub enum NoUrc {}

impl AtatUrc for NoUrc {
    type Response = NoUrc;

    fn parse(_resp: &[u8]) -> Option<Self::Response> {
        None
    }
}

fn is_reply(line: &[u8]) -> bool {
    line.starts_with(b"OK") || line.starts_with(b"ERR")
}

/// Length of the first line, `\n` included
fn line_len(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|i| i + 1)
}

/// Length of a PEM reply whose first line is `first` bytes long
fn pem_len(buf: &[u8], first: usize) -> Option<usize> {
    let mut end = first;
    while let Some(len) = line_len(&buf[end..]) {
        end += len;
        if contains(&buf[end - len..end], PEM_END) {
            return Some(end);
        }
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

struct LossyLine<'a>(&'a [u8]);

impl core::fmt::Debug for LossyLine<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for chunk in self.0.utf8_chunks() {
            write!(f, "{}", chunk.valid().trim_end())?;
        }
        Ok(())
    }
}
