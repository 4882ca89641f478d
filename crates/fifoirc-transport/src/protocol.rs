//! Wire codec for the line-oriented chat protocol.
//!
//! Outgoing traffic is built as [`Frame`]s: one protocol line plus CRLF, never
//! longer than [`MAX_FRAME_LEN`]. Incoming lines are classified into
//! [`IncomingEvent`]s.

/// Hard ceiling for one protocol line, terminator included.
pub const MAX_FRAME_LEN: usize = 512;

/// Budget for a directed message built from local input, terminator excluded.
///
/// The server echoes our messages to other clients with our full
/// `nick!user@host` prepended, so local lines stay well below the ceiling.
pub const LOCAL_LINE_RESERVE: usize = 450;

/// Line terminator on the wire.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Capability query payload asking for our version.
pub const VERSION_QUERY: &[u8] = b"\x01VERSION\x01";

/// Payload sent back to a version query.
pub const VERSION_REPLY: &str = concat!("\x01VERSION fifoirc ", env!("CARGO_PKG_VERSION"), "\x01");

/// Account service that receives the identification secret.
pub const ACCOUNT_SERVICE: &str = "NickServ";

const PING: &[u8] = b"PING";
const PING_TOKEN: &[u8] = b"PING ";
const PONG: &[u8] = b"PONG";
const PRIVMSG: &[u8] = b"PRIVMSG";

/// One encoded outgoing protocol line, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Build `head` + `payload` + CRLF with head and payload together limited
    /// to `limit` bytes.
    ///
    /// The head is the framing prefix (command and addressing) and is never
    /// cut; only the payload is truncated. CR, LF and NUL are removed from
    /// the payload so the frame stays a single protocol line.
    #[must_use]
    pub fn with_limit(head: &[u8], payload: &[u8], limit: usize) -> Self {
        let limit = limit.min(MAX_FRAME_LEN - TERMINATOR.len());
        let payload = sanitize(payload);
        let room = limit.saturating_sub(head.len());
        let payload = truncate_payload(&payload, room);

        let mut bytes = Vec::with_capacity(head.len() + payload.len() + TERMINATOR.len());
        bytes.extend_from_slice(head);
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(TERMINATOR);
        Self { bytes }
    }

    /// Build a frame limited only by the protocol ceiling.
    #[must_use]
    pub fn new(head: &[u8], payload: &[u8]) -> Self {
        Self::with_limit(head, payload, MAX_FRAME_LEN - TERMINATOR.len())
    }

    /// `NICK <nickname>`
    #[must_use]
    pub fn nick(nickname: &str) -> Self {
        Self::new(b"NICK ", nickname.as_bytes())
    }

    /// `USER <nickname> localhost <server> :<display name>`
    #[must_use]
    pub fn user(nickname: &str, server: &str, display_name: &str) -> Self {
        let head = format!("USER {nickname} localhost {server} :");
        Self::new(head.as_bytes(), display_name.as_bytes())
    }

    /// Identification request sent to the account service.
    #[must_use]
    pub fn identify(nickname: &str, secret: &str) -> Self {
        let head = format!("PRIVMSG {ACCOUNT_SERVICE} :identify {nickname} ");
        Self::new(head.as_bytes(), secret.as_bytes())
    }

    /// `JOIN <channel>`
    #[must_use]
    pub fn join(channel: &str) -> Self {
        Self::new(b"JOIN ", channel.as_bytes())
    }

    /// Directed message built from one line of local input.
    #[must_use]
    pub fn privmsg(target: &str, text: &[u8]) -> Self {
        let head = format!("PRIVMSG {target} :");
        Self::with_limit(head.as_bytes(), text, LOCAL_LINE_RESERVE)
    }

    /// `NOTICE <target> :<text>`
    #[must_use]
    pub fn notice(target: &[u8], text: &[u8]) -> Self {
        let mut head = Vec::with_capacity(target.len() + 9);
        head.extend_from_slice(b"NOTICE ");
        head.extend_from_slice(&sanitize(target));
        head.extend_from_slice(b" :");
        Self::new(&head, text)
    }

    /// Keepalive ping, `PING :<token>`.
    #[must_use]
    pub fn ping(token: &str) -> Self {
        Self::new(b"PING :", token.as_bytes())
    }

    /// Keepalive acknowledgment echoing a ping's argument unchanged.
    #[must_use]
    pub fn pong(argument: &[u8]) -> Self {
        Self::new(PONG, argument)
    }

    /// `QUIT`
    #[must_use]
    pub fn quit() -> Self {
        Self::new(b"QUIT", b"")
    }

    /// Encoded bytes, terminator included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The protocol line without its terminator.
    #[must_use]
    pub fn line(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - TERMINATOR.len()]
    }
}

/// One classified line from the remote connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingEvent<'a> {
    /// `PING <argument>`; `argument` keeps its leading separator.
    KeepalivePing { argument: &'a [u8] },
    /// `:<sender>!... PRIVMSG <target> :<body>`
    DirectedMessage {
        sender: Option<&'a [u8]>,
        target: &'a [u8],
        body: &'a [u8],
    },
}

impl<'a> IncomingEvent<'a> {
    /// Every event a line carries, in checking order. The rules are
    /// independent, so one line can yield both a keepalive and a directed
    /// message; a line matching neither yields nothing. Any trailing
    /// terminator is ignored.
    #[must_use]
    pub fn classify(line: &'a [u8]) -> Vec<Self> {
        let line = strip_terminator(line);
        [Self::keepalive(line), Self::directed(line)]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Whether this is a version capability query.
    #[must_use]
    pub fn is_version_query(&self) -> bool {
        matches!(self, Self::DirectedMessage { body, .. } if *body == VERSION_QUERY)
    }

    // The token must be followed by a space: a bare `PING` is not a keepalive.
    fn keepalive(line: &'a [u8]) -> Option<Self> {
        if !line.starts_with(PING_TOKEN) {
            return None;
        }
        Some(Self::KeepalivePing {
            argument: &line[PING.len()..],
        })
    }

    fn directed(line: &'a [u8]) -> Option<Self> {
        let mut fields = line.splitn(3, |&b| b == b' ');
        let prefix = fields.next().unwrap_or_default();
        if fields.next() != Some(PRIVMSG) {
            return None;
        }
        let rest = fields.next().unwrap_or_default();

        let (target, after_target) = match rest.iter().position(|&b| b == b' ') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, &rest[rest.len()..]),
        };
        let body = match rest.iter().position(|&b| b == b':') {
            Some(i) => &rest[i + 1..],
            None => after_target,
        };

        Some(Self::DirectedMessage {
            sender: sender_of(prefix),
            target,
            body,
        })
    }
}

/// Cut a line at its first CR or LF.
#[must_use]
pub fn strip_terminator(line: &[u8]) -> &[u8] {
    line.iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .map_or(line, |i| &line[..i])
}

/// Printable rendering of wire bytes for logs.
#[must_use]
pub fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

fn sender_of(prefix: &[u8]) -> Option<&[u8]> {
    let source = prefix.strip_prefix(b":")?;
    let nick = source
        .iter()
        .position(|&b| b == b'!')
        .map_or(source, |i| &source[..i]);
    (!nick.is_empty()).then_some(nick)
}

fn sanitize(payload: &[u8]) -> Vec<u8> {
    payload
        .iter()
        .copied()
        .filter(|&b| !matches!(b, b'\r' | b'\n' | 0))
        .collect()
}

// Cuts at a character boundary when the payload is text.
fn truncate_payload(payload: &[u8], room: usize) -> &[u8] {
    if payload.len() <= room {
        return payload;
    }
    match std::str::from_utf8(payload) {
        Ok(text) => {
            let mut end = room;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &payload[..end]
        }
        Err(_) => &payload[..room],
    }
}
