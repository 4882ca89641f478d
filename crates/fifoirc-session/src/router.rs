//! Maps lines to outgoing frames and automatic reactions.

use fifoirc_transport::{
    Frame, IncomingEvent,
    protocol::{VERSION_REPLY, escape, strip_terminator},
};

/// What the session should do in response to a remote line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Send a frame back to the remote.
    Reply(Frame),
    /// Write these bytes to the external program.
    Forward(Vec<u8>),
}

/// Stateless routing rules for one session.
#[derive(Debug, Clone)]
pub struct Router {
    target: String,
    forward: bool,
}

impl Router {
    /// Route local lines to `target`; forward directed messages to the
    /// program only when `forward` is set.
    #[must_use]
    pub fn new(target: impl Into<String>, forward: bool) -> Self {
        Self {
            target: target.into(),
            forward,
        }
    }

    /// Where local lines are sent.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Frame one local line for the remote. Blank lines produce nothing.
    #[must_use]
    pub fn outgoing(&self, line: &[u8]) -> Option<Frame> {
        let text: Vec<u8> = line
            .iter()
            .copied()
            .filter(|&b| b != b'\r' && b != b'\n')
            .collect();
        if text.is_empty() {
            return None;
        }
        Some(Frame::privmsg(&self.target, &text))
    }

    /// React to one line read from the remote. A line that is both a
    /// keepalive and a directed message gets both reactions, in that order.
    #[must_use]
    pub fn incoming(&self, line: &[u8]) -> Vec<Reaction> {
        let mut reactions = Vec::new();

        for event in IncomingEvent::classify(line) {
            match event {
                IncomingEvent::KeepalivePing { argument } => {
                    reactions.push(Reaction::Reply(Frame::pong(argument)));
                }
                IncomingEvent::DirectedMessage { sender, body, .. } => {
                    if self.forward {
                        let mut forwarded = Vec::with_capacity(body.len() + 1);
                        forwarded.extend_from_slice(body);
                        forwarded.push(b'\n');
                        reactions.push(Reaction::Forward(forwarded));
                    }
                    if event.is_version_query() {
                        match sender {
                            Some(sender) => reactions.push(Reaction::Reply(Frame::notice(
                                sender,
                                VERSION_REPLY.as_bytes(),
                            ))),
                            None => tracing::debug!(
                                line = %escape(strip_terminator(line)),
                                "Version query without a sender"
                            ),
                        }
                    }
                }
            }
        }

        reactions
    }
}
