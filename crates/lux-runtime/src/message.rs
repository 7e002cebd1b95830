use serde::{Deserialize, Serialize};

use lux_core::types::{Rank, Rgb, WorkRange};

/// The wire contract between workers. Channels are FIFO per ordered pair of
/// ranks only, so receivers must dispatch on the kind, never on arrival
/// order across peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// A circulating plea for work, tagged with its originator. Doubles as
    /// the termination token: when it arrives back at `requester`, it has
    /// completed a grant-free circuit of the ring.
    HelpRequest { requester: Rank },
    /// A sub-range donated to the requester. `return_at` is the global item
    /// index at which the results must be written back (always the granted
    /// range's start).
    WorkGrant { range: WorkRange, return_at: u64 },
    /// The completed results for a borrowed range, headed back to the lender.
    WorkReturn { return_at: u64, results: Vec<Rgb> },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::HelpRequest { .. } => "help_request",
            Message::WorkGrant { .. } => "work_grant",
            Message::WorkReturn { .. } => "work_return",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: Rank,
    pub msg: Message,
}

/// A message the protocol wants delivered; the driver owns the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: Rank,
    pub msg: Message,
}
