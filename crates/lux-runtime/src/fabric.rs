//! In-process message fabric: one mailbox per worker, FIFO per ordered pair
//! of ranks (a tokio mpsc channel preserves per-sender order). Senders are
//! unbounded so a send never suspends the sending worker; channel capacity is
//! bounded in practice by the protocol (a worker has at most one token, one
//! grant, and one return in flight per peer).

use tokio::sync::mpsc;

use lux_core::types::Rank;

use crate::message::{Envelope, Message};

pub type Mailbox = mpsc::UnboundedReceiver<Envelope>;

#[derive(Debug)]
pub struct Fabric {
    senders: Vec<mpsc::UnboundedSender<Envelope>>,
}

impl Fabric {
    /// Builds the full mesh for `world` workers, returning the shared send
    /// side and one mailbox per rank, indexed by rank.
    pub fn new(world: u32) -> (Fabric, Vec<Mailbox>) {
        let mut senders = Vec::with_capacity(world as usize);
        let mut mailboxes = Vec::with_capacity(world as usize);
        for _ in 0..world {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            mailboxes.push(rx);
        }
        (Fabric { senders }, mailboxes)
    }

    /// Delivers `msg` to `to`'s mailbox. A closed mailbox means the receiver
    /// already finished and stopped reading; the message is dropped, exactly
    /// as an unreceived buffered message would be at teardown.
    pub fn send(&self, from: Rank, to: Rank, msg: Message) {
        let Some(tx) = self.senders.get(to.0 as usize) else {
            tracing::warn!(from = %from, to = %to, kind = msg.kind(), "send to unknown rank dropped");
            return;
        };
        if tx.send(Envelope { from, msg }).is_err() {
            tracing::debug!(from = %from, to = %to, "mailbox closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn per_pair_order_is_preserved() {
        let (fabric, mut mailboxes) = Fabric::new(2);
        fabric.send(Rank(0), Rank(1), Message::HelpRequest { requester: Rank(0) });
        fabric.send(
            Rank(0),
            Rank(1),
            Message::WorkReturn { return_at: 3, results: vec![] },
        );

        let first = mailboxes[1].recv().await.unwrap();
        let second = mailboxes[1].recv().await.unwrap();
        assert_eq!(first.msg.kind(), "help_request");
        assert_eq!(second.msg.kind(), "work_return");
        assert_eq!(second.from, Rank(0));
    }
}
