//! The per-worker scheduling state machine.
//!
//! This is deliberately transport-free: `poll` says what the worker should do
//! next, `record` feeds a computed color back in, and `handle` consumes one
//! inbound message. Every method appends the messages it wants sent to the
//! caller's outbox. The async driver in [`crate::worker`] and the synchronous
//! simulator used by the tests both drive the same code.

use std::collections::BTreeMap;

use thiserror::Error;

use lux_core::types::{LoanRecord, Rank, Rgb, WorkRange};

use crate::message::{Envelope, Message, Outgoing};

/// Lifecycle phase of a worker.
///
/// `Computing` also covers the exhausted-but-indebted case: a worker whose
/// range is empty but whose debt counter is non-zero keeps servicing messages
/// until the debt clears, and only then starts seeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Computing,
    Seeking,
    Draining,
    Done,
}

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Compute this item and feed the result to [`WorkerProtocol::record`].
    Compute(u64),
    /// Nothing to do until an inbound message is handled.
    Wait,
    /// Terminal; the home buffer is complete.
    Finished,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("rank {rank}: work grant [{start}, {end}) arrived while {phase:?}")]
    UnexpectedGrant {
        rank: Rank,
        start: u64,
        end: u64,
        phase: Phase,
    },
    #[error("rank {rank}: malformed grant [{start}, {end}) with return address {return_at}")]
    MalformedGrant {
        rank: Rank,
        start: u64,
        end: u64,
        return_at: u64,
    },
    #[error("rank {rank}: work return from {from} with no live loan")]
    UnknownReturn { rank: Rank, from: Rank },
    #[error(
        "rank {rank}: return from {from} does not match its loan \
         (expected {expected_at}+{expected_len}, got {got_at}+{got_len})"
    )]
    ReturnMismatch {
        rank: Rank,
        from: Rank,
        expected_at: u64,
        expected_len: u64,
        got_at: u64,
        got_len: u64,
    },
    #[error("rank {rank}: item {item} delivered twice")]
    DuplicateItem { rank: Rank, item: u64 },
    #[error("rank {rank}: buffer requested while {phase:?}")]
    NotFinished { rank: Rank, phase: Phase },
    #[error("rank {rank}: {missing} home items were never computed or returned")]
    IncompleteBuffer { rank: Rank, missing: usize },
}

/// Work currently under the cursor: the worker's own partition, or a range
/// borrowed from a lender. Grants are made only while on home work; a
/// borrower relays help requests instead of sub-granting, which keeps every
/// loan anchored to its lender's home buffer.
#[derive(Debug)]
enum Task {
    Home,
    Borrowed {
        lender: Rank,
        return_at: u64,
        results: Vec<Rgb>,
    },
}

#[derive(Debug)]
pub struct WorkerProtocol {
    rank: Rank,
    world: u32,
    /// The initial partition; fixes the home buffer's extent. Immutable.
    home: WorkRange,
    /// End of the still-owned home suffix; shrinks when a grant is cut.
    home_end: u64,
    /// Results for the home range, indexed by `item - home.start`.
    buffer: Vec<Option<Rgb>>,
    task: Task,
    /// Active range being computed. For `Task::Home` this is the shrunk home
    /// range; for a borrow it is the granted range.
    range: WorkRange,
    /// Next uncomputed item of `range`.
    cursor: u64,
    /// Live loans keyed by borrower; at most one per borrower by construction.
    loans: BTreeMap<Rank, LoanRecord>,
    /// Count of unreturned loans. Kept explicitly; must always equal
    /// `loans.len()`.
    debt: usize,
    /// Where this worker's own help requests go: the static ring successor
    /// until a grant arrives, the most recent lender afterwards.
    help_target: Rank,
    token_outstanding: bool,
    phase: Phase,
}

impl WorkerProtocol {
    pub fn new(rank: Rank, world: u32, home: WorkRange) -> Self {
        let len = usize::try_from(home.len()).unwrap_or(usize::MAX);
        Self {
            rank,
            world,
            home,
            home_end: home.end,
            buffer: vec![None; len],
            task: Task::Home,
            range: home,
            cursor: home.start,
            loans: BTreeMap::new(),
            debt: 0,
            help_target: rank.ring_successor(world),
            token_outstanding: false,
            phase: Phase::Computing,
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn home(&self) -> WorkRange {
        self.home
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn debt(&self) -> usize {
        self.debt
    }

    pub fn loans(&self) -> impl Iterator<Item = &LoanRecord> {
        self.loans.values()
    }

    /// The still-uncomputed span under this worker's ownership.
    pub fn active_span(&self) -> WorkRange {
        WorkRange::new(self.cursor, self.range.end)
    }

    /// Whether `item`'s result currently lives in this worker (home slot or
    /// an unreturned borrow buffer).
    pub fn holds_result(&self, item: u64) -> bool {
        if self.home.contains(item) {
            let idx = (item - self.home.start) as usize;
            if self.buffer.get(idx).is_some_and(|slot| slot.is_some()) {
                return true;
            }
        }
        if let Task::Borrowed { return_at, results, .. } = &self.task {
            return *return_at <= item && item < return_at + results.len() as u64;
        }
        false
    }

    /// Decides the next action. May transition `Computing -> Seeking -> Done`
    /// when the range is exhausted, emitting the work return and/or the help
    /// token that the transition requires.
    pub fn poll(&mut self, out: &mut Vec<Outgoing>) -> Step {
        match self.phase {
            Phase::Done => Step::Finished,
            Phase::Seeking | Phase::Draining => Step::Wait,
            Phase::Computing => {
                if self.cursor < self.range.end {
                    return Step::Compute(self.cursor);
                }
                self.on_exhausted(out)
            }
        }
    }

    /// Feeds back the color for the item most recently issued by `poll`.
    pub fn record(&mut self, color: Rgb) {
        debug_assert!(self.cursor < self.range.end);
        match &mut self.task {
            Task::Home => {
                let idx = (self.cursor - self.home.start) as usize;
                self.buffer[idx] = Some(color);
            }
            Task::Borrowed { results, .. } => results.push(color),
        }
        self.cursor += 1;
    }

    fn on_exhausted(&mut self, out: &mut Vec<Outgoing>) -> Step {
        if let Task::Borrowed { lender, return_at, results } =
            std::mem::replace(&mut self.task, Task::Home)
        {
            out.push(Outgoing {
                to: lender,
                msg: Message::WorkReturn { return_at, results },
            });
            self.range = WorkRange::new(self.home_end, self.home_end);
            self.cursor = self.home_end;
        }
        if self.debt > 0 {
            // Exhausted but owed results: keep servicing messages only.
            return Step::Wait;
        }
        self.enter_seeking(out)
    }

    fn enter_seeking(&mut self, out: &mut Vec<Outgoing>) -> Step {
        self.phase = Phase::Seeking;
        if self.rank.ring_successor(self.world) == self.rank {
            // Single-worker world: the token's circuit is trivially complete
            // without sending anything.
            self.phase = Phase::Done;
            return Step::Finished;
        }
        out.push(Outgoing {
            to: self.help_target,
            msg: Message::HelpRequest { requester: self.rank },
        });
        self.token_outstanding = true;
        Step::Wait
    }

    /// Handles one inbound message, appending any responses to `out`.
    pub fn handle(&mut self, env: Envelope, out: &mut Vec<Outgoing>) -> Result<(), ProtocolError> {
        match env.msg {
            Message::HelpRequest { requester } => self.on_help_request(requester, out),
            Message::WorkGrant { range, return_at } => {
                self.on_work_grant(env.from, range, return_at)
            }
            Message::WorkReturn { return_at, results } => {
                self.on_work_return(env.from, return_at, results)
            }
        }
    }

    fn on_help_request(
        &mut self,
        requester: Rank,
        out: &mut Vec<Outgoing>,
    ) -> Result<(), ProtocolError> {
        if requester == self.rank {
            // Our own token made a full, grant-free circuit. Stale tokens
            // arriving after the decision are dropped.
            if self.phase == Phase::Seeking {
                self.token_outstanding = false;
                self.phase = if self.debt == 0 { Phase::Done } else { Phase::Draining };
            }
            return Ok(());
        }

        if let Some(granted) = self.splittable_for(requester) {
            self.range.end = granted.start;
            self.home_end = granted.start;
            self.loans.insert(
                requester,
                LoanRecord {
                    borrower: requester,
                    return_at: granted.start,
                    len: granted.len(),
                },
            );
            self.debt += 1;
            out.push(Outgoing {
                to: requester,
                msg: Message::WorkGrant { range: granted, return_at: granted.start },
            });
        } else {
            // Nothing to spare here; the token continues around the ring.
            out.push(Outgoing {
                to: self.rank.ring_successor(self.world),
                msg: Message::HelpRequest { requester },
            });
        }
        Ok(())
    }

    /// A grant is cut only from the home range, and never to a borrower that
    /// still owes us a return: its new request can overtake its in-flight
    /// return, and a second loan would overwrite the first in the
    /// rank-keyed table.
    fn splittable_for(&self, requester: Rank) -> Option<WorkRange> {
        if self.phase != Phase::Computing {
            return None;
        }
        if !matches!(self.task, Task::Home) {
            return None;
        }
        if self.loans.contains_key(&requester) {
            return None;
        }
        self.range.split_for_grant(self.cursor)
    }

    fn on_work_grant(
        &mut self,
        from: Rank,
        range: WorkRange,
        return_at: u64,
    ) -> Result<(), ProtocolError> {
        if !matches!(self.phase, Phase::Seeking | Phase::Draining) {
            return Err(ProtocolError::UnexpectedGrant {
                rank: self.rank,
                start: range.start,
                end: range.end,
                phase: self.phase,
            });
        }
        if range.is_empty() || return_at != range.start {
            return Err(ProtocolError::MalformedGrant {
                rank: self.rank,
                start: range.start,
                end: range.end,
                return_at,
            });
        }
        // The granter consumed our token instead of relaying it.
        self.token_outstanding = false;
        self.help_target = from;
        self.task = Task::Borrowed {
            lender: from,
            return_at,
            results: Vec::with_capacity(range.len() as usize),
        };
        self.range = range;
        self.cursor = range.start;
        self.phase = Phase::Computing;
        Ok(())
    }

    fn on_work_return(
        &mut self,
        from: Rank,
        return_at: u64,
        results: Vec<Rgb>,
    ) -> Result<(), ProtocolError> {
        let Some(loan) = self.loans.remove(&from) else {
            return Err(ProtocolError::UnknownReturn { rank: self.rank, from });
        };
        if loan.return_at != return_at || loan.len != results.len() as u64 {
            return Err(ProtocolError::ReturnMismatch {
                rank: self.rank,
                from,
                expected_at: loan.return_at,
                expected_len: loan.len,
                got_at: return_at,
                got_len: results.len() as u64,
            });
        }
        for (i, color) in results.into_iter().enumerate() {
            let item = return_at + i as u64;
            let idx = (item - self.home.start) as usize;
            if self.buffer[idx].is_some() {
                return Err(ProtocolError::DuplicateItem { rank: self.rank, item });
            }
            self.buffer[idx] = Some(color);
        }
        self.debt -= 1;
        if self.phase == Phase::Draining && self.debt == 0 {
            self.phase = Phase::Done;
        }
        Ok(())
    }

    /// Takes the completed home buffer. Fails if the worker is not `Done` or
    /// any home item is still missing (an orphaned item is a protocol bug).
    pub fn take_buffer(&mut self) -> Result<Vec<Rgb>, ProtocolError> {
        if self.phase != Phase::Done {
            return Err(ProtocolError::NotFinished { rank: self.rank, phase: self.phase });
        }
        let buffer = std::mem::take(&mut self.buffer);
        let total = buffer.len();
        let complete: Vec<Rgb> = buffer.into_iter().flatten().collect();
        if complete.len() != total {
            return Err(ProtocolError::IncompleteBuffer {
                rank: self.rank,
                missing: total - complete.len(),
            });
        }
        Ok(complete)
    }
}
