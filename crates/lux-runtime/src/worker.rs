//! Async driver for one worker: alternates compute steps with non-blocking
//! mailbox drains while there is work, and parks on the mailbox otherwise.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch};

use lux_core::kernel::Kernel;
use lux_core::types::{Rank, Rgb, WorkRange};

use crate::fabric::{Fabric, Mailbox};
use crate::message::{Message, Outgoing};
use crate::metrics::RunMetrics;
use crate::protocol::{Step, WorkerProtocol};

/// One worker's completed home buffer, shipped to the aggregator.
#[derive(Debug)]
pub struct GatherMsg {
    pub rank: Rank,
    pub home: WorkRange,
    pub buffer: Vec<Rgb>,
}

pub async fn run_worker(
    mut proto: WorkerProtocol,
    kernel: Arc<dyn Kernel>,
    fabric: Arc<Fabric>,
    mut mailbox: Mailbox,
    gather: mpsc::UnboundedSender<GatherMsg>,
    mut shutdown: watch::Receiver<bool>,
    metrics: Arc<RunMetrics>,
) -> Result<()> {
    let rank = proto.rank();
    let mut out: Vec<Outgoing> = Vec::new();

    loop {
        match proto.poll(&mut out) {
            Step::Compute(item) => {
                let color = kernel.compute(item);
                proto.record(color);
                metrics.items_computed_total.inc();
                flush(rank, &fabric, &metrics, &mut out);
                // Handle at most the messages pending right now; never block
                // while holding uncomputed work.
                while let Ok(env) = mailbox.try_recv() {
                    proto.handle(env, &mut out)?;
                    flush(rank, &fabric, &metrics, &mut out);
                }
            }
            Step::Wait => {
                flush(rank, &fabric, &metrics, &mut out);
                let env = mailbox
                    .recv()
                    .await
                    .ok_or_else(|| anyhow!("rank {rank}: mailbox closed mid-run"))?;
                proto.handle(env, &mut out)?;
                flush(rank, &fabric, &metrics, &mut out);
            }
            Step::Finished => break,
        }
    }

    let buffer = proto.take_buffer()?;
    metrics.workers_done.add(1);
    tracing::info!(
        target: "lux_proof",
        event = "worker_done",
        rank = %rank,
        start = proto.home().start,
        end = proto.home().end,
        "worker finished"
    );
    gather
        .send(GatherMsg { rank, home: proto.home(), buffer })
        .map_err(|_| anyhow!("rank {rank}: aggregator is gone"))?;

    // Keep foreign tokens moving so peers still seeking can complete their
    // circuits; stop once the aggregator has everything.
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            env = mailbox.recv() => {
                let Some(env) = env else { break };
                proto.handle(env, &mut out)?;
                flush(rank, &fabric, &metrics, &mut out);
            }
        }
    }
    Ok(())
}

fn flush(rank: Rank, fabric: &Fabric, metrics: &RunMetrics, out: &mut Vec<Outgoing>) {
    for Outgoing { to, msg } in out.drain(..) {
        match &msg {
            Message::HelpRequest { requester } if *requester == rank => {
                metrics.tokens_issued_total.inc();
                tracing::debug!(
                    target: "lux_proof",
                    event = "help_request",
                    rank = %rank,
                    to = %to,
                    "asking for work"
                );
            }
            Message::HelpRequest { requester } => {
                metrics.tokens_relayed_total.inc();
                tracing::trace!(
                    target: "lux_proof",
                    event = "relay",
                    rank = %rank,
                    requester = %requester,
                    to = %to,
                    "relaying help request"
                );
            }
            Message::WorkGrant { range, .. } => {
                metrics.grants_total.inc();
                tracing::info!(
                    target: "lux_proof",
                    event = "grant",
                    rank = %rank,
                    to = %to,
                    start = range.start,
                    end = range.end,
                    "granting work"
                );
            }
            Message::WorkReturn { return_at, results } => {
                metrics.returns_total.inc();
                tracing::info!(
                    target: "lux_proof",
                    event = "work_return",
                    rank = %rank,
                    to = %to,
                    start = return_at,
                    end = return_at + results.len() as u64,
                    "returning results"
                );
            }
        }
        fabric.send(rank, to, msg);
    }
}
