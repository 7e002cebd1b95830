//! Run orchestration: partition once, spawn the workers, gather once.

use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use tokio::sync::{mpsc, watch};

use lux_core::kernel::Kernel;
use lux_core::partition::partition;
use lux_core::types::{Rank, Rgb};

use crate::fabric::Fabric;
use crate::metrics::RunMetrics;
use crate::protocol::WorkerProtocol;
use crate::worker::{run_worker, GatherMsg};

#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Total number of work items (pixels).
    pub items: u64,
    /// Number of cooperating workers (the world size).
    pub workers: u32,
}

pub struct RunOutput {
    /// Globally ordered results, one per item in `[0, items)`.
    pub image: Vec<Rgb>,
    pub metrics: Arc<RunMetrics>,
}

/// Renders all items through the work-stealing scheduler and gathers the
/// result. This is the only all-to-one synchronization point: it returns
/// once every worker has reached its terminal state and delivered its
/// buffer.
pub async fn run(config: RunConfig, kernel: Arc<dyn Kernel>) -> Result<RunOutput> {
    let ranges = partition(config.items, config.workers)?;
    let world = config.workers;

    let (fabric, mailboxes) = Fabric::new(world);
    let fabric = Arc::new(fabric);
    let (gather_tx, mut gather_rx) = mpsc::unbounded_channel::<GatherMsg>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(RunMetrics::default());

    let mut handles = Vec::with_capacity(world as usize);
    for (rank, (home, mailbox)) in ranges.into_iter().zip(mailboxes).enumerate() {
        let proto = WorkerProtocol::new(Rank(rank as u32), world, home);
        handles.push(tokio::spawn(run_worker(
            proto,
            kernel.clone(),
            fabric.clone(),
            mailbox,
            gather_tx.clone(),
            shutdown_rx.clone(),
            metrics.clone(),
        )));
    }
    drop(gather_tx);
    drop(shutdown_rx);

    let items = usize::try_from(config.items).context("item count exceeds address space")?;
    let mut image: Vec<Option<Rgb>> = vec![None; items];
    for _ in 0..world {
        let Some(GatherMsg { rank, home, buffer }) = gather_rx.recv().await else {
            return Err(anyhow!("a worker exited before delivering its buffer"));
        };
        ensure!(
            buffer.len() as u64 == home.len(),
            "rank {rank} delivered {} results for a home range of {}",
            buffer.len(),
            home.len()
        );
        for (i, color) in buffer.into_iter().enumerate() {
            let slot = home.start as usize + i;
            ensure!(
                image[slot].is_none(),
                "item {slot} delivered by more than one worker"
            );
            image[slot] = Some(color);
        }
        tracing::debug!(
            target: "lux_proof",
            event = "buffer_gathered",
            rank = %rank,
            start = home.start,
            end = home.end,
            "gathered home buffer"
        );
    }

    // Every buffer is in; release the workers still relaying stray tokens.
    let _ = shutdown_tx.send(true);
    for handle in handles {
        handle.await??;
    }

    let image: Vec<Rgb> = image
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| anyhow!("orphaned items after gather"))?;

    tracing::info!(
        target: "lux_proof",
        event = "gather_complete",
        items = config.items,
        workers = world,
        "run complete"
    );
    Ok(RunOutput { image, metrics })
}
