//! The move queue and its single consumer.
//!
//! All physical motion goes through one unbounded FIFO. Producers hold cheap
//! [`MoveQueue`] clones; exactly one [`MoveReceiver`] exists, and it belongs
//! to the [`MoveConsumer`]. Because nothing else can pop the queue, at most
//! one open/dwell/close sequence is ever in progress.
//!
//! # Example
//!
//! ```rust
//! use smart_can::queue::move_queue;
//! use smart_can::CommandSource;
//!
//! let (queue, mut receiver) = move_queue();
//! queue.push(1, CommandSource::Pedal).unwrap();
//! queue.push(2, CommandSource::Remote).unwrap();
//!
//! assert_eq!(receiver.try_recv().map(|r| r.bin), Some(1));
//! assert_eq!(receiver.try_recv().map(|r| r.bin), Some(2));
//! assert_eq!(receiver.try_recv(), None);
//! ```

use std::time::Duration;

use log::{error, info};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use crate::commands::{CommandSource, MoveOutcome, MoveRequest};
use crate::error::QueueClosed;
use crate::lid::LidController;
use crate::traits::{DigitalOutputs, PositionSensor};

/// Create a connected queue and receiver.
pub fn move_queue() -> (MoveQueue, MoveReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MoveQueue { tx }, MoveReceiver { rx })
}

/// Producer handle. Pushing never blocks.
#[derive(Clone, Debug)]
pub struct MoveQueue {
    tx: mpsc::UnboundedSender<MoveRequest>,
}

impl MoveQueue {
    /// Append a request for `bin`.
    ///
    /// Range checking happens when the request is serviced, not here.
    pub fn push(&self, bin: u8, source: CommandSource) -> Result<(), QueueClosed> {
        self.send(MoveRequest::new(bin, source))
    }

    /// Append a prepared request.
    pub fn send(&self, request: MoveRequest) -> Result<(), QueueClosed> {
        self.tx.send(request).map_err(|_| QueueClosed)
    }

    /// True once the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The single consuming end of the queue.
#[derive(Debug)]
pub struct MoveReceiver {
    rx: mpsc::UnboundedReceiver<MoveRequest>,
}

impl MoveReceiver {
    /// Wait for the next request. `None` once every producer is gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<MoveRequest> {
        self.rx.recv().await
    }

    /// Take the next request if one is already waiting.
    pub fn try_recv(&mut self) -> Option<MoveRequest> {
        self.rx.try_recv().ok()
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Drains the queue one request at a time: open, dwell, close.
pub struct MoveConsumer<S, O> {
    lid: LidController<S, O>,
    receiver: MoveReceiver,
    dwell: Duration,
    reports: Option<mpsc::UnboundedSender<MoveOutcome>>,
}

impl<S: PositionSensor, O: DigitalOutputs> MoveConsumer<S, O> {
    /// Consumer with the default 10 s dwell.
    pub fn new(lid: LidController<S, O>, receiver: MoveReceiver) -> Self {
        Self {
            lid,
            receiver,
            dwell: Duration::from_secs(10),
            reports: None,
        }
    }

    /// Keep the lid open for `dwell` before closing.
    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    /// Send a [`MoveOutcome`] for every serviced request.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<MoveOutcome>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// The lid being driven
    pub fn lid(&self) -> &LidController<S, O> {
        &self.lid
    }

    /// Service requests until every producer has been dropped.
    pub async fn run(&mut self) {
        while let Some(request) = self.receiver.recv().await {
            let outcome = self.service(request).await;
            if let Some(reports) = &self.reports {
                let _ = reports.send(outcome);
            }
        }
        info!("Move queue closed, consumer stopping");
    }

    /// Open over the requested bin, dwell, then close.
    ///
    /// A failed open skips the dwell. The close is attempted regardless.
    pub async fn service(&mut self, request: MoveRequest) -> MoveOutcome {
        info!("Consuming '{request}'");
        let started_at = Instant::now();

        let open = self.lid.open(request.bin).await;
        match &open {
            Ok(()) => sleep(self.dwell).await,
            Err(e) => error!("Failed to open bin {}: {e}", request.bin),
        }

        let close = self.lid.close().await;
        if let Err(e) = &close {
            error!("Failed to close after '{request}': {e}");
        }

        info!("Finished '{request}'");
        MoveOutcome {
            request,
            open,
            close,
            started_at,
            finished_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_after_receiver_dropped_fails() {
        let (queue, receiver) = move_queue();
        drop(receiver);
        assert!(queue.is_closed());
        assert_eq!(queue.push(0, CommandSource::Pedal), Err(QueueClosed));
    }

    #[tokio::test]
    async fn receiver_ends_when_producers_drop() {
        let (queue, mut receiver) = move_queue();
        let second = queue.clone();
        queue.push(1, CommandSource::Remote).unwrap();
        drop(queue);
        drop(second);
        assert_eq!(receiver.recv().await, Some(MoveRequest::remote(1)));
        assert_eq!(receiver.recv().await, None);
    }
}
