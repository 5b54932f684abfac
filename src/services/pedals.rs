//! Pedal presses from interrupt context onto the move queue.
//!
//! Interrupt callbacks run on the GPIO driver's thread. All they do is
//! [`schedule`](InterruptHandoff::schedule) the channel number through a
//! thread-safe channel. The [`HardwareEventBridge`] receives it on the
//! scheduler, looks up the bin and pushes the move.
//!
//! ```text
//! driver thread                     scheduler
//! ─────────────                     ─────────
//! edge on pin 20 ──schedule(20)──►  bridge: 20 -> bin 1 ──push──► MoveQueue
//! ```

use std::collections::BTreeMap;

use log::{info, warn};
use tokio::sync::mpsc;

use crate::config::{PedalBinding, PedalConfig};
use crate::error::HardwareError;
use crate::queue::MoveQueue;
use crate::traits::{Edge, InterruptSource};
use crate::CommandSource;

/// Thread-safe handle an interrupt callback uses to reach the scheduler.
#[derive(Debug, Clone)]
pub struct InterruptHandoff {
    tx: mpsc::UnboundedSender<u8>,
}

impl InterruptHandoff {
    /// Hand `channel` over to the bridge. Never blocks.
    ///
    /// Returns false once the bridge is gone.
    pub fn schedule(&self, channel: u8) -> bool {
        self.tx.send(channel).is_ok()
    }
}

/// Turns pedal events into queued moves.
#[derive(Debug)]
pub struct HardwareEventBridge {
    bindings: BTreeMap<u8, u8>,
    handoff: InterruptHandoff,
    events: mpsc::UnboundedReceiver<u8>,
    queue: MoveQueue,
}

impl HardwareEventBridge {
    /// Bridge for the given channel to bin table.
    pub fn new(bindings: impl IntoIterator<Item = PedalBinding>, queue: MoveQueue) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        Self {
            bindings: bindings.into_iter().map(|b| (b.channel, b.bin)).collect(),
            handoff: InterruptHandoff { tx },
            events,
            queue,
        }
    }

    /// Bridge using the bindings of `config`.
    pub fn from_config(config: &PedalConfig, queue: MoveQueue) -> Self {
        Self::new(config.bindings.iter().copied(), queue)
    }

    /// Handle for interrupt callbacks
    pub fn handoff(&self) -> InterruptHandoff {
        self.handoff.clone()
    }

    /// Bin bound to `channel`
    pub fn bin_for(&self, channel: u8) -> Option<u8> {
        self.bindings.get(&channel).copied()
    }

    /// Register a rising-edge interrupt with `debounce_ms` for every bound
    /// channel.
    pub fn attach<I: InterruptSource + ?Sized>(
        &self,
        io: &I,
        debounce_ms: u32,
    ) -> Result<(), HardwareError> {
        for &channel in self.bindings.keys() {
            let handoff = self.handoff();
            io.register_interrupt(
                channel,
                Edge::Rising,
                debounce_ms,
                Box::new(move || {
                    handoff.schedule(channel);
                }),
            )?;
        }
        info!(
            "Pedals attached on channels {:?} ({debounce_ms} ms debounce)",
            self.bindings.keys().collect::<Vec<_>>()
        );
        Ok(())
    }

    /// Look up `channel` and queue its bin. Runs on the scheduler.
    pub fn dispatch(&self, channel: u8) -> Option<u8> {
        let Some(bin) = self.bin_for(channel) else {
            warn!("Event on unbound channel {channel}");
            return None;
        };
        match self.queue.push(bin, CommandSource::Pedal) {
            Ok(()) => {
                info!("Pedal {channel} pressed, queued bin #{bin}");
                Some(bin)
            }
            Err(e) => {
                warn!("Dropping pedal {channel}: {e}");
                None
            }
        }
    }

    /// Dispatch every event already handed off. Returns how many were queued.
    pub fn process_pending(&mut self) -> usize {
        let mut queued = 0;
        while let Ok(channel) = self.events.try_recv() {
            if self.dispatch(channel).is_some() {
                queued += 1;
            }
        }
        queued
    }

    /// Dispatch events as they arrive. Runs for the life of the bridge.
    pub async fn run(&mut self) {
        while let Some(channel) = self.events.recv().await {
            self.dispatch(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockGpio;
    use crate::queue::move_queue;

    #[test]
    fn default_table() {
        let (queue, _rx) = move_queue();
        let bridge = HardwareEventBridge::from_config(&PedalConfig::default(), queue);
        assert_eq!(bridge.bin_for(21), Some(0));
        assert_eq!(bridge.bin_for(20), Some(1));
        assert_eq!(bridge.bin_for(16), Some(2));
        assert_eq!(bridge.bin_for(5), None);
    }

    #[test]
    fn callbacks_only_hand_off() {
        let gpio = MockGpio::new();
        let (queue, mut rx) = move_queue();
        let mut bridge = HardwareEventBridge::from_config(&PedalConfig::default(), queue);
        bridge.attach(&gpio, 1000).unwrap();
        assert_eq!(gpio.interrupt_count(), 3);

        assert!(gpio.trigger(20, Edge::Rising, 0));
        // nothing reaches the queue until the scheduler side runs
        assert_eq!(rx.try_recv(), None);

        assert_eq!(bridge.process_pending(), 1);
        assert_eq!(rx.try_recv().map(|r| (r.bin, r.source)), Some((1, CommandSource::Pedal)));
    }

    #[test]
    fn presses_inside_debounce_are_dropped() {
        let gpio = MockGpio::new();
        let (queue, mut rx) = move_queue();
        let mut bridge = HardwareEventBridge::from_config(&PedalConfig::default(), queue);
        bridge.attach(&gpio, 1000).unwrap();

        gpio.trigger(21, Edge::Rising, 0);
        gpio.trigger(21, Edge::Rising, 300);
        gpio.trigger(21, Edge::Falling, 600);
        gpio.trigger(21, Edge::Rising, 1200);
        gpio.trigger(16, Edge::Rising, 1250);

        assert_eq!(bridge.process_pending(), 3);
        let bins: Vec<u8> = std::iter::from_fn(|| rx.try_recv()).map(|r| r.bin).collect();
        assert_eq!(bins, vec![0, 0, 2]);
    }

    #[test]
    fn unbound_channel_is_ignored() {
        let (queue, mut rx) = move_queue();
        let mut bridge = HardwareEventBridge::new([PedalBinding { channel: 4, bin: 1 }], queue);
        bridge.handoff().schedule(9);
        bridge.handoff().schedule(4);
        assert_eq!(bridge.process_pending(), 1);
        assert_eq!(rx.try_recv().map(|r| r.bin), Some(1));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn handoff_from_another_thread() {
        let (queue, mut rx) = move_queue();
        let mut bridge = HardwareEventBridge::from_config(&PedalConfig::default(), queue);
        let handoff = bridge.handoff();

        std::thread::spawn(move || {
            handoff.schedule(16);
        })
        .join()
        .unwrap();

        tokio::select! {
            _ = bridge.run() => unreachable!("bridge holds its own sender"),
            request = rx.recv() => assert_eq!(request.map(|r| r.bin), Some(2)),
        }
    }
}
