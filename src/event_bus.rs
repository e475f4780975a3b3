//! Minimal publish surface for strategy-lifecycle events.
//!
//! Spec §6 lists the event bus as an external collaborator the core only
//! *publishes* to (`STOP_BOT` with a reason string). A real pub/sub
//! integration is out of scope, but `TradingStrategy` needs something to
//! call `publish` on to be testable without one. Grounded on how
//! `src/dex/mod.rs`'s `Trader` trait lets Paper/Serum/Jupiter share one
//! call surface, here it's `EventBus` doing the same for whatever sits
//! downstream of the strategy loop.

use async_trait::async_trait;
use log::info;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum BotEvent {
    StopBot { bot_id: i64, reason: String },
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: BotEvent);
}

/// In-memory bus backed by a `tokio::mpsc` channel, enough to drive
/// tests and to give a future real bus a trait to slot behind.
pub struct ChannelEventBus {
    sender: mpsc::UnboundedSender<BotEvent>,
}

impl ChannelEventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BotEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish(&self, event: BotEvent) {
        info!("publishing event: {:?}", event);
        if self.sender.send(event).is_err() {
            log::warn!("event bus receiver dropped; event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_event_is_received() {
        let (bus, mut receiver) = ChannelEventBus::new();
        bus.publish(BotEvent::StopBot {
            bot_id: 1,
            reason: "take profit".into(),
        })
        .await;
        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, BotEvent::StopBot { bot_id: 1, .. }));
    }
}
