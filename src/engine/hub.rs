use crate::protocol::ProgressEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Progress stream a notice belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressChannel {
    Scan,
    Wipe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressNotice {
    pub channel: ProgressChannel,
    /// Label of the Engine command that produced the event
    pub source: &'static str,
    pub event: ProgressEvent,
}

/// Fan-out of decoded progress events to any number of subscribers.
///
/// Events are delivered in decode order. Publishing with nobody listening is
/// not an error.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    sender: broadcast::Sender<ProgressNotice>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, notice: ProgressNotice) {
        let _ = self.sender.send(notice);
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription {
            receiver: Some(self.sender.subscribe()),
            filter: None,
        }
    }

    /// Subscribe to a single channel
    pub fn subscribe_to(&self, channel: ProgressChannel) -> ProgressSubscription {
        ProgressSubscription {
            receiver: Some(self.sender.subscribe()),
            filter: Some(channel),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription. Call [`unsubscribe`](Self::unsubscribe) to stop
/// receiving; dropping it has the same effect.
#[derive(Debug)]
pub struct ProgressSubscription {
    receiver: Option<broadcast::Receiver<ProgressNotice>>,
    filter: Option<ProgressChannel>,
}

impl ProgressSubscription {
    /// Next notice, or `None` once unsubscribed or the hub is gone.
    ///
    /// A slow reader that falls behind skips the oldest events rather than
    /// blocking the Engine.
    pub async fn next(&mut self) -> Option<ProgressNotice> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(notice) => {
                    if self.filter.map_or(true, |c| c == notice.channel) {
                        return Some(notice);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Non-blocking variant used by render loops.
    pub fn try_next(&mut self) -> Option<ProgressNotice> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.try_recv() {
                Ok(notice) => {
                    if self.filter.map_or(true, |c| c == notice.channel) {
                        return Some(notice);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(channel: ProgressChannel, percent: u32) -> ProgressNotice {
        ProgressNotice {
            channel,
            source: "test",
            event: ProgressEvent::new(percent, format!("step {}", percent)),
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let hub = ProgressHub::new();
        let mut sub = hub.subscribe();
        for pct in [5, 40, 30, 100] {
            hub.publish(notice(ProgressChannel::Scan, pct));
        }
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(sub.next().await.unwrap().event.percent);
        }
        assert_eq!(seen, vec![5, 40, 30, 100]);
    }

    #[tokio::test]
    async fn test_channel_filter() {
        let hub = ProgressHub::new();
        let mut wipe_only = hub.subscribe_to(ProgressChannel::Wipe);
        hub.publish(notice(ProgressChannel::Scan, 10));
        hub.publish(notice(ProgressChannel::Wipe, 20));
        let got = wipe_only.next().await.unwrap();
        assert_eq!(got.channel, ProgressChannel::Wipe);
        assert_eq!(got.event.percent, 20);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = ProgressHub::new();
        let mut sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(hub.subscriber_count(), 0);
        hub.publish(notice(ProgressChannel::Scan, 1));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_hub_ends_stream() {
        let hub = ProgressHub::new();
        let mut sub = hub.subscribe();
        drop(hub);
        assert!(sub.next().await.is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = ProgressHub::new();
        hub.publish(notice(ProgressChannel::Wipe, 50));
        let mut late = hub.subscribe();
        assert!(late.try_next().is_none());
    }
}
