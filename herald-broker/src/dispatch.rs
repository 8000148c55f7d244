//! Subscriber registration and event fan-out.
//!
//! Each subscriber owns an independent delivery task fed by a bounded queue.
//! Fan-out only enqueues, so a slow subscriber never stalls the mutation
//! path or its peers; a subscriber that stops draining its queue is torn
//! down instead of buffering without bound.

use crate::error::BrokerError;
use crate::events::SubscriberEvent;
use crate::limits::{MAX_SUBSCRIBERS, SUBSCRIBER_QUEUE_DEPTH};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one subscriber across subscribe, delivery, and unsubscribe.
pub type SubscriberHandle = Uuid;

/// The subscriber endpoint went away; delivery to it can stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Subscriber endpoint is gone.")]
pub struct SubscriberGone;

/// A consumer of broker events. Implementations front a transport session;
/// `on_event` is the single delivery entry point for every event kind.
#[async_trait]
pub trait NotificationSubscriber: Send + Sync {
    fn id(&self) -> SubscriberHandle;
    async fn on_event(&self, event: SubscriberEvent) -> Result<(), SubscriberGone>;
}

/// What a subscriber wants to see. An empty filter means everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriberFilter {
    /// Restricts to events of these bundles. `None` means all bundles.
    pub bundle_names: Option<HashSet<String>>,
    /// Restricts to events of one user. `None` means all users.
    pub user_id: Option<i32>,
}

impl SubscriberFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_bundles<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bundle_names: Some(names.into_iter().map(Into::into).collect()),
            user_id: None,
        }
    }

    pub fn for_user(user_id: i32) -> Self {
        Self {
            bundle_names: None,
            user_id: Some(user_id),
        }
    }

    /// Whether `event` passes this filter. Events without a bundle or user
    /// scope pass the corresponding restriction.
    pub fn matches(&self, event: &SubscriberEvent) -> bool {
        if let (Some(wanted), Some(actual)) = (self.user_id, event.user_id()) {
            if wanted != actual {
                return false;
            }
        }
        match (&self.bundle_names, event.bundle_name()) {
            (Some(names), Some(actual)) => names.contains(actual),
            _ => true,
        }
    }
}

struct SubscriberSeat {
    subscriber: Arc<dyn NotificationSubscriber>,
    filter: SubscriberFilter,
    sender: mpsc::Sender<SubscriberEvent>,
    task: JoinHandle<()>,
}

/// Owns the subscriber table and all delivery tasks.
#[derive(Default)]
pub struct SubscriberDispatcher {
    seats: RwLock<HashMap<SubscriberHandle, SubscriberSeat>>,
}

impl SubscriberDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and acknowledges with `Subscribed` before the
    /// call returns.
    ///
    /// Subscribing again with an equal filter is a no-op success and is not
    /// re-acknowledged; a different filter for a live handle is rejected.
    pub async fn subscribe(
        &self,
        subscriber: Arc<dyn NotificationSubscriber>,
        filter: SubscriberFilter,
    ) -> Result<(), BrokerError> {
        let handle = subscriber.id();
        {
            let seats = self.seats.read().unwrap_or_else(|e| e.into_inner());
            if let Some(seat) = seats.get(&handle) {
                if seat.filter == filter {
                    debug!(subscriber = %handle, "Duplicate subscribe ignored.");
                    return Ok(());
                }
                return Err(BrokerError::InvalidParam(format!(
                    "Subscriber '{}' is already registered with a different filter.",
                    handle
                )));
            }
            if seats.len() >= MAX_SUBSCRIBERS {
                return Err(BrokerError::SubscriberTableFull {
                    limit: MAX_SUBSCRIBERS,
                });
            }
        }

        // The ack is part of the subscribe call itself; an endpoint that
        // cannot take it never gets a seat.
        if subscriber
            .on_event(SubscriberEvent::Subscribed)
            .await
            .is_err()
        {
            return Err(BrokerError::InvalidParam(format!(
                "Subscriber '{}' did not accept the subscribe acknowledgement.",
                handle
            )));
        }

        let (sender, mut receiver) = mpsc::channel::<SubscriberEvent>(SUBSCRIBER_QUEUE_DEPTH);
        let endpoint = Arc::clone(&subscriber);
        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if endpoint.on_event(event).await.is_err() {
                    debug!(subscriber = %endpoint.id(), "Subscriber endpoint gone, delivery task ends.");
                    break;
                }
            }
        });

        let mut seats = self.seats.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = seats.get(&handle) {
            // Lost a race against another subscribe for the same handle.
            task.abort();
            if existing.filter == filter {
                return Ok(());
            }
            return Err(BrokerError::InvalidParam(format!(
                "Subscriber '{}' is already registered with a different filter.",
                handle
            )));
        }
        if seats.len() >= MAX_SUBSCRIBERS {
            task.abort();
            return Err(BrokerError::SubscriberTableFull {
                limit: MAX_SUBSCRIBERS,
            });
        }
        seats.insert(
            handle,
            SubscriberSeat {
                subscriber,
                filter,
                sender,
                task,
            },
        );
        info!(subscriber = %handle, total = seats.len(), "Subscriber registered.");
        Ok(())
    }

    /// Removes a subscriber, dropping whatever was still queued for it, and
    /// acknowledges with `Unsubscribed`.
    pub async fn unsubscribe(&self, handle: SubscriberHandle) -> Result<(), BrokerError> {
        let seat = {
            let mut seats = self.seats.write().unwrap_or_else(|e| e.into_inner());
            seats.remove(&handle).ok_or(BrokerError::NotSubscribed)?
        };
        seat.task.abort();
        if seat
            .subscriber
            .on_event(SubscriberEvent::Unsubscribed)
            .await
            .is_err()
        {
            debug!(subscriber = %handle, "Unsubscribe acknowledgement not taken.");
        }
        info!(subscriber = %handle, "Subscriber removed.");
        Ok(())
    }

    /// Enqueues `events`, in order, for every subscriber whose filter
    /// matches.
    ///
    /// A closed or saturated queue removes the subscriber on the spot: dead
    /// endpoints are detected on the next delivery attempt rather than by a
    /// background sweep.
    pub fn fanout(&self, events: &[SubscriberEvent]) {
        let mut seats = self.seats.write().unwrap_or_else(|e| e.into_inner());
        let mut dropped: Vec<SubscriberHandle> = Vec::new();
        for event in events {
            for (handle, seat) in seats.iter() {
                if dropped.contains(handle) || !seat.filter.matches(event) {
                    continue;
                }
                match seat.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(subscriber = %handle, "Delivery queue closed, dropping subscriber.");
                        dropped.push(*handle);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            subscriber = %handle,
                            depth = SUBSCRIBER_QUEUE_DEPTH,
                            "Delivery backlog exceeded, dropping subscriber."
                        );
                        dropped.push(*handle);
                    }
                }
            }
        }
        for handle in dropped {
            if let Some(seat) = seats.remove(&handle) {
                seat.task.abort();
                info!(subscriber = %handle, "Subscriber torn down after failed delivery.");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.seats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Lets every delivery queue drain, then waits for the tasks to finish.
    pub async fn shutdown(&self) {
        let seats = {
            let mut seats = self.seats.write().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *seats)
        };
        let tasks: Vec<JoinHandle<()>> = seats
            .into_values()
            .map(|seat| {
                drop(seat.sender);
                seat.task
            })
            .collect();
        for outcome in futures::future::join_all(tasks).await {
            if let Err(e) = outcome {
                if !e.is_cancelled() {
                    warn!(error = %e, "Delivery task ended abnormally during shutdown.");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorting::SortingSnapshot;
    use crate::types::{
        ActiveNotification, DeleteReason, Importance, NotificationOrigin, NotificationRequest,
        RemindType,
    };
    use chrono::Utc;
    use herald_core::types::BundleIdentity;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct RecordingSubscriber {
        handle: SubscriberHandle,
        events: Mutex<Vec<SubscriberEvent>>,
        reachable: std::sync::atomic::AtomicBool,
    }

    impl RecordingSubscriber {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                handle: Uuid::new_v4(),
                events: Mutex::new(Vec::new()),
                reachable: std::sync::atomic::AtomicBool::new(true),
            })
        }

        fn recorded(&self) -> Vec<SubscriberEvent> {
            self.events.lock().unwrap().clone()
        }

        fn go_dark(&self) {
            self.reachable
                .store(false, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl NotificationSubscriber for RecordingSubscriber {
        fn id(&self) -> SubscriberHandle {
            self.handle
        }

        async fn on_event(&self, event: SubscriberEvent) -> Result<(), SubscriberGone> {
            if !self.reachable.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(SubscriberGone);
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    /// Blocks in `on_event` until released, without recording anything.
    struct StuckSubscriber {
        handle: SubscriberHandle,
        release: Notify,
    }

    #[async_trait]
    impl NotificationSubscriber for StuckSubscriber {
        fn id(&self) -> SubscriberHandle {
            self.handle
        }

        async fn on_event(&self, event: SubscriberEvent) -> Result<(), SubscriberGone> {
            if !matches!(event, SubscriberEvent::Subscribed) {
                self.release.notified().await;
            }
            Ok(())
        }
    }

    fn notification(bundle_name: &str, user_id: i32, id: i32) -> ActiveNotification {
        let bundle = BundleIdentity::new(bundle_name, 20010001, user_id).unwrap();
        let request = NotificationRequest {
            bundle,
            id,
            label: String::new(),
            slot_type: Default::default(),
            content: Default::default(),
            flags: Default::default(),
            badge_number: None,
            sort_key: None,
            delivery_time: None,
        };
        ActiveNotification::new(
            request,
            NotificationOrigin::Local,
            RemindType::None,
            Importance::Normal,
            Utc::now(),
        )
    }

    fn consumed(bundle_name: &str, id: i32) -> SubscriberEvent {
        SubscriberEvent::Consumed {
            notification: notification(bundle_name, 100, id),
        }
    }

    async fn wait_for(subscriber: &RecordingSubscriber, count: usize) {
        for _ in 0..200 {
            if subscriber.recorded().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!(
            "Subscriber never reached {} events, got {:?}",
            count,
            subscriber.recorded()
        );
    }

    #[tokio::test]
    async fn subscribe_acks_before_returning() {
        let dispatcher = SubscriberDispatcher::new();
        let sub = RecordingSubscriber::new();
        dispatcher
            .subscribe(sub.clone(), SubscriberFilter::all())
            .await
            .unwrap();
        assert_eq!(sub.recorded(), vec![SubscriberEvent::Subscribed]);
        assert_eq!(dispatcher.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_subscribe_with_equal_filter_is_silent() {
        let dispatcher = SubscriberDispatcher::new();
        let sub = RecordingSubscriber::new();
        let filter = SubscriberFilter::for_bundles(["com.example.mail"]);
        dispatcher.subscribe(sub.clone(), filter.clone()).await.unwrap();
        dispatcher.subscribe(sub.clone(), filter).await.unwrap();
        // One ack, not two.
        assert_eq!(sub.recorded(), vec![SubscriberEvent::Subscribed]);
        assert_eq!(dispatcher.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_subscribe_with_different_filter_is_rejected() {
        let dispatcher = SubscriberDispatcher::new();
        let sub = RecordingSubscriber::new();
        dispatcher
            .subscribe(sub.clone(), SubscriberFilter::all())
            .await
            .unwrap();
        let err = dispatcher
            .subscribe(sub.clone(), SubscriberFilter::for_user(7))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidParam(_)));
    }

    #[tokio::test]
    async fn subscriber_table_is_bounded() {
        let dispatcher = SubscriberDispatcher::new();
        for _ in 0..MAX_SUBSCRIBERS {
            dispatcher
                .subscribe(RecordingSubscriber::new(), SubscriberFilter::all())
                .await
                .unwrap();
        }
        let err = dispatcher
            .subscribe(RecordingSubscriber::new(), SubscriberFilter::all())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::SubscriberTableFull { limit } if limit == MAX_SUBSCRIBERS
        ));
    }

    #[tokio::test]
    async fn unsubscribe_unknown_handle_fails() {
        let dispatcher = SubscriberDispatcher::new();
        let err = dispatcher.unsubscribe(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotSubscribed));
    }

    #[tokio::test]
    async fn unsubscribe_acks_and_frees_the_seat() {
        let dispatcher = SubscriberDispatcher::new();
        let sub = RecordingSubscriber::new();
        dispatcher
            .subscribe(sub.clone(), SubscriberFilter::all())
            .await
            .unwrap();
        dispatcher.unsubscribe(sub.id()).await.unwrap();
        assert_eq!(
            sub.recorded(),
            vec![SubscriberEvent::Subscribed, SubscriberEvent::Unsubscribed]
        );
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn events_arrive_in_fanout_order() {
        let dispatcher = SubscriberDispatcher::new();
        let sub = RecordingSubscriber::new();
        dispatcher
            .subscribe(sub.clone(), SubscriberFilter::all())
            .await
            .unwrap();

        let first = consumed("com.example.mail", 1);
        let second = SubscriberEvent::ConsumedWithSorting {
            notification: notification("com.example.mail", 100, 1),
            snapshot: SortingSnapshot {
                version: 1,
                user_id: 100,
                entries: Vec::new(),
            },
        };
        let third = SubscriberEvent::Canceled {
            notification: notification("com.example.mail", 100, 1),
        };
        let fourth = SubscriberEvent::CanceledWithSorting {
            notification: notification("com.example.mail", 100, 1),
            snapshot: SortingSnapshot {
                version: 2,
                user_id: 100,
                entries: Vec::new(),
            },
            reason: DeleteReason::AppCanceled,
        };
        dispatcher.fanout(&[first.clone(), second.clone()]);
        dispatcher.fanout(&[third.clone(), fourth.clone()]);
        wait_for(&sub, 5).await;
        assert_eq!(
            sub.recorded(),
            vec![SubscriberEvent::Subscribed, first, second, third, fourth]
        );
    }

    #[tokio::test]
    async fn bundle_filter_limits_delivery() {
        let dispatcher = SubscriberDispatcher::new();
        let filtered = RecordingSubscriber::new();
        let unfiltered = RecordingSubscriber::new();
        dispatcher
            .subscribe(filtered.clone(), SubscriberFilter::for_bundles(["com.example.mail"]))
            .await
            .unwrap();
        dispatcher
            .subscribe(unfiltered.clone(), SubscriberFilter::all())
            .await
            .unwrap();

        dispatcher.fanout(&[consumed("com.example.mail", 1), consumed("com.example.chat", 2)]);
        wait_for(&unfiltered, 3).await;
        wait_for(&filtered, 2).await;
        assert_eq!(filtered.recorded().len(), 2);
        assert_eq!(filtered.recorded()[1].bundle_name(), Some("com.example.mail"));
    }

    #[tokio::test]
    async fn user_filter_limits_delivery() {
        let dispatcher = SubscriberDispatcher::new();
        let sub = RecordingSubscriber::new();
        dispatcher
            .subscribe(sub.clone(), SubscriberFilter::for_user(100))
            .await
            .unwrap();

        dispatcher.fanout(&[
            SubscriberEvent::Consumed {
                notification: notification("com.example.mail", 100, 1),
            },
            SubscriberEvent::Consumed {
                notification: notification("com.example.mail", 101, 2),
            },
        ]);
        wait_for(&sub, 2).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sub.recorded().len(), 2);
        assert_eq!(sub.recorded()[1].user_id(), Some(100));
    }

    #[tokio::test]
    async fn dead_subscriber_is_removed_on_next_delivery() {
        let dispatcher = SubscriberDispatcher::new();
        let sub = RecordingSubscriber::new();
        dispatcher
            .subscribe(sub.clone(), SubscriberFilter::all())
            .await
            .unwrap();

        sub.go_dark();
        dispatcher.fanout(&[consumed("com.example.mail", 1)]);
        // The delivery task notices the dead endpoint and closes the queue.
        for _ in 0..200 {
            dispatcher.fanout(&[consumed("com.example.mail", 2)]);
            if dispatcher.subscriber_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn saturated_backlog_tears_the_subscriber_down() {
        let dispatcher = SubscriberDispatcher::new();
        let stuck = Arc::new(StuckSubscriber {
            handle: Uuid::new_v4(),
            release: Notify::new(),
        });
        dispatcher
            .subscribe(stuck.clone(), SubscriberFilter::all())
            .await
            .unwrap();

        // One event sits inside on_event, the queue fills behind it, and the
        // overflowing event triggers the teardown.
        let burst: Vec<SubscriberEvent> = (0..(SUBSCRIBER_QUEUE_DEPTH as i32 + 2))
            .map(|i| consumed("com.example.mail", i))
            .collect();
        for _ in 0..200 {
            dispatcher.fanout(&burst);
            if dispatcher.subscriber_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(dispatcher.subscriber_count(), 0);
        stuck.release.notify_waiters();
    }
}
