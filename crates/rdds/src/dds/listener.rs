// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Listener tables and status dispatch.
//!
//! Listeners are per-entity callback tables. When a status transitions the
//! core queues an event; a per-participant dispatch thread resolves the
//! most specific registered callback by walking up the parent chain
//! (stopping at the participant) and invokes it. Because callbacks run
//! outside any entity lock, a listener may call back into the library.
//!
//! A callback resets its status trigger after the invocation unless the
//! slot was registered with `reset_on_invoke = false`.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::status::{
    InconsistentTopicStatus, LivelinessChangedStatus, LivelinessLostStatus,
    OfferedDeadlineMissedStatus, OfferedIncompatibleQosStatus, PublicationMatchedStatus,
    RequestedDeadlineMissedStatus, RequestedIncompatibleQosStatus, SampleLostStatus,
    SampleRejectedStatus, StatusId, SubscriptionMatchedStatus,
};
use super::Entity;
use crate::rt::thread::{spawn_named, ThreadAttributes};

macro_rules! callback_alias {
    ($name:ident, $status:ty) => {
        pub type $name = Arc<dyn Fn(Entity, $status) + Send + Sync>;
    };
}

callback_alias!(InconsistentTopicCb, InconsistentTopicStatus);
callback_alias!(OfferedDeadlineMissedCb, OfferedDeadlineMissedStatus);
callback_alias!(RequestedDeadlineMissedCb, RequestedDeadlineMissedStatus);
callback_alias!(OfferedIncompatibleQosCb, OfferedIncompatibleQosStatus);
callback_alias!(RequestedIncompatibleQosCb, RequestedIncompatibleQosStatus);
callback_alias!(SampleLostCb, SampleLostStatus);
callback_alias!(SampleRejectedCb, SampleRejectedStatus);
callback_alias!(LivelinessLostCb, LivelinessLostStatus);
callback_alias!(LivelinessChangedCb, LivelinessChangedStatus);
callback_alias!(PublicationMatchedCb, PublicationMatchedStatus);
callback_alias!(SubscriptionMatchedCb, SubscriptionMatchedStatus);

/// Data-available / data-on-readers carry no status structure.
pub type DataCb = Arc<dyn Fn(Entity) + Send + Sync>;

/// Per-entity callback table. A `None` slot defers to the parent's table.
#[derive(Clone, Default)]
pub struct Listener {
    pub(crate) inconsistent_topic: Option<InconsistentTopicCb>,
    pub(crate) offered_deadline_missed: Option<OfferedDeadlineMissedCb>,
    pub(crate) requested_deadline_missed: Option<RequestedDeadlineMissedCb>,
    pub(crate) offered_incompatible_qos: Option<OfferedIncompatibleQosCb>,
    pub(crate) requested_incompatible_qos: Option<RequestedIncompatibleQosCb>,
    pub(crate) sample_lost: Option<SampleLostCb>,
    pub(crate) sample_rejected: Option<SampleRejectedCb>,
    pub(crate) data_on_readers: Option<DataCb>,
    pub(crate) data_available: Option<DataCb>,
    pub(crate) liveliness_lost: Option<LivelinessLostCb>,
    pub(crate) liveliness_changed: Option<LivelinessChangedCb>,
    pub(crate) publication_matched: Option<PublicationMatchedCb>,
    pub(crate) subscription_matched: Option<SubscriptionMatchedCb>,
    /// Per-status bit: clear the status trigger after invoking. Defaults to
    /// every bit set.
    pub(crate) reset_on_invoke: u32,
}

macro_rules! listener_setter {
    ($fn_name:ident, $slot:ident, $cb:ty) => {
        #[must_use]
        pub fn $fn_name(mut self, cb: impl Fn(Entity, $cb) + Send + Sync + 'static) -> Self {
            self.$slot = Some(Arc::new(cb));
            self
        }
    };
}

impl Listener {
    #[must_use]
    pub fn new() -> Self {
        Listener {
            reset_on_invoke: super::status::ANY_STATUS,
            ..Default::default()
        }
    }

    listener_setter!(on_inconsistent_topic, inconsistent_topic, InconsistentTopicStatus);
    listener_setter!(
        on_offered_deadline_missed,
        offered_deadline_missed,
        OfferedDeadlineMissedStatus
    );
    listener_setter!(
        on_requested_deadline_missed,
        requested_deadline_missed,
        RequestedDeadlineMissedStatus
    );
    listener_setter!(
        on_offered_incompatible_qos,
        offered_incompatible_qos,
        OfferedIncompatibleQosStatus
    );
    listener_setter!(
        on_requested_incompatible_qos,
        requested_incompatible_qos,
        RequestedIncompatibleQosStatus
    );
    listener_setter!(on_sample_lost, sample_lost, SampleLostStatus);
    listener_setter!(on_sample_rejected, sample_rejected, SampleRejectedStatus);
    listener_setter!(on_liveliness_lost, liveliness_lost, LivelinessLostStatus);
    listener_setter!(on_liveliness_changed, liveliness_changed, LivelinessChangedStatus);
    listener_setter!(on_publication_matched, publication_matched, PublicationMatchedStatus);
    listener_setter!(on_subscription_matched, subscription_matched, SubscriptionMatchedStatus);

    #[must_use]
    pub fn on_data_available(mut self, cb: impl Fn(Entity) + Send + Sync + 'static) -> Self {
        self.data_available = Some(Arc::new(cb));
        self
    }

    #[must_use]
    pub fn on_data_on_readers(mut self, cb: impl Fn(Entity) + Send + Sync + 'static) -> Self {
        self.data_on_readers = Some(Arc::new(cb));
        self
    }

    /// Keep the status trigger set after invoking the callback for the
    /// statuses in `mask`.
    #[must_use]
    pub fn retain_status_on_invoke(mut self, mask: u32) -> Self {
        self.reset_on_invoke &= !mask;
        self
    }

    /// Whether this table has a callback slot filled for `id`.
    #[must_use]
    pub(crate) fn has_slot(&self, id: StatusId) -> bool {
        match id {
            StatusId::InconsistentTopic => self.inconsistent_topic.is_some(),
            StatusId::OfferedDeadlineMissed => self.offered_deadline_missed.is_some(),
            StatusId::RequestedDeadlineMissed => self.requested_deadline_missed.is_some(),
            StatusId::OfferedIncompatibleQos => self.offered_incompatible_qos.is_some(),
            StatusId::RequestedIncompatibleQos => self.requested_incompatible_qos.is_some(),
            StatusId::SampleLost => self.sample_lost.is_some(),
            StatusId::SampleRejected => self.sample_rejected.is_some(),
            StatusId::DataOnReaders => self.data_on_readers.is_some(),
            StatusId::DataAvailable => self.data_available.is_some(),
            StatusId::LivelinessLost => self.liveliness_lost.is_some(),
            StatusId::LivelinessChanged => self.liveliness_changed.is_some(),
            StatusId::PublicationMatched => self.publication_matched.is_some(),
            StatusId::SubscriptionMatched => self.subscription_matched.is_some(),
        }
    }
}

/// One queued status transition, carrying the status value snapshotted at
/// raise time.
#[derive(Clone)]
pub(crate) enum StatusEvent {
    InconsistentTopic(Entity, InconsistentTopicStatus),
    OfferedDeadlineMissed(Entity, OfferedDeadlineMissedStatus),
    RequestedDeadlineMissed(Entity, RequestedDeadlineMissedStatus),
    OfferedIncompatibleQos(Entity, OfferedIncompatibleQosStatus),
    RequestedIncompatibleQos(Entity, RequestedIncompatibleQosStatus),
    SampleLost(Entity, SampleLostStatus),
    SampleRejected(Entity, SampleRejectedStatus),
    DataOnReaders(Entity),
    DataAvailable(Entity),
    LivelinessLost(Entity, LivelinessLostStatus),
    LivelinessChanged(Entity, LivelinessChangedStatus),
    PublicationMatched(Entity, PublicationMatchedStatus),
    SubscriptionMatched(Entity, SubscriptionMatchedStatus),
}

impl StatusEvent {
    pub(crate) fn entity(&self) -> Entity {
        match *self {
            StatusEvent::InconsistentTopic(e, _)
            | StatusEvent::OfferedDeadlineMissed(e, _)
            | StatusEvent::RequestedDeadlineMissed(e, _)
            | StatusEvent::OfferedIncompatibleQos(e, _)
            | StatusEvent::RequestedIncompatibleQos(e, _)
            | StatusEvent::SampleLost(e, _)
            | StatusEvent::SampleRejected(e, _)
            | StatusEvent::DataOnReaders(e)
            | StatusEvent::DataAvailable(e)
            | StatusEvent::LivelinessLost(e, _)
            | StatusEvent::LivelinessChanged(e, _)
            | StatusEvent::PublicationMatched(e, _)
            | StatusEvent::SubscriptionMatched(e, _) => e,
        }
    }

    pub(crate) fn status_id(&self) -> StatusId {
        match self {
            StatusEvent::InconsistentTopic(..) => StatusId::InconsistentTopic,
            StatusEvent::OfferedDeadlineMissed(..) => StatusId::OfferedDeadlineMissed,
            StatusEvent::RequestedDeadlineMissed(..) => StatusId::RequestedDeadlineMissed,
            StatusEvent::OfferedIncompatibleQos(..) => StatusId::OfferedIncompatibleQos,
            StatusEvent::RequestedIncompatibleQos(..) => StatusId::RequestedIncompatibleQos,
            StatusEvent::SampleLost(..) => StatusId::SampleLost,
            StatusEvent::SampleRejected(..) => StatusId::SampleRejected,
            StatusEvent::DataOnReaders(..) => StatusId::DataOnReaders,
            StatusEvent::DataAvailable(..) => StatusId::DataAvailable,
            StatusEvent::LivelinessLost(..) => StatusId::LivelinessLost,
            StatusEvent::LivelinessChanged(..) => StatusId::LivelinessChanged,
            StatusEvent::PublicationMatched(..) => StatusId::PublicationMatched,
            StatusEvent::SubscriptionMatched(..) => StatusId::SubscriptionMatched,
        }
    }

    /// Invoke the matching slot of `listener` for `observed` (the entity the
    /// most specific table was found on may be an ancestor).
    pub(crate) fn invoke(&self, listener: &Listener) {
        match self {
            StatusEvent::InconsistentTopic(e, s) => {
                if let Some(cb) = &listener.inconsistent_topic {
                    cb(*e, *s);
                }
            }
            StatusEvent::OfferedDeadlineMissed(e, s) => {
                if let Some(cb) = &listener.offered_deadline_missed {
                    cb(*e, *s);
                }
            }
            StatusEvent::RequestedDeadlineMissed(e, s) => {
                if let Some(cb) = &listener.requested_deadline_missed {
                    cb(*e, *s);
                }
            }
            StatusEvent::OfferedIncompatibleQos(e, s) => {
                if let Some(cb) = &listener.offered_incompatible_qos {
                    cb(*e, *s);
                }
            }
            StatusEvent::RequestedIncompatibleQos(e, s) => {
                if let Some(cb) = &listener.requested_incompatible_qos {
                    cb(*e, *s);
                }
            }
            StatusEvent::SampleLost(e, s) => {
                if let Some(cb) = &listener.sample_lost {
                    cb(*e, *s);
                }
            }
            StatusEvent::SampleRejected(e, s) => {
                if let Some(cb) = &listener.sample_rejected {
                    cb(*e, *s);
                }
            }
            StatusEvent::DataOnReaders(e) => {
                if let Some(cb) = &listener.data_on_readers {
                    cb(*e);
                }
            }
            StatusEvent::DataAvailable(e) => {
                if let Some(cb) = &listener.data_available {
                    cb(*e);
                }
            }
            StatusEvent::LivelinessLost(e, s) => {
                if let Some(cb) = &listener.liveliness_lost {
                    cb(*e, *s);
                }
            }
            StatusEvent::LivelinessChanged(e, s) => {
                if let Some(cb) = &listener.liveliness_changed {
                    cb(*e, *s);
                }
            }
            StatusEvent::PublicationMatched(e, s) => {
                if let Some(cb) = &listener.publication_matched {
                    cb(*e, *s);
                }
            }
            StatusEvent::SubscriptionMatched(e, s) => {
                if let Some(cb) = &listener.subscription_matched {
                    cb(*e, *s);
                }
            }
        }
    }
}

/// Per-participant dispatch thread. Events queue through a channel and run
/// on the thread, so status raisers never hold locks across callbacks.
pub(crate) struct ListenerDispatcher {
    tx: parking_lot::Mutex<Option<Sender<StatusEvent>>>,
    handle: parking_lot::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl ListenerDispatcher {
    pub(crate) fn start(participant: Entity) -> ListenerDispatcher {
        let (tx, rx): (Sender<StatusEvent>, Receiver<StatusEvent>) = unbounded();
        let name = format!("listener_dispatch_{}", participant);
        let handle = spawn_named(&name, &ThreadAttributes::default(), move || {
            while let Ok(event) = rx.recv() {
                super::entity::dispatch_listener_event(&event);
            }
        })
        .ok();
        ListenerDispatcher {
            tx: parking_lot::Mutex::new(Some(tx)),
            handle: parking_lot::Mutex::new(handle),
        }
    }

    pub(crate) fn post(&self, event: StatusEvent) {
        // A missing sender means the dispatcher is shutting down; the event
        // is dropped, matching a listener table that was already cleared.
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Close the queue and join the thread. Called from participant delete.
    pub(crate) fn shutdown(&self) {
        // Dropping the sender ends the receive loop after the queue drains.
        self.tx.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
