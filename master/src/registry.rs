//! Reply-handler registry: routes per-source arrivals to the rendezvous
//! bound to each message type.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::sync::{AnyUnit, EachUnit};

/// Message types a rendezvous can be bound to.
///
/// `DeltaAny` and `DeltaAll` are two views of the same physical delta
/// receipt, with `any` and `each` policies respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Online,
    Workers,
    Dataset,
    Ready,
    Parameter,
    TrainPause,
    TrainContinue,
    Closed,
    DeltaAny,
    DeltaAll,
}

enum Policy {
    Each(Arc<EachUnit>),
    Any(Arc<AnyUnit>),
}

struct Entry {
    policy: Policy,
    active: bool,
}

/// Per-message-type collectors that fire a rendezvous when enough sources
/// have reported.
#[derive(Default)]
pub struct ReplyRegistry {
    entries: RwLock<HashMap<Tag, Entry>>,
}

impl ReplyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `unit` to `tag` under the each-source policy.
    pub fn register_each(&self, tag: Tag, unit: Arc<EachUnit>) {
        self.entries.write().insert(
            tag,
            Entry {
                policy: Policy::Each(unit),
                active: true,
            },
        );
    }

    /// Binds `unit` to `tag` under the any-source policy.
    pub fn register_any(&self, tag: Tag, unit: Arc<AnyUnit>) {
        self.entries.write().insert(
            tag,
            Entry {
                policy: Policy::Any(unit),
                active: true,
            },
        );
    }

    /// Records an arrival of `tag` from logical worker `source`.
    ///
    /// Unknown and deactivated tags are dropped.
    pub fn input(&self, tag: Tag, source: usize) {
        let entries = self.entries.read();
        let Some(entry) = entries.get(&tag) else {
            return;
        };
        if !entry.active {
            return;
        }
        match &entry.policy {
            Policy::Each(unit) => unit.input(source),
            Policy::Any(unit) => unit.signal(),
        }
    }

    /// Stops routing `tag`; late arrivals are swallowed.
    pub fn deactivate(&self, tag: Tag) {
        if let Some(entry) = self.entries.write().get_mut(&tag) {
            entry.active = false;
        }
    }
}
