use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use cs_model::{Dimension, UpdateStats};

/// Published dimensions by name.
pub type Dimensions = HashMap<String, Dimension>;

/// Where the update state machine currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdatePhase {
    Idle = 0,
    Requested = 1,
    Fetching = 2,
    Parsing = 3,
    Merging = 4,
    Publishing = 5,
}

impl UpdatePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Requested,
            2 => Self::Fetching,
            3 => Self::Parsing,
            4 => Self::Merging,
            5 => Self::Publishing,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Requested => "requested",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Merging => "merging",
            Self::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// State shared between the pipeline tasks and readers.
///
/// The published dimensions and the raw snapshot bytes sit behind separate
/// locks so whole-repository dumps never contend with structural reads.
pub(crate) struct Shared {
    published: RwLock<Arc<Dimensions>>,
    raw: RwLock<Bytes>,
    loaded: AtomicBool,
    phase: AtomicU8,
    missed_node_lookups: AtomicU64,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            published: RwLock::new(Arc::new(Dimensions::new())),
            raw: RwLock::new(Bytes::new()),
            loaded: AtomicBool::new(false),
            phase: AtomicU8::new(UpdatePhase::Idle as u8),
            missed_node_lookups: AtomicU64::new(0),
        }
    }

    /// Current published dimensions. The read lock is held only for the
    /// pointer clone.
    pub(crate) fn dimensions(&self) -> Arc<Dimensions> {
        self.published.read().expect("published lock poisoned").clone()
    }

    pub(crate) fn raw(&self) -> Bytes {
        self.raw.read().expect("raw lock poisoned").clone()
    }

    /// Replace the published dimensions and raw snapshot.
    pub(crate) fn publish(&self, dimensions: Dimensions, raw: Bytes) {
        let next = Arc::new(dimensions);
        let previous = {
            let mut published = self.published.write().expect("published lock poisoned");
            std::mem::replace(&mut *published, next)
        };
        // The old tree is freed outside the lock once readers let go.
        drop(previous);
        *self.raw.write().expect("raw lock poisoned") = raw;
        self.loaded.store(true, Ordering::Release);
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn phase(&self) -> UpdatePhase {
        UpdatePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: UpdatePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub(crate) fn record_missed_nodes(&self, count: usize) {
        if count > 0 {
            self.missed_node_lookups
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn missed_node_lookups(&self) -> u64 {
        self.missed_node_lookups.load(Ordering::Relaxed)
    }

    pub(crate) fn stats(&self) -> UpdateStats {
        stats_for(&self.dimensions())
    }
}

pub(crate) fn stats_for(dimensions: &Dimensions) -> UpdateStats {
    UpdateStats {
        number_of_nodes: dimensions.values().map(Dimension::len).sum(),
        number_of_uris: dimensions.values().map(Dimension::uri_count).sum(),
        ..Default::default()
    }
}
