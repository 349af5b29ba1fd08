use std::sync::{Arc, Mutex};

use hashbrown::HashMap;

use crate::cursor::{Coordinate, LockedCursor, RunningCursor};
use crate::element::Element;
use crate::error::UsageError;
use crate::value::Value;

/// One incremental UI mutation, addressed by tree coordinate.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta {
    NewElement {
        coordinate: Coordinate,
        element: Element,
    },
    NewBlock {
        coordinate: Coordinate,
    },
    AddRows {
        coordinate: Coordinate,
        rows: Vec<Vec<Value>>,
    },
}

impl Delta {
    pub fn coordinate(&self) -> &Coordinate {
        match self {
            Delta::NewElement { coordinate, .. }
            | Delta::NewBlock { coordinate }
            | Delta::AddRows { coordinate, .. } => coordinate,
        }
    }
}

/// Outbound message to the renderer.
#[derive(Clone, Debug, PartialEq)]
pub enum ForwardMsg {
    Delta(Delta),
    PageNotFound { page_name: String },
}

/// Thread-safe, strictly ordered queue of outbound messages.
///
/// The worker thread is the sole appender during execution; lifecycle
/// messages may be appended from other threads once the run has reached a
/// terminal state.
#[derive(Clone, Default)]
pub struct ForwardQueue {
    inner: Arc<Mutex<Vec<ForwardMsg>>>,
}

impl ForwardQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, msg: ForwardMsg) {
        self.inner.lock().unwrap().push(msg);
    }

    /// Removes and returns every queued message, in enqueue order.
    pub fn drain(&self) -> Vec<ForwardMsg> {
        self.inner.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

/// Builds delta messages and tracks which coordinates hold append-capable
/// elements for the current run.
pub struct DeltaBuilder {
    queue: ForwardQueue,
    created: HashMap<Coordinate, bool>,
}

impl DeltaBuilder {
    pub fn new(queue: ForwardQueue) -> Self {
        Self {
            queue,
            created: HashMap::new(),
        }
    }

    /// Emits a new leaf element at the branch cursor's current slot and
    /// returns a locked cursor bound to that coordinate.
    pub fn new_element(&mut self, cursor: &mut RunningCursor, element: Element) -> LockedCursor {
        let coordinate = cursor.take_coordinate();
        self.created
            .insert(coordinate.clone(), element.accepts_rows());
        self.queue.enqueue(ForwardMsg::Delta(Delta::NewElement {
            coordinate: coordinate.clone(),
            element,
        }));
        LockedCursor::at(coordinate)
    }

    /// Emits a new nested block at the branch cursor's current slot and
    /// returns a running cursor for the block's children.
    pub fn enter_block(&mut self, cursor: &mut RunningCursor) -> RunningCursor {
        let coordinate = cursor.take_coordinate();
        self.created.insert(coordinate.clone(), false);
        self.queue.enqueue(ForwardMsg::Delta(Delta::NewBlock {
            coordinate: coordinate.clone(),
        }));
        RunningCursor::child_of(&coordinate)
    }

    /// Appends rows to the element previously created at `target`.
    pub fn add_rows(
        &mut self,
        target: &LockedCursor,
        rows: Vec<Vec<Value>>,
    ) -> Result<(), UsageError> {
        match self.created.get(target.coordinate()) {
            Some(true) => {
                self.queue.enqueue(ForwardMsg::Delta(Delta::AddRows {
                    coordinate: target.coordinate().clone(),
                    rows,
                }));
                Ok(())
            }
            _ => Err(UsageError::BadAppendTarget {
                coordinate: target.coordinate().to_string(),
            }),
        }
    }

    pub fn queue(&self) -> &ForwardQueue {
        &self.queue
    }
}
