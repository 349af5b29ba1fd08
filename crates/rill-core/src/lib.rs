#![doc = r"Core identity, state, and delta machinery for the Rill scripting runtime."]

pub mod cursor;
pub mod delta;
pub mod element;
pub mod error;
pub mod hash;
pub mod identity;
pub mod request;
pub mod state;
pub mod value;

pub use cursor::{Coordinate, LockedCursor, RootContainer, RunningCursor};
pub use delta::{Delta, DeltaBuilder, ForwardMsg, ForwardQueue};
pub use element::Element;
pub use error::UsageError;
pub use identity::{IdentityRegistry, WidgetId};
pub use request::{RerunData, ScriptRequest, ScriptRequests};
pub use state::{ChangeCallback, SessionState, SessionStateHandle, StateKey, WidgetStates};
pub use value::Value;
