//! Chat session: conversation state, turn transitions and the controller
//!
//! Pure turn transitions live in `transition`; the store applies them under
//! a single lock and the controller drives them from network events.

mod assembler;
mod controller;
pub mod state;
mod store;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use assembler::{AssemblyUpdate, StreamAssembler};
pub use controller::{ChatSessionController, SendOptions, SendOutcome};
pub use state::{ConversationSnapshot, Turn, TurnPhase, TurnResolution};
pub use store::{ConversationStore, Generation, StoreError};
pub use transition::{transition, TransitionError, TurnEvent};
