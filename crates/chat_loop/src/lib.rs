//! chat_loop - the streaming turn loop.
//!
//! One turn: render the chosen branch, open a completion stream, fold the
//! increments into the accumulated text while publishing live events, then
//! commit the result to the conversation as a new assistant message.

mod accumulator;
mod describe;
mod error;
mod events;
mod runner;

pub use accumulator::{accumulate_stream, collect_text, StreamOutcome};
pub use describe::describe;
pub use error::TurnError;
pub use events::TurnEvent;
pub use runner::run_turn;
