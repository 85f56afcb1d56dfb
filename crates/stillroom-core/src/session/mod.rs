//! Session lifecycle: the pure state machine and the task that drives it.

mod controller;
mod machine;

pub use controller::{SessionController, SessionOptions};
pub use machine::{
    PersistenceRequest, SessionInput, SessionMachine, SessionSnapshot, SessionState, Transition,
};
