mod quota;
mod scheduler;
mod state_machine;

pub use quota::RateBudget;
pub use scheduler::DelayQueue;
pub use state_machine::{PlaybackState, PlaybackStatus, Transition};
