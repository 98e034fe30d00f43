//! Channel scheduler.
//!
//! Channel selection is a pure function of the hopping sequence, the slot
//! derived from the stack clock, and a schedule offset (the broadcast offset,
//! or the receiver's unicast offset).

pub mod channel;
pub mod constants;
pub mod schedule;

pub use channel::{ChannelFunction, HoppingSequence};
pub use schedule::{FhssConfig, FhssStructure, ScheduleRole};
