#![forbid(unsafe_code)]

pub mod logs;
pub mod runner;

pub use runner::{Slot, TaskRunner, Ticket};
