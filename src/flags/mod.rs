//! Flag configuration model and targeting rules.
mod assignment;
mod models;
mod rules;

pub use assignment::{Assignment, AssignmentValue};
pub use models::*;
