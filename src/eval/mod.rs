//! Pure evaluation functions. Everything here is deterministic: given the
//! same configuration and inputs, the same result is produced.
mod eval_assignment;
mod eval_bandits;

pub use eval_assignment::get_assignment;
pub use eval_bandits::{get_bandit_action, BanditResult};

pub(crate) use eval_assignment::eval_assignment;
pub(crate) use eval_bandits::eval_bandit_action;
