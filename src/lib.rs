//! `flagrant` is a feature flagging and experimentation engine: it evaluates
//! feature flags and multi-armed bandits for a subject, locally and
//! deterministically, from a configuration that the caller supplies.
//!
//! The crate does no network I/O. Fetch (or embed) a configuration, hand it
//! to a [`Client`], and evaluate:
//!
//! ```
//! use flagrant::{Attributes, ClientOptions};
//!
//! let client = ClientOptions::new().to_client();
//! // Until a configuration is set, evaluations return the default value.
//! let enabled = client
//!     .get_boolean_assignment("my-flag", "user-1", &Attributes::new(), false)
//!     .unwrap();
//! assert!(!enabled);
//! ```
//!
//! Evaluation is deterministic: the same configuration, subject, and
//! attributes always produce the same assignment, in any process and on any
//! machine. Experiment traffic splitting is done by hashing the subject key,
//! so no coordination between servers is required.
//!
//! Assignments that need to be recorded for analysis are delivered to an
//! [`AssignmentLogger`] supplied by the user, deduplicated through an
//! [`cache::AssignmentCache`].
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod bandits;
pub mod cache;
pub mod configuration_store;
pub mod eval;
pub mod events;
pub mod flags;
pub mod sharder;

mod assignment_logger;
mod attributes;
mod client;
mod configuration;
mod context_attributes;
mod error;
mod obfuscation;

pub use assignment_logger::AssignmentLogger;
pub use attributes::{AttributeValue, Attributes};
pub use client::{AssignmentReason, AssignmentResult, Client, ClientOptions};
pub use configuration::Configuration;
pub use context_attributes::ContextAttributes;
pub use error::{BanditEvaluationError, EvaluationError, Result};
pub use flags::{Assignment, AssignmentValue};
