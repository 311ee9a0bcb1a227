//! `fleet-core`: the chat-facing half of fleetbot.
//!
//! Workflows turn independent chat events (a slash command, then button
//! clicks from anyone, minutes apart) into one multi-step protocol. The
//! rendered message is the only state: every click reads the previous
//! message back, decides, and renders the next one.
//!
//! Nothing here knows about Discord, RCON or Kubernetes. Backends plug in
//! through the small traits in [`capability`]; the chat adapter speaks
//! [`interaction`] types and renders [`message::ActionMessage`]s.

pub mod capability;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod interaction;
pub mod message;
pub mod registry;
pub mod workflow;

pub use error::{FleetError, Result};
