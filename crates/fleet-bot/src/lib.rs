//! `fleet-bot`, the `fleetbot` binary: command line, wiring of the
//! configured game backends into workflows, and the Discord adapter.

pub mod cli;
pub mod cmd;
pub mod discord;
pub mod wiring;
