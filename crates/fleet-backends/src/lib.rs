//! `fleet-backends`: capability implementations behind fleetbot's
//! workflows: Minecraft over RCON, Valheim over A2S and Kubernetes for
//! restarts and scaling.

pub mod a2s;
pub mod cluster;
pub mod minecraft;

pub use a2s::{A2sQuery, QueryError};
pub use cluster::{ClusterApi, KubeCluster};
pub use minecraft::{parse_player_list, MinecraftServer, ProtocolParseError};
