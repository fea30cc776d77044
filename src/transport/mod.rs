//! Transports implementing [`crate::replica::ReplicaClient`]

pub mod http;

pub use http::HttpReplicaClient;
