/// Google Cloud resource declarations and API access
pub mod cidr;
pub mod client;
pub mod cluster;
pub mod instance;
pub mod models;
pub mod network;

pub use client::{ClusterLookup, GcpClient, Lookup, OfflineLookup};
pub use cluster::{ensure_cluster, ClusterHandle};
