//! RegistryCache Module
//!
//! Site device registry fetched from the directory API and cached on disk.
//!
//! ## Module layout
//! - `types`: directory wire types, RegistrySnapshot
//! - `directory_client`: DirectorySource trait + HTTP implementation
//! - `repository`: `device_details.json` persistence
//! - `service`: TTL cache

pub mod directory_client;
pub mod repository;
pub mod service;
pub mod types;

pub use directory_client::{DirectorySource, HttpDirectoryClient};
pub use repository::SnapshotRepository;
pub use service::RegistryCache;
pub use types::{DeviceChannel, DeviceRecord, RegistrySnapshot};
