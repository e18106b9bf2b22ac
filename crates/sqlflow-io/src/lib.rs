//! Source and destination connectors consumed by the step executors (C5).

pub mod connector;
pub mod csv;
pub mod factory;
pub mod profile;
pub mod stubs;

pub use connector::{DestinationConnector, SourceConnector};
pub use profile::{Profile, ProfileError};
