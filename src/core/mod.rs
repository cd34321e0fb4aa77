pub mod category;
pub mod config;
pub mod docker;
pub mod facts;
pub mod payload;
pub mod rate;
pub mod sampler;
pub mod scheduler;
pub mod snapshot;
pub mod sources;

pub use category::MetricCategory;
pub use config::{ConfigError, SamplerConfig};
pub use docker::ContainerSource;
pub use facts::HostFacts;
pub use sampler::Sampler;
pub use snapshot::{MetricValue, Snapshot, SnapshotStore};
