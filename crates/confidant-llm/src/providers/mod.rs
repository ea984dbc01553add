//! Concrete completion providers

mod replicate;

pub use replicate::{ReplicateConfig, ReplicateProvider};
