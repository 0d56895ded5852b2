//! Synthesis provider implementations

pub mod google_cloud;

pub use google_cloud::{GoogleCloudTts, GoogleCloudTtsBuilder};
