//! Access to the Kubernetes API: the Windows node listing and the secret
//! holding the additional scrape configs.

pub mod client;
pub mod config;
pub mod model;

pub use client::{sanitize_label_key, KubeClient};
pub use config::KubeConfig;
