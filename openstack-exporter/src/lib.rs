//! Prometheus exporter for OpenStack.
//!
//! On every scrape each registered exporter re-authenticates against the
//! identity service, queries its OpenStack service and turns the responses
//! into Prometheus samples. The network exporter ([`neutron`]) reports
//! floating IP, network, security group and subnet counts and the state of
//! every network agent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Keystone/Neutron│<────│    Exporters    │<────│   HTTP Server   │
//! │   (REST APIs)   │     │   (Registry)    │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! openstack-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod auth;
pub mod config;
pub mod exporter;
pub mod http;
pub mod network;
pub mod neutron;
pub mod registry;

pub use auth::{AuthError, AuthenticatingClient, KeystoneClient};
pub use config::ExporterConfig;
pub use exporter::{BaseExporter, Exporter, ScrapeStatus};
pub use http::HttpServer;
pub use network::{NetworkApi, NeutronClient};
pub use neutron::NetworkExporter;
pub use registry::{Registry, SharedRegistry};
