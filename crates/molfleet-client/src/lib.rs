//! molfleet-client: HTTP client library for the coordinator API
//!
//! Provides the `FleetApi` trait consumed by the orchestration core, its
//! `reqwest` implementation, and the server-push discovery stream decoder.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use molfleet_client::{DiscoveryItem, FleetApi, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://192.168.0.10:8888")?;
//!
//! let me = client.self_descriptor().await?;
//! println!("running {:?}", me.version);
//!
//! let mut stream = client.discovery_stream().await?;
//! while let Some(item) = stream.next().await {
//!     match item? {
//!         DiscoveryItem::Host(host) => println!("found {:?}", host.host_ip),
//!         DiscoveryItem::Done => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod error;
pub mod http;
pub mod sse;
pub mod traits;

pub use artifact::ArtifactBundle;
pub use error::{ClientError, Result};
pub use http::HttpClient;
pub use sse::{DiscoveryItem, DiscoveryStream};
pub use traits::{ApplyRequest, FleetApi};
