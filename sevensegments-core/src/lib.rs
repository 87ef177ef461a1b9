//! # sevensegments-core
//!
//! Client SDK for the 7SEGMENTS customer analytics API.
//!
//! This library provides:
//! - [`SevenSegments`], the client tracking events, updating customers and
//!   evaluating campaigns
//! - Pluggable [`Transport`]s: reqwest HTTP, raw socket, and in-memory
//! - Configuration loading from TOML
//! - Logging infrastructure
//!
//! ## Delivery
//!
//! `track`, `identify` and `update` are fire-and-forget: the request is sent
//! once and its outcome is never reported. `evaluate` is synchronous and
//! returns an error when the request fails or the response is unusable.
//! Nothing is retried, batched or persisted.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sevensegments_core::{Properties, SevenSegments};
//!
//! let mut client = SevenSegments::builder("your-api-token")
//!     .customer("jane@example.com")
//!     .build()
//!     .expect("failed to create client");
//!
//! let mut properties = Properties::new();
//! properties.insert("price".to_string(), 12.into());
//! client.track("purchase", Some(properties)).expect("invalid event");
//!
//! client.set_project("newsletter").expect("invalid project");
//! let campaign = client.evaluate(&["welcome-mail"], None).expect("evaluation failed");
//! println!("{}", campaign);
//! ```

// Re-export commonly used items at the crate root
pub use client::{Properties, SevenSegments, SevenSegmentsBuilder, DEFAULT_PROJECT, DEFAULT_TARGET};
pub use config::Config;
pub use customer::{Customer, CustomerIds};
pub use error::{Error, Result};
pub use transport::{
    HttpTransport, MemoryTransport, SocketTransport, Transport, TransportError, TransportResponse,
};

// Public modules
pub mod client;
pub mod config;
pub mod customer;
pub mod error;
pub mod logging;
pub mod transport;
