//! Client core for a cloud-management platform (CMP).
//!
//! - [`config`]: per-environment YAML configuration with encrypted scalars
//! - [`token`]: on-disk session cache
//! - [`client`]: authenticated API client with retry-once on expired sessions
//! - [`task`]: polling of asynchronous tasks and instances
//!
//! # Example
//!
//! ```no_run
//! use cmpkit::{ApiClient, ClientOptions, CmpApi, ConfigLoader, TokenCache};
//!
//! let config = ConfigLoader::new("/etc/beehive").load("dev", None)?;
//! let cache = TokenCache::new("/var/lib/beehive/tokens");
//! let mut client = ApiClient::connect(&config, cache, ClientOptions::default())?;
//! let users = client.get("auth", "/v1.0/nas/users")?;
//! println!("{users}");
//! # Ok::<(), cmpkit::Error>(())
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod signing;
pub mod subsystem;
pub mod task;
pub mod token;
pub mod transport;
pub mod value;
pub mod vault;

pub use client::{ApiClient, ApiRequest, ClientOptions, CmpApi};
pub use config::{AuthType, CmpConfig, ConfigLoader, EndpointMap, EnvironmentConfig};
pub use error::{ApiCode, ApiError, Error, Result, TaskError};
pub use task::{Clock, ManualClock, SystemClock, WaitOptions, WaitOutcome};
pub use token::{Session, TokenCache};
pub use transport::{Method, MockTransport, RequestBody, Transport};
