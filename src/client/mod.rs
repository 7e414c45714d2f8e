//! # BI Platform HTTP Client
//!
//! This module provides a direct HTTP client for the BI platform RESTful web
//! services: session log-on/log-off, document, schedule, connection and
//! universe retrieval, infostore folder listing and spreadsheet upload.
//!
//! ## Modules
//!
//! - [`auth`] - Log-on handshake, log-off and the [`Session`] handle
//! - [`client`] - Main HTTP client implementation with all API methods
//! - [`flatten`] - Flattening of nested JSON responses into a [`Table`]
//! - [`types`] - Type definitions for API requests and responses
//! - [`error`] - Error type shared by every operation
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcp_biprws::client::{AuthType, BiClient, Credentials, Page};
//!
//! # async fn example() -> mcp_biprws::client::Result<()> {
//! let client = BiClient::new("http://localhost:6405".to_string());
//!
//! let credentials = Credentials::new("Administrator", "secret", AuthType::Enterprise);
//! let mut session = client.log_on(&credentials).await?;
//!
//! let documents = client.list_documents(&session, Page::new(0, 10)).await?;
//! println!("Found {} documents", documents.len());
//!
//! client.log_off(&mut session).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
#[allow(clippy::module_inception)]
pub mod client;
pub mod error;
pub mod flatten;
pub mod types;

pub use auth::{Session, SessionToken};
pub use client::BiClient;
pub use error::{BiError, Result};
pub use flatten::{flatten, Column, ColumnNaming, Flattener, Table};
pub use types::*;
