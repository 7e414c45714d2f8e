//! # BI Platform MCP Library
//!
//! This library provides a client for the BI platform RESTful web services
//! (`/biprws`) and exposes it through the Model Context Protocol (MCP). It
//! consists of two main components:
//!
//! ## Client Module
//!
//! The [`client`] module provides a direct HTTP client: a two-step log-on that
//! returns an explicit [`Session`], read operations that flatten the JSON
//! responses into a [`Table`](client::Table), and multipart spreadsheet upload.
//!
//! ## Server Module
//!
//! The [`server`] module implements an MCP server that exposes the client
//! operations as tools that AI assistants can use.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcp_biprws::{BiClient, BiMcpServer};
//! use mcp_biprws::client::{AuthType, Credentials};
//!
//! // Use the client directly
//! let client = BiClient::new("http://localhost:6405".to_string());
//!
//! // Or create an MCP server
//! let server = BiMcpServer::new(
//!     client,
//!     Credentials::new("Administrator", "secret", AuthType::Enterprise),
//! );
//! ```

pub mod client;
pub mod server;

pub use client::{BiClient, Session};
pub use server::BiMcpServer;
