//! # replist-sync — service layer for the replicated sorted list
//!
//! Wires the [`replist_core`] engine to the network: a WebSocket RPC
//! server, the batch service that imposes the single commit order, and the
//! synthetic-workload client used to exercise the whole loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   UpdateList    ┌───────────────────────────────┐
//! │ WorkloadClient│ ──────────────► │ RpcServer (one task per conn) │
//! │  send loop   │                 └───────────────┬───────────────┘
//! │  poll loop   │ ◄────────────── GetList /       │ validated batches
//! └──────────────┘   GetListUpdates│               ▼
//!                                  │  ┌─────────────────────────┐
//!                                  │  │ BatchService            │
//!                                  │  │  bounded queue          │
//!                                  │  │  tick ── sort ── commit │
//!                                  │  └───────────┬─────────────┘
//!                                  │              ▼
//!                                  │      DocumentHistory
//!                                  └──────────────────────────────
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — bincode-encoded request/response wire messages
//! - [`service`] — batch queue + periodic commit worker
//! - [`server`] — WebSocket accept loop and request dispatch
//! - [`client`] — dial-retry workload client with divergence detection
//! - [`monitor`] — injected server/client statistics collectors

pub mod client;
pub mod monitor;
pub mod protocol;
pub mod server;
pub mod service;

pub use client::{ClientConfig, ClientError, WorkloadClient};
pub use monitor::{ClientMonitor, MovingAverage, ServerMonitor};
pub use protocol::{EditKind, EditRequest, ProtocolError, Request, Response};
pub use server::{RpcServer, ServerConfig};
pub use service::{BatchService, ServiceConfig, ServiceError};
