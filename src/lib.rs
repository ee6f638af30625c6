//! Client-side coordination layer for an on-chain job escrow.
//!
//! A [`session::WalletSessionManager`] binds the client to one wallet account on one
//! network and derives the contract binding from it. [`jobs::JobQueryService`] and
//! [`jobs::JobCreationService`] read and create escrow jobs through that binding,
//! and [`controller::ViewController`] owns the observable state, tagging every
//! request so results from a superseded lookup or a previous account never reach
//! the view.
//!
//! The wallet itself is abstracted by [`provider::WalletProvider`]; the crate ships a
//! JSON-RPC implementation and an in-memory mock.

pub mod cli;
pub mod config;
pub mod contract;
pub mod controller;
pub mod errors;
pub mod jobs;
pub mod provider;
pub mod session;
pub mod telemetry;
pub mod time_format;
pub mod units;
