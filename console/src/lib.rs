//! deployctl library
//!
//! Client-side orchestration of remote deployments: the lifecycle state
//! model, the action gatekeeper, status polling, sync progress streaming and
//! the authenticated request gateway they all go through.

pub mod app;
pub mod authn;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
pub mod workers;
