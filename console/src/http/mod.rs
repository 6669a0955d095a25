//! Backend communication

pub mod auth;
pub mod deployments;
pub mod gateway;
pub mod transport;
