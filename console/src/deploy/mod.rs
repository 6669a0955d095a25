//! Deployment lifecycle orchestration

pub mod controller;
pub mod fsm;
pub mod gatekeeper;
pub mod observation;
