//! Wire models for the deployment console backend

pub mod models;
