//! Local storage: settings and the persisted session

pub mod layout;
pub mod session;
pub mod settings;
