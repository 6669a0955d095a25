//! Authentication: credential inspection and the session store

pub mod session;
pub mod token;
