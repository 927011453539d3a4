//! Family intake: a multi-step household intake wizard service.

pub mod config;
pub mod error;
pub mod intake;
pub mod store;
