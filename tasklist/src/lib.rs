//! `tasklist`: optimistic, realtime-reconciled task list with debounced
//! category and duration suggestions.

pub mod config;
pub mod enrich;
pub mod session;
pub mod store;
pub mod tasks;
