pub mod classifier;
pub mod config;
pub mod debounce;
pub mod error;
pub mod event;
pub mod model;
pub mod notify;
pub mod paths;
pub mod persistence;
pub mod retry;
pub mod sandbox;
pub mod session;
pub mod store;
pub mod sync;
pub mod tracker;
