pub mod api;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod model;
pub mod notify;
pub mod observability;
pub mod page;
pub mod scheduler;
pub mod status;
pub mod store;
