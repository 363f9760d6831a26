pub mod capabilities;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pubsub;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
