pub mod classifier;
pub mod config;
pub mod guidance;
pub mod imaging;
pub mod pipeline;
pub mod routes;
pub mod sessions;
