//! HTTP API handlers

mod episodes;
mod health;
mod signals;

pub use episodes::episode_routes;
pub use health::health_routes;
pub use signals::signal_routes;
