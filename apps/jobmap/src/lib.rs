pub mod address;
pub mod config;
pub mod errors;
pub mod geo;
pub mod http_client;
pub mod location;
pub mod proximity;
pub mod routes;
pub mod session;
pub mod state;
