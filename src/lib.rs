pub mod config;
pub mod domain;
pub mod in_flight;
pub mod mail;
mod routes;
pub mod shutdown;
pub mod startup;
pub mod telemetry;
mod util;

pub use startup::{run, Application};
