pub mod config;
pub mod db;
pub mod logging;
pub mod monitor;

/// Release builds may stamp `PINGWATCH_VERSION`; otherwise the crate version.
pub const VERSION: &str = match option_env!("PINGWATCH_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
