pub mod config;
pub mod core;
pub mod exchange;
pub mod models;
pub mod signals;
#[cfg(test)]
pub mod test_helpers;
pub mod trading;
