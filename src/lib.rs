pub mod arp;
pub mod backoff;
pub mod cmd;
pub mod config;
pub mod constants;
pub mod dns;
pub mod error;
pub mod fs;
pub mod interface_config;
pub mod inventory;
pub mod ip;
pub mod logger;
pub mod manager;
pub mod materialize;
pub mod network;
pub mod settings;

#[cfg(test)]
mod fakes;
