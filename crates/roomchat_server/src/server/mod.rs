#![forbid(unsafe_code)]

pub mod connection;
pub mod health;
pub mod registry;
pub mod room_key;
pub mod router;

#[cfg(test)]
mod connection_tests;
