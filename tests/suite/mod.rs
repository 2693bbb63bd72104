//! Integration test suite modules

mod handshake;
mod lifecycle;
mod requests;
