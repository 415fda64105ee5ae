//! Backend for a live vehicle map.
//!
//! Polls a position feed, turns each snapshot into render records (position,
//! heading, per-route color) and a route legend, and serves both to the map
//! front end over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod realtime;
pub mod render;
