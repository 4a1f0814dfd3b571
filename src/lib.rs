//! Battery and charging status for AirPods, read from their BLE proximity
//! beacons without pairing or a companion app.
//!
//! Data flow: [`bluetooth`] scan → [`beacon::window`] arbitration →
//! [`beacon::validator`] filter → [`beacon::decoder`] → [`sink`].

pub mod acquisition;
pub mod beacon;
pub mod bluetooth;
pub mod config;
pub mod error;
pub mod models;
pub mod sink;
pub mod utils;
