//! Forecast-score series turned into quartile-colored intervals, with a washer
//! trigger policy and best-window ranking on top.

pub mod config;
pub mod device;
pub mod engine;
pub mod http;
pub mod intervals;
pub mod locator;
pub mod policy;
pub mod poller;
pub mod profile;
pub mod quartiles;
pub mod series;
pub mod state;
pub mod windows;
