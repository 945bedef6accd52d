#[macro_use]
extern crate log;

pub mod actuator;
pub mod command;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod driver;
pub mod engine;
pub mod error;
pub mod frame_source;
pub mod geometry;
pub mod logger;
pub mod navigation;
pub mod pi_blaster_driver;
pub mod transport;
pub mod vision;
