pub mod device;
pub mod route_controller;
pub(crate) mod worker;

pub use device::{AudioDevice, AudioRoute, AudioStream};
pub use route_controller::{AudioRouteController, VolumeSnapshot};
pub(crate) use worker::AudioWorker;
