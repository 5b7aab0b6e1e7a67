//! Periodic frame sampling from the rendered video surface.

pub mod controller;
pub mod loop_worker;
pub mod surface;

pub use controller::SamplerController;
pub use surface::{FrameSampler, StillImageSurface, UnavailableSurface, VideoSurface};
