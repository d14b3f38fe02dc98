//! Live facial-expression detection and overlay.
//!
//! The crate is organized per concern, each with a `domain` layer (ports
//! and pure logic) and an `infrastructure` layer (camera, ONNX runtime,
//! pixel drawing). `pipeline` owns the sampling/inference/render loop and
//! its lifecycle.

pub mod capture;
pub mod detection;
pub mod overlay;
pub mod pipeline;
pub mod shared;
