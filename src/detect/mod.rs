//! Local face detection for the overlay.
//!
//! Detection here only finds face regions in the current frame; identity comes
//! from the remote service. Backends are pluggable and selected by name.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::FaceDetectorBackend;
pub use backends::{CenterBackend, NoneBackend};
pub use registry::BackendRegistry;
pub use result::FaceRegion;
