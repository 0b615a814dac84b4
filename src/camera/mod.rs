//! Live camera view: layout, zoom, gestures, rendering and tap snapshots.

pub mod geometry;
pub mod gesture;
pub mod gl;
pub mod pipeline;
pub mod renderer;
pub mod snapshot;
pub mod source;
#[cfg(feature = "webcam")]
pub mod webcam;
pub mod zoom;

pub use gesture::{ExclusionRect, PointerEvent, PointerKind};
pub use gl::ScreenRect;
pub use pipeline::{CameraPipeline, PointerPhase, TapResult};
pub use snapshot::{ContainerRect, TapPayload};
pub use source::{CameraError, StillImageSource, VideoSource, open_camera};
