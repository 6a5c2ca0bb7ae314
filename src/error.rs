use thiserror::Error;

use crate::renderer::device::{BufferId, Extent, ImageId};
use crate::renderer::sync::Signal;

/// Failures reported by a [`RenderDevice`](crate::renderer::RenderDevice)
/// while creating or addressing GPU objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("image '{label}' could not be allocated: {reason}")]
    ImageAllocation { label: String, reason: String },
    #[error("buffer '{label}' could not be allocated: {reason}")]
    BufferAllocation { label: String, reason: String },
    #[error("extent {0:?} is not a valid render target size")]
    InvalidExtent(Extent),
    #[error("unknown image {0:?}")]
    UnknownImage(ImageId),
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    #[error("graphics device unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterialBufferError {
    #[error("material buffer is full ({capacity} materials)")]
    Full { capacity: u32 },
    #[error("material is not registered")]
    NotRegistered,
    #[error("material buffer has no GPU storage")]
    NotAllocated,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassError {
    #[error("pass '{pass}' recorded before initialise")]
    NotReady { pass: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TechniqueError {
    #[error("technique initialisation failed: {0}")]
    Initialisation(#[source] DeviceError),
    #[error("technique used before initialise")]
    NotInitialised,
    #[error("previous frame signal {0:?} has not been presented")]
    FrameInFlight(Signal),
    #[error("signal {0:?} is not the frame currently in flight")]
    UnknownSignal(Signal),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Material(#[from] MaterialBufferError),
    #[error(transparent)]
    Pass(#[from] PassError),
}
