use bytemuck::Pod;

use crate::error::DeviceError;
use crate::renderer::device::{BufferDesc, BufferId, BufferUsage, RenderDevice};

/// A small uniform block owned by exactly one pass invocation.
///
/// The CPU copy is authoritative; [`ConfigBuffer::upload`] only touches the
/// device when the value changed since the last upload.
#[derive(Debug)]
pub struct ConfigBuffer<T: Pod> {
    buffer: BufferId,
    value: T,
    dirty: bool,
}

impl<T: Pod> ConfigBuffer<T> {
    pub fn new(device: &mut dyn RenderDevice, label: &str, value: T) -> Result<Self, DeviceError> {
        let buffer = device.create_buffer(&BufferDesc {
            label: label.to_string(),
            size: std::mem::size_of::<T>().max(16) as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        Ok(Self {
            buffer,
            value,
            dirty: true,
        })
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set(&mut self, value: T) {
        if bytemuck::bytes_of(&self.value) != bytemuck::bytes_of(&value) {
            self.value = value;
            self.dirty = true;
        }
    }

    /// Returns true when a write was issued.
    pub fn upload(&mut self, device: &mut dyn RenderDevice) -> bool {
        if !self.dirty {
            return false;
        }
        device.write_buffer(self.buffer, 0, bytemuck::bytes_of(&self.value));
        self.dirty = false;
        true
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_buffer(self.buffer);
    }
}
