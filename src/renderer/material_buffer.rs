// renderer/material_buffer.rs
use std::collections::{HashMap, HashSet};

use crate::error::{DeviceError, MaterialBufferError};
use crate::renderer::device::{BufferDesc, BufferId, BufferUsage, RenderDevice};
use crate::scene::material::{MaterialData, MaterialId};

pub const UNREGISTERED_SLOT: u32 = 0;

/// GPU array of material records. Slot ids are 1-based and contiguous:
/// removing a material shifts every later one down a slot.
#[derive(Debug)]
pub struct MaterialDataBuffer {
    capacity: u32,
    buffer: Option<BufferId>,
    /// `slots[i]` occupies slot id `i + 1`.
    slots: Vec<MaterialId>,
    records: HashMap<MaterialId, MaterialData>,
    dirty: Vec<MaterialId>,
    dirty_set: HashSet<MaterialId>,
    writes_issued: u64,
}

impl MaterialDataBuffer {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            buffer: None,
            slots: Vec::new(),
            records: HashMap::new(),
            dirty: Vec::new(),
            dirty_set: HashSet::new(),
            writes_issued: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    pub fn writes_issued(&self) -> u64 {
        self.writes_issued
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Slot id of `material`, or [`UNREGISTERED_SLOT`].
    pub fn id_of(&self, material: MaterialId) -> u32 {
        self.slots
            .iter()
            .position(|id| *id == material)
            .map_or(UNREGISTERED_SLOT, |index| index as u32 + 1)
    }

    pub fn material_at(&self, slot: u32) -> Option<MaterialId> {
        slot.checked_sub(1)
            .and_then(|index| self.slots.get(index as usize))
            .copied()
    }

    /// Registers `material` (or refreshes its record if already present)
    /// and returns its slot id.
    pub fn add(&mut self, material: MaterialId, data: MaterialData) -> Result<u32, MaterialBufferError> {
        let existing = self.id_of(material);
        if existing != UNREGISTERED_SLOT {
            self.records.insert(material, data);
            self.mark_dirty(material)?;
            return Ok(existing);
        }
        if self.slots.len() as u32 >= self.capacity {
            return Err(MaterialBufferError::Full {
                capacity: self.capacity,
            });
        }

        self.slots.push(material);
        self.records.insert(material, data);
        self.mark_dirty(material)?;
        Ok(self.slots.len() as u32)
    }

    /// Deregisters `material`; every later material moves down one slot and
    /// is re-uploaded at its new position on the next update.
    pub fn remove(&mut self, material: MaterialId) -> Result<(), MaterialBufferError> {
        let index = self
            .slots
            .iter()
            .position(|id| *id == material)
            .ok_or(MaterialBufferError::NotRegistered)?;

        self.slots.remove(index);
        self.records.remove(&material);
        if self.dirty_set.remove(&material) {
            self.dirty.retain(|id| *id != material);
        }

        let renumbered: Vec<MaterialId> = self.slots[index..].to_vec();
        for moved in renumbered {
            self.mark_dirty(moved)?;
        }
        Ok(())
    }

    /// Change notification with the material's new record.
    pub fn set(&mut self, material: MaterialId, data: MaterialData) -> Result<(), MaterialBufferError> {
        if !self.records.contains_key(&material) {
            return Err(MaterialBufferError::NotRegistered);
        }
        self.records.insert(material, data);
        self.mark_dirty(material)
    }

    pub fn mark_dirty(&mut self, material: MaterialId) -> Result<(), MaterialBufferError> {
        if !self.records.contains_key(&material) {
            return Err(MaterialBufferError::NotRegistered);
        }
        if self.dirty_set.insert(material) {
            self.dirty.push(material);
        }
        Ok(())
    }

    /// Creates the GPU array. Every registered material is re-uploaded on
    /// the next update.
    pub fn allocate(&mut self, device: &mut dyn RenderDevice) -> Result<(), DeviceError> {
        if self.buffer.is_some() {
            return Ok(());
        }
        let buffer = device.create_buffer(&BufferDesc {
            label: "Material Data".to_string(),
            size: u64::from(self.capacity.max(1)) * MaterialData::SIZE,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })?;
        self.buffer = Some(buffer);
        for material in self.slots.clone() {
            if self.dirty_set.insert(material) {
                self.dirty.push(material);
            }
        }
        log::info!(
            "Material buffer allocated: {} slots, {} registered",
            self.capacity,
            self.slots.len()
        );
        Ok(())
    }

    /// Writes each distinct dirty material once, whole record at its current
    /// slot, then clears the dirty set. Returns the number of writes.
    pub fn update(&mut self, device: &mut dyn RenderDevice) -> Result<usize, MaterialBufferError> {
        let buffer = self.buffer.ok_or(MaterialBufferError::NotAllocated)?;
        let mut written = 0;

        for material in self.dirty.drain(..) {
            let Some(index) = self.slots.iter().position(|id| *id == material) else {
                continue;
            };
            let Some(record) = self.records.get(&material) else {
                continue;
            };
            device.write_buffer(
                buffer,
                index as u64 * MaterialData::SIZE,
                bytemuck::bytes_of(record),
            );
            written += 1;
        }
        self.dirty_set.clear();
        self.writes_issued += written as u64;

        if written > 0 {
            log::debug!("Material buffer flushed {} records", written);
        }
        Ok(written)
    }

    /// Frees the GPU array; registrations survive.
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer);
        }
    }
}
