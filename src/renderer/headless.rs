use std::collections::{HashMap, HashSet};

use crate::error::DeviceError;
use crate::renderer::device::{
    Attachment, BindingDesc, BindingId, BufferDesc, BufferId, Extent, FullscreenEffect,
    FullscreenPass, ImageDesc, ImageId, ImageView, LoadOp, MeshId, PassOp, RecordedPass,
    RenderDevice,
};
use crate::renderer::handle::HandleAllocator;
use crate::renderer::sync::Signal;
use crate::renderer::uniforms::{BloomUniform, BlurUniform, CompositeUniform};
use crate::renderer::vertex::Vertex;

const MAX_IMAGE_DIMENSION: u32 = 16384;

pub type Texel = [f32; 4];

#[derive(Clone, Debug, PartialEq)]
enum Texels {
    /// Every texel holds the same value; clears never materialise storage.
    Uniform(Texel),
    Dense(Vec<Texel>),
}

impl Texels {
    fn get(&self, extent: Extent, x: u32, y: u32) -> Texel {
        match self {
            Texels::Uniform(value) => *value,
            Texels::Dense(data) => {
                let x = x.min(extent.width - 1);
                let y = y.min(extent.height - 1);
                data[(y * extent.width + x) as usize]
            }
        }
    }

    fn to_dense(&self, extent: Extent) -> Vec<Texel> {
        match self {
            Texels::Uniform(value) => vec![*value; extent.texel_count()],
            Texels::Dense(data) => data.clone(),
        }
    }
}

#[derive(Debug)]
struct HeadlessImage {
    desc: ImageDesc,
    /// Indexed by `layer * mip_levels + mip`.
    subresources: Vec<Texels>,
}

impl HeadlessImage {
    fn index(&self, view: ImageView) -> Option<usize> {
        (view.mip < self.desc.mip_levels && view.layer < self.desc.layers)
            .then(|| (view.layer * self.desc.mip_levels + view.mip) as usize)
    }
}

#[derive(Debug)]
struct HeadlessBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

/// One logged submission.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmittedPass {
    pub label: String,
    pub waits: Vec<Signal>,
    pub signal: Signal,
    pub draws: usize,
    pub pass: RecordedPass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferWrite {
    pub buffer: BufferId,
    pub offset: u64,
    pub len: usize,
}

/// CPU device: fullscreen effects, copies and clears run on host memory;
/// raster draws are logged but not rasterised.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    images: HashMap<ImageId, HeadlessImage>,
    buffers: HashMap<BufferId, HeadlessBuffer>,
    bindings: HashMap<BindingId, BindingDesc>,
    meshes: HashMap<MeshId, (usize, usize)>,
    image_ids: HandleAllocator<crate::renderer::device::Image>,
    buffer_ids: HandleAllocator<crate::renderer::device::Buffer>,
    binding_ids: HandleAllocator<crate::renderer::device::Binding>,
    mesh_ids: HandleAllocator<crate::renderer::device::Mesh>,
    next_signal: u64,
    raised: HashSet<Signal>,
    submissions: Vec<SubmittedPass>,
    buffer_writes: Vec<BufferWrite>,
    image_budget: Option<usize>,
    images_created: usize,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device whose image allocations start failing after `budget` successes.
    pub fn with_image_budget(budget: usize) -> Self {
        Self {
            image_budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn live_image_count(&self) -> usize {
        self.images.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn submissions(&self) -> &[SubmittedPass] {
        &self.submissions
    }

    pub fn buffer_writes(&self) -> &[BufferWrite] {
        &self.buffer_writes
    }

    pub fn writes_to(&self, buffer: BufferId) -> impl Iterator<Item = &BufferWrite> {
        self.buffer_writes
            .iter()
            .filter(move |write| write.buffer == buffer)
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    pub fn is_raised(&self, signal: Signal) -> bool {
        self.raised.contains(&signal)
    }

    /// Forget logged submissions and writes; resources are kept.
    pub fn clear_log(&mut self) {
        self.submissions.clear();
        self.buffer_writes.clear();
    }

    /// Uploads texel data into one subresource.
    pub fn write_image(&mut self, view: ImageView, texels: Vec<Texel>) -> Result<(), DeviceError> {
        let image = self
            .images
            .get_mut(&view.image)
            .ok_or(DeviceError::UnknownImage(view.image))?;
        let extent = image.desc.mip_extent(view.mip);
        let index = image
            .index(view)
            .ok_or(DeviceError::UnknownImage(view.image))?;
        if texels.len() != extent.texel_count() {
            return Err(DeviceError::InvalidExtent(extent));
        }
        image.subresources[index] = Texels::Dense(texels);
        Ok(())
    }

    pub fn read_image(&self, view: ImageView) -> Option<Vec<Texel>> {
        let image = self.images.get(&view.image)?;
        let extent = image.desc.mip_extent(view.mip);
        let index = image.index(view)?;
        Some(image.subresources[index].to_dense(extent))
    }

    fn view_extent(&self, view: ImageView) -> Option<Extent> {
        self.images
            .get(&view.image)
            .map(|image| image.desc.mip_extent(view.mip))
    }

    fn texels(&self, view: ImageView) -> Option<&Texels> {
        let image = self.images.get(&view.image)?;
        let index = image.index(view)?;
        Some(&image.subresources[index])
    }

    fn store(&mut self, view: ImageView, texels: Texels) {
        let Some(image) = self.images.get_mut(&view.image) else {
            log::warn!("Write to unknown image {:?} ignored", view.image);
            return;
        };
        match image.index(view) {
            Some(index) => image.subresources[index] = texels,
            None => log::warn!("Write to out-of-range view {:?} ignored", view),
        }
    }

    fn apply_load(&mut self, attachment: &Attachment) {
        match attachment.load {
            LoadOp::ClearColor(color) => self.store(attachment.view, Texels::Uniform(color)),
            LoadOp::ClearDepth(depth) => {
                self.store(attachment.view, Texels::Uniform([depth, 0.0, 0.0, 0.0]))
            }
            LoadOp::Load => {}
        }
    }

    fn read_pod<T: bytemuck::Pod>(&self, buffer: BufferId) -> Option<T> {
        let data = &self.buffers.get(&buffer)?.data;
        let size = std::mem::size_of::<T>();
        (data.len() >= size).then(|| bytemuck::pod_read_unaligned(&data[..size]))
    }

    fn execute_fullscreen(&mut self, pass: &FullscreenPass) {
        self.apply_load(&pass.output);
        let Some(output_extent) = self.view_extent(pass.output.view) else {
            return;
        };

        let result = match pass.effect {
            FullscreenEffect::Blur => {
                let Some(uniform) = self.read_pod::<BlurUniform>(pass.config) else {
                    log::warn!("Blur config {:?} missing or short", pass.config);
                    return;
                };
                let Some(&input) = pass.inputs.first() else {
                    return;
                };
                let (Some(source), Some(source_extent)) =
                    (self.texels(input), self.view_extent(input))
                else {
                    return;
                };
                blur(source, source_extent, output_extent, &uniform.kernel())
            }
            FullscreenEffect::BrightPass => {
                let threshold = self
                    .read_pod::<BloomUniform>(pass.config)
                    .map_or(1.0, |u| u.threshold);
                let Some(&input) = pass.inputs.first() else {
                    return;
                };
                let (Some(source), Some(source_extent)) =
                    (self.texels(input), self.view_extent(input))
                else {
                    return;
                };
                resample(source, source_extent, output_extent, |texel| {
                    texel.map(|channel| (channel - threshold).max(0.0))
                })
            }
            // No geometry is rasterised here, so nothing occludes anything.
            FullscreenEffect::AmbientOcclusion => Texels::Uniform([1.0; 4]),
            FullscreenEffect::Composite => {
                let Some(uniform) = self.read_pod::<CompositeUniform>(pass.config) else {
                    log::warn!("Composite config {:?} missing or short", pass.config);
                    return;
                };
                let layers: Vec<Vec<Texel>> = pass
                    .inputs
                    .iter()
                    .filter_map(|&input| {
                        let source = self.texels(input)?;
                        let extent = self.view_extent(input)?;
                        Some(resample(source, extent, output_extent, |texel| texel).to_dense(output_extent))
                    })
                    .collect();
                let [color, occlusion, bloom] = layers.as_slice() else {
                    log::warn!("Composite needs colour, occlusion and bloom inputs");
                    return;
                };
                Texels::Dense(composite(color, occlusion, bloom, &uniform))
            }
        };

        self.store(pass.output.view, result);
    }

    fn execute_copy(&mut self, source: ImageView, destination: ImageView) {
        let (Some(texels), Some(source_extent), Some(destination_extent)) = (
            self.texels(source),
            self.view_extent(source),
            self.view_extent(destination),
        ) else {
            log::warn!("Copy {:?} -> {:?} skipped: unknown view", source, destination);
            return;
        };
        let copied = resample(texels, source_extent, destination_extent, |texel| texel);
        self.store(destination, copied);
    }
}

/// Nearest-texel mapping from `source_extent` onto `target`, then `map`.
fn resample(
    source: &Texels,
    source_extent: Extent,
    target: Extent,
    map: impl Fn(Texel) -> Texel,
) -> Texels {
    if let Texels::Uniform(value) = source {
        return Texels::Uniform(map(*value));
    }
    let mut data = Vec::with_capacity(target.texel_count());
    for y in 0..target.height {
        for x in 0..target.width {
            let sx = ((x as f32 + 0.5) * source_extent.width as f32 / target.width as f32) as u32;
            let sy =
                ((y as f32 + 0.5) * source_extent.height as f32 / target.height as f32) as u32;
            data.push(map(source.get(source_extent, sx, sy)));
        }
    }
    Texels::Dense(data)
}

/// Reinhard-mapped `exposure * (colour * occlusion + bloom * intensity)`.
fn composite(color: &[Texel], occlusion: &[Texel], bloom: &[Texel], config: &CompositeUniform) -> Vec<Texel> {
    let glow = if config.bloom_enabled != 0 {
        config.bloom_intensity
    } else {
        0.0
    };
    color
        .iter()
        .zip(occlusion)
        .zip(bloom)
        .map(|((color, occlusion), bloom)| {
            let ambient = if config.occlusion_enabled != 0 {
                occlusion[0]
            } else {
                1.0
            };
            let mut out = [0.0, 0.0, 0.0, 1.0];
            for channel in 0..3 {
                let hdr = (color[channel] * ambient + bloom[channel] * glow) * config.exposure;
                out[channel] = (hdr / (1.0 + hdr)).clamp(0.0, 1.0);
            }
            out
        })
        .collect()
}

/// Separable blur with a one-sided kernel (`kernel[0]` is the centre tap),
/// clamped at the edges.
fn blur(source: &Texels, source_extent: Extent, target: Extent, kernel: &[f32]) -> Texels {
    let resampled = resample(source, source_extent, target, |texel| texel);
    let Texels::Dense(data) = resampled else {
        return resampled;
    };
    if kernel.len() <= 1 {
        let centre = kernel.first().copied().unwrap_or(1.0);
        return Texels::Dense(data.into_iter().map(|t| t.map(|c| c * centre)).collect());
    }

    let width = target.width as i64;
    let height = target.height as i64;
    let at = |buffer: &[Texel], x: i64, y: i64| {
        let x = x.clamp(0, width - 1);
        let y = y.clamp(0, height - 1);
        buffer[(y * width + x) as usize]
    };

    let pass = |buffer: &[Texel], dx: i64, dy: i64| -> Vec<Texel> {
        let mut out = Vec::with_capacity(buffer.len());
        for y in 0..height {
            for x in 0..width {
                let mut sum = [0.0f32; 4];
                for (offset, weight) in kernel.iter().enumerate() {
                    let offset = offset as i64;
                    let mut accumulate = |texel: Texel| {
                        for channel in 0..4 {
                            sum[channel] += texel[channel] * weight;
                        }
                    };
                    accumulate(at(buffer, x + dx * offset, y + dy * offset));
                    if offset > 0 {
                        accumulate(at(buffer, x - dx * offset, y - dy * offset));
                    }
                }
                out.push(sum);
            }
        }
        out
    };

    let horizontal = pass(&data, 1, 0);
    Texels::Dense(pass(&horizontal, 0, 1))
}

impl RenderDevice for HeadlessDevice {
    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageId, DeviceError> {
        if desc.extent.is_empty()
            || desc.extent.width > MAX_IMAGE_DIMENSION
            || desc.extent.height > MAX_IMAGE_DIMENSION
        {
            return Err(DeviceError::InvalidExtent(desc.extent));
        }
        if let Some(budget) = self.image_budget {
            if self.images_created >= budget {
                return Err(DeviceError::ImageAllocation {
                    label: desc.label.clone(),
                    reason: format!("image budget of {budget} exhausted"),
                });
            }
        }

        let id = self.image_ids.allocate();
        let initial = if desc.format.is_depth() {
            [1.0, 0.0, 0.0, 0.0]
        } else {
            [0.0; 4]
        };
        let count = (desc.mip_levels.max(1) * desc.layers.max(1)) as usize;
        self.images.insert(
            id,
            HeadlessImage {
                desc: desc.clone(),
                subresources: vec![Texels::Uniform(initial); count],
            },
        );
        self.images_created += 1;
        log::trace!("Created image {:?} '{}' {:?}", id, desc.label, desc.extent);
        Ok(id)
    }

    fn destroy_image(&mut self, image: ImageId) {
        if self.images.remove(&image).is_none() {
            log::warn!("Destroying unknown image {:?}", image);
        }
    }

    fn image_desc(&self, image: ImageId) -> Option<&ImageDesc> {
        self.images.get(&image).map(|image| &image.desc)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError> {
        if desc.size == 0 {
            return Err(DeviceError::BufferAllocation {
                label: desc.label.clone(),
                reason: "zero-sized buffer".to_string(),
            });
        }
        let id = self.buffer_ids.allocate();
        self.buffers.insert(
            id,
            HeadlessBuffer {
                desc: desc.clone(),
                data: vec![0; desc.size as usize],
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("Destroying unknown buffer {:?}", buffer);
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let Some(target) = self.buffers.get_mut(&buffer) else {
            log::warn!("Write to unknown buffer {:?} ignored", buffer);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > target.data.len() {
            log::warn!(
                "Write of {} bytes at {} overflows buffer '{}' ({} bytes)",
                data.len(),
                offset,
                target.desc.label,
                target.data.len()
            );
            return;
        }
        target.data[start..end].copy_from_slice(data);
        self.buffer_writes.push(BufferWrite {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn create_binding(&mut self, desc: &BindingDesc) -> Result<BindingId, DeviceError> {
        if !self.buffers.contains_key(&desc.object) {
            return Err(DeviceError::UnknownBuffer(desc.object));
        }
        let id = self.binding_ids.allocate();
        self.bindings.insert(id, desc.clone());
        Ok(id)
    }

    fn destroy_binding(&mut self, binding: BindingId) {
        self.bindings.remove(&binding);
    }

    fn create_mesh(
        &mut self,
        _label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<MeshId, DeviceError> {
        let id = self.mesh_ids.allocate();
        self.meshes.insert(id, (vertices.len(), indices.len()));
        Ok(id)
    }

    fn destroy_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(&mesh);
    }

    fn create_signal(&mut self) -> Signal {
        self.next_signal += 1;
        let signal = Signal::from_raw(self.next_signal);
        self.raised.insert(signal);
        signal
    }

    fn submit(&mut self, pass: &RecordedPass, waits: &[Signal]) -> Signal {
        for wait in waits {
            if !self.raised.contains(wait) {
                log::warn!("'{}' waits on {:?} which was never raised", pass.label, wait);
            }
        }

        match &pass.op {
            PassOp::Raster(raster) => {
                if let Some(color) = &raster.color {
                    self.apply_load(color);
                }
                if let Some(depth) = &raster.depth {
                    self.apply_load(depth);
                }
            }
            PassOp::Fullscreen(fullscreen) => self.execute_fullscreen(fullscreen),
            PassOp::Copy {
                source,
                destination,
            } => self.execute_copy(*source, *destination),
        }

        self.next_signal += 1;
        let signal = Signal::from_raw(self.next_signal);
        self.raised.insert(signal);
        self.submissions.push(SubmittedPass {
            label: pass.label.clone(),
            waits: waits.to_vec(),
            signal,
            draws: pass.draw_count(),
            pass: pass.clone(),
        });
        signal
    }
}
