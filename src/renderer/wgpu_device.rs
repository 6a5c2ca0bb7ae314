// renderer/wgpu_device.rs
use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::error::DeviceError;
use crate::renderer::device::{
    Attachment, Binding, BindingDesc, BindingId, Buffer, BufferDesc, BufferId, BufferUsage, Extent,
    FullscreenEffect, FullscreenPass, Image, ImageDesc, ImageFormat, ImageId, ImageUsage, ImageView,
    LoadOp, Mesh, MeshId, PassOp, RasterPass, RasterPipeline, RecordedPass, RenderDevice,
};
use crate::renderer::handle::HandleAllocator;
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::sync::Signal;
use crate::renderer::vertex::Vertex;

/// Size of one material record; the fallback storage buffer holds one.
const FALLBACK_MATERIAL_BYTES: u64 = 48;
/// Scene colour, occlusion, bloom.
const COMPOSITE_INPUTS: u32 = 3;

pub fn texture_format(format: ImageFormat) -> wgpu::TextureFormat {
    match format {
        ImageFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        ImageFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        ImageFormat::R16Float => wgpu::TextureFormat::R16Float,
        ImageFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        ImageFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        ImageFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

/// Depth24Plus has no defined byte layout, so it can never be copied.
pub fn texture_usage(desc: &ImageDesc) -> wgpu::TextureUsages {
    let mut usage = wgpu::TextureUsages::empty();
    if desc.usage.contains(ImageUsage::RENDER_TARGET) {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if desc.usage.contains(ImageUsage::SAMPLED) {
        usage |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if desc.format != ImageFormat::Depth24PlusStencil8 {
        if desc.usage.contains(ImageUsage::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        if desc.usage.contains(ImageUsage::COPY_DST) {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
    }
    usage
}

pub fn buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        out |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        out |= wgpu::BufferUsages::COPY_DST;
    }
    out
}

fn color_load(load: LoadOp) -> wgpu::LoadOp<wgpu::Color> {
    match load {
        LoadOp::ClearColor([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }),
        LoadOp::ClearDepth(_) => wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

fn depth_load(load: LoadOp) -> wgpu::LoadOp<f32> {
    match load {
        LoadOp::ClearDepth(depth) => wgpu::LoadOp::Clear(depth),
        LoadOp::ClearColor(_) | LoadOp::Load => wgpu::LoadOp::Load,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum PipelineKey {
    Raster {
        pipeline: RasterPipeline,
        color: Option<ImageFormat>,
        depth: Option<ImageFormat>,
    },
    Fullscreen {
        effect: FullscreenEffect,
        output: ImageFormat,
    },
}

struct GpuImage {
    desc: ImageDesc,
    texture: wgpu::Texture,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

/// An attachment resolved to a texture view.
struct Target {
    view: wgpu::TextureView,
    format: ImageFormat,
    load: LoadOp,
}

struct BindLayouts {
    view: wgpu::BindGroupLayout,
    object: wgpu::BindGroupLayout,
    materials: wgpu::BindGroupLayout,
    fullscreen_color: wgpu::BindGroupLayout,
    fullscreen_depth: wgpu::BindGroupLayout,
    composite: wgpu::BindGroupLayout,
}

impl BindLayouts {
    fn new(device: &wgpu::Device) -> Self {
        let buffer_entry = |visibility, ty| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let fullscreen = |label, sample_type, textures: u32| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> =
                std::iter::once(buffer_entry(wgpu::ShaderStages::FRAGMENT, wgpu::BufferBindingType::Uniform))
                    .chain((1..=textures).map(|binding| wgpu::BindGroupLayoutEntry {
                        binding,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    }))
                    .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            })
        };

        Self {
            view: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("View Layout"),
                entries: &[buffer_entry(
                    wgpu::ShaderStages::VERTEX_FRAGMENT,
                    wgpu::BufferBindingType::Uniform,
                )],
            }),
            object: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Object Layout"),
                entries: &[buffer_entry(
                    wgpu::ShaderStages::VERTEX,
                    wgpu::BufferBindingType::Uniform,
                )],
            }),
            materials: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Materials Layout"),
                entries: &[buffer_entry(
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BufferBindingType::Storage { read_only: true },
                )],
            }),
            fullscreen_color: fullscreen(
                "Fullscreen Color Layout",
                wgpu::TextureSampleType::Float { filterable: false },
                1,
            ),
            fullscreen_depth: fullscreen("Fullscreen Depth Layout", wgpu::TextureSampleType::Depth, 1),
            composite: fullscreen(
                "Composite Layout",
                wgpu::TextureSampleType::Float { filterable: false },
                COMPOSITE_INPUTS,
            ),
        }
    }
}

struct PipelineLayouts {
    shadow: wgpu::PipelineLayout,
    geometry: wgpu::PipelineLayout,
    fullscreen_color: wgpu::PipelineLayout,
    fullscreen_depth: wgpu::PipelineLayout,
    composite: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    fn new(device: &wgpu::Device, layouts: &BindLayouts) -> Self {
        let create = |label, groups: &[&wgpu::BindGroupLayout]| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: groups,
                push_constant_ranges: &[],
            })
        };
        Self {
            shadow: create("Shadow Pipeline Layout", &[&layouts.view, &layouts.object]),
            geometry: create(
                "Geometry Pipeline Layout",
                &[&layouts.view, &layouts.object, &layouts.materials],
            ),
            fullscreen_color: create("Fullscreen Color Pipeline Layout", &[&layouts.fullscreen_color]),
            fullscreen_depth: create("Fullscreen Depth Pipeline Layout", &[&layouts.fullscreen_depth]),
            composite: create("Composite Pipeline Layout", &[&layouts.composite]),
        }
    }
}

struct Shaders {
    geometry: wgpu::ShaderModule,
    shadow: wgpu::ShaderModule,
    blur: wgpu::ShaderModule,
    ssao: wgpu::ShaderModule,
    bloom: wgpu::ShaderModule,
    composite: wgpu::ShaderModule,
}

impl Shaders {
    fn new(device: &wgpu::Device) -> Self {
        let module = |label, source: String| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };
        let fullscreen = |effect: &str| format!("{}\n{}", include_str!("../shader/fullscreen.wgsl"), effect);

        Self {
            geometry: module("Geometry Shader", include_str!("../shader/geometry.wgsl").to_string()),
            shadow: module("Shadow Shader", include_str!("../shader/shadow_depth.wgsl").to_string()),
            blur: module("Blur Shader", fullscreen(include_str!("../shader/blur.wgsl"))),
            ssao: module("SSAO Shader", fullscreen(include_str!("../shader/ssao.wgsl"))),
            bloom: module("Bloom Shader", fullscreen(include_str!("../shader/bloom.wgsl"))),
            composite: module("Composite Shader", fullscreen(include_str!("../shader/composite.wgsl"))),
        }
    }
}

// One queue executes submissions in order, so a wait only has to name a
// submission already made.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_layouts: BindLayouts,
    pipeline_layouts: PipelineLayouts,
    shaders: Shaders,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    fallback_materials: wgpu::Buffer,
    images: HashMap<ImageId, GpuImage>,
    buffers: HashMap<BufferId, GpuBuffer>,
    bindings: HashMap<BindingId, wgpu::BindGroup>,
    meshes: HashMap<MeshId, GpuMesh>,
    image_ids: HandleAllocator<Image>,
    buffer_ids: HandleAllocator<Buffer>,
    binding_ids: HandleAllocator<Binding>,
    mesh_ids: HandleAllocator<Mesh>,
    last_signal: u64,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let bind_layouts = BindLayouts::new(&device);
        let pipeline_layouts = PipelineLayouts::new(&device, &bind_layouts);
        let shaders = Shaders::new(&device);
        let fallback_materials = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fallback Materials"),
            size: FALLBACK_MATERIAL_BYTES,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            bind_layouts,
            pipeline_layouts,
            shaders,
            pipelines: HashMap::new(),
            fallback_materials,
            images: HashMap::new(),
            buffers: HashMap::new(),
            bindings: HashMap::new(),
            meshes: HashMap::new(),
            image_ids: HandleAllocator::default(),
            buffer_ids: HandleAllocator::default(),
            binding_ids: HandleAllocator::default(),
            mesh_ids: HandleAllocator::default(),
            last_signal: 0,
        }
    }

    /// Device without a surface; blocks until the adapter answers.
    pub fn headless() -> Result<Self, DeviceError> {
        pollster::block_on(Self::request())
    }

    pub async fn request() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| DeviceError::Unavailable(err.to_string()))?;
        log::info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Frame Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| DeviceError::Unavailable(err.to_string()))?;

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn texture(&self, image: ImageId) -> Option<&wgpu::Texture> {
        self.images.get(&image).map(|image| &image.texture)
    }

    /// Out-of-memory raised since the matching `push_error_scope`.
    fn pop_allocation_error(&self) -> Option<String> {
        pollster::block_on(self.device.pop_error_scope()).map(|err| err.to_string())
    }

    fn view(&self, view: ImageView, aspect: wgpu::TextureAspect) -> Option<(wgpu::TextureView, ImageFormat)> {
        let image = self.images.get(&view.image)?;
        if view.mip >= image.desc.mip_levels || view.layer >= image.desc.layers {
            return None;
        }
        let texture_view = image.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&image.desc.label),
            dimension: Some(wgpu::TextureViewDimension::D2),
            aspect,
            base_mip_level: view.mip,
            mip_level_count: Some(1),
            base_array_layer: view.layer,
            array_layer_count: Some(1),
            ..Default::default()
        });
        Some((texture_view, image.desc.format))
    }

    fn target(&self, attachment: &Attachment, pass: &str) -> Option<Target> {
        let Some((view, format)) = self.view(attachment.view, wgpu::TextureAspect::All) else {
            log::warn!("'{}' targets unknown image view {:?}", pass, attachment.view);
            return None;
        };
        Some(Target {
            view,
            format,
            load: attachment.load,
        })
    }

    fn sampled_view(&self, view: ImageView) -> Option<(wgpu::TextureView, ImageFormat)> {
        let format = self.images.get(&view.image)?.desc.format;
        let aspect = if format.is_depth() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        self.view(view, aspect)
    }

    fn buffer_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
        label: &str,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> bool {
        if self.pipelines.contains_key(&key) {
            return true;
        }
        match self.build_pipeline(key) {
            Some(pipeline) => {
                log::debug!("Created pipeline {:?}", key);
                self.pipelines.insert(key, pipeline);
                true
            }
            None => false,
        }
    }

    fn build_pipeline(&self, key: PipelineKey) -> Option<wgpu::RenderPipeline> {
        match key {
            PipelineKey::Raster {
                pipeline,
                color,
                depth,
            } => {
                let (layout, shader) = match pipeline {
                    RasterPipeline::ShadowDepth => {
                        (&self.pipeline_layouts.shadow, &self.shaders.shadow)
                    }
                    _ => (&self.pipeline_layouts.geometry, &self.shaders.geometry),
                };
                PipelineBuilder::new(&self.device, layout, shader).raster(
                    pipeline,
                    color.map(texture_format),
                    depth.map(texture_format),
                )
            }
            PipelineKey::Fullscreen { effect, output } => {
                let (layout, shader, label) = match effect {
                    FullscreenEffect::Blur => (
                        &self.pipeline_layouts.fullscreen_color,
                        &self.shaders.blur,
                        "Blur Pipeline",
                    ),
                    FullscreenEffect::AmbientOcclusion => (
                        &self.pipeline_layouts.fullscreen_depth,
                        &self.shaders.ssao,
                        "SSAO Pipeline",
                    ),
                    FullscreenEffect::BrightPass => (
                        &self.pipeline_layouts.fullscreen_color,
                        &self.shaders.bloom,
                        "Bright Pass Pipeline",
                    ),
                    FullscreenEffect::Composite => (
                        &self.pipeline_layouts.composite,
                        &self.shaders.composite,
                        "Composite Pipeline",
                    ),
                };
                Some(
                    PipelineBuilder::new(&self.device, layout, shader)
                        .fullscreen(label, texture_format(output)),
                )
            }
        }
    }

    fn encode_raster(&mut self, encoder: &mut wgpu::CommandEncoder, label: &str, raster: &RasterPass) {
        let color = raster.color.as_ref().and_then(|a| self.target(a, label));
        let depth = raster.depth.as_ref().and_then(|a| self.target(a, label));

        let key = PipelineKey::Raster {
            pipeline: raster.pipeline,
            color: color.as_ref().map(|t| t.format),
            depth: depth.as_ref().map(|t| t.format),
        };
        let has_pipeline = !raster.draws.is_empty() && self.ensure_pipeline(key);

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color
            .iter()
            .map(|target| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: color_load(target.load),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let depth_attachment = depth.as_ref().map(|target| wgpu::RenderPassDepthStencilAttachment {
            view: &target.view,
            depth_ops: Some(wgpu::Operations {
                load: depth_load(target.load),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: (target.format == ImageFormat::Depth24PlusStencil8).then_some(
                wgpu::Operations {
                    load: match target.load {
                        LoadOp::Load => wgpu::LoadOp::Load,
                        _ => wgpu::LoadOp::Clear(0),
                    },
                    store: wgpu::StoreOp::Store,
                },
            ),
        });

        let view_group = self
            .buffers
            .get(&raster.view)
            .map(|view| self.buffer_group(&self.bind_layouts.view, &view.buffer, label));
        let materials = raster
            .materials
            .and_then(|id| self.buffers.get(&id))
            .map_or(&self.fallback_materials, |materials| &materials.buffer);
        let materials_group = self.buffer_group(&self.bind_layouts.materials, materials, label);

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let (true, Some(pipeline), Some(view_group)) = (has_pipeline, self.pipelines.get(&key), view_group)
        else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &view_group, &[]);
        if raster.pipeline != RasterPipeline::ShadowDepth {
            pass.set_bind_group(2, &materials_group, &[]);
        }
        for draw in &raster.draws {
            let (Some(binding), Some(mesh)) = (self.bindings.get(&draw.binding), self.meshes.get(&draw.mesh))
            else {
                log::warn!("'{}' skips a draw with a released binding or mesh", label);
                continue;
            };
            pass.set_bind_group(1, binding, &[]);
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count.min(mesh.index_count), 0, 0..1);
        }
    }

    fn encode_fullscreen(&mut self, encoder: &mut wgpu::CommandEncoder, label: &str, fullscreen: &FullscreenPass) {
        let Some(output) = self.target(&fullscreen.output, label) else {
            return;
        };
        let key = PipelineKey::Fullscreen {
            effect: fullscreen.effect,
            output: output.format,
        };
        if !self.ensure_pipeline(key) {
            return;
        }
        let (layout, expected) = match fullscreen.effect {
            FullscreenEffect::AmbientOcclusion => (&self.bind_layouts.fullscreen_depth, 1),
            FullscreenEffect::Composite => (&self.bind_layouts.composite, COMPOSITE_INPUTS as usize),
            FullscreenEffect::Blur | FullscreenEffect::BrightPass => (&self.bind_layouts.fullscreen_color, 1),
        };
        let Some(inputs) = fullscreen
            .inputs
            .iter()
            .take(expected)
            .map(|view| self.sampled_view(*view))
            .collect::<Option<Vec<_>>>()
            .filter(|inputs| inputs.len() == expected)
        else {
            log::warn!("'{}' needs {} readable inputs", label, expected);
            return;
        };
        let wants_depth = fullscreen.effect == FullscreenEffect::AmbientOcclusion;
        if let Some((_, format)) = inputs.iter().find(|(_, format)| format.is_depth() != wants_depth) {
            log::warn!("'{}' input format {:?} does not fit {:?}", label, format, fullscreen.effect);
            return;
        }
        let Some(config) = self.buffers.get(&fullscreen.config) else {
            log::warn!("'{}' config buffer {:?} is gone", label, fullscreen.config);
            return;
        };
        let entries: Vec<wgpu::BindGroupEntry> = std::iter::once(wgpu::BindGroupEntry {
            binding: 0,
            resource: config.buffer.as_entire_binding(),
        })
        .chain(inputs.iter().zip(1u32..).map(|((view, _), binding)| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        }))
        .collect();
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        });
        let Some(pipeline) = self.pipelines.get(&key) else {
            return;
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &output.view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: color_load(output.load),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Texel copy of the overlapping region; formats must match.
    fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, label: &str, source: ImageView, destination: ImageView) {
        let (Some(from), Some(to)) = (self.images.get(&source.image), self.images.get(&destination.image)) else {
            log::warn!("'{}' copies between unknown images", label);
            return;
        };
        if from.desc.format != to.desc.format {
            log::warn!(
                "'{}' cannot copy {:?} into {:?}",
                label,
                from.desc.format,
                to.desc.format
            );
            return;
        }
        let from_extent = from.desc.mip_extent(source.mip);
        let to_extent = to.desc.mip_extent(destination.mip);
        let extent = Extent::new(
            from_extent.width.min(to_extent.width),
            from_extent.height.min(to_extent.height),
        );

        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &from.texture,
                mip_level: source.mip,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: source.layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &to.texture,
                mip_level: destination.mip,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: destination.layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn next_signal(&mut self) -> Signal {
        self.last_signal += 1;
        Signal::from_raw(self.last_signal)
    }
}

impl RenderDevice for WgpuDevice {
    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageId, DeviceError> {
        let limits = self.device.limits();
        if desc.extent.is_empty()
            || desc.extent.width > limits.max_texture_dimension_2d
            || desc.extent.height > limits.max_texture_dimension_2d
        {
            return Err(DeviceError::InvalidExtent(desc.extent));
        }
        if desc.layers > limits.max_texture_array_layers {
            return Err(DeviceError::ImageAllocation {
                label: desc.label.clone(),
                reason: format!("{} layers exceed the device limit", desc.layers),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.extent.width,
                height: desc.extent.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: texture_usage(desc),
            view_formats: &[],
        });
        if let Some(reason) = self.pop_allocation_error() {
            texture.destroy();
            return Err(DeviceError::ImageAllocation {
                label: desc.label.clone(),
                reason,
            });
        }

        let id = self.image_ids.allocate();
        self.images.insert(
            id,
            GpuImage {
                desc: desc.clone(),
                texture,
            },
        );
        Ok(id)
    }

    fn destroy_image(&mut self, image: ImageId) {
        if let Some(image) = self.images.remove(&image) {
            image.texture.destroy();
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

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size: desc.size,
            usage: buffer_usage(desc.usage),
            mapped_at_creation: false,
        });
        if let Some(reason) = self.pop_allocation_error() {
            buffer.destroy();
            return Err(DeviceError::BufferAllocation {
                label: desc.label.clone(),
                reason,
            });
        }

        let id = self.buffer_ids.allocate();
        self.buffers.insert(id, GpuBuffer { buffer });
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.buffer.destroy();
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer) {
            Some(target) => self.queue.write_buffer(&target.buffer, offset, data),
            None => log::warn!("Write to unknown buffer {:?} dropped", buffer),
        }
    }

    fn create_binding(&mut self, desc: &BindingDesc) -> Result<BindingId, DeviceError> {
        let object = self
            .buffers
            .get(&desc.object)
            .ok_or(DeviceError::UnknownBuffer(desc.object))?;
        let group = self.buffer_group(&self.bind_layouts.object, &object.buffer, &desc.label);
        let id = self.binding_ids.allocate();
        self.bindings.insert(id, group);
        Ok(id)
    }

    fn destroy_binding(&mut self, binding: BindingId) {
        self.bindings.remove(&binding);
    }

    fn create_mesh(
        &mut self,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<MeshId, DeviceError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(DeviceError::BufferAllocation {
                label: label.to_string(),
                reason: "mesh has no geometry".to_string(),
            });
        }
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertices")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Indices")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let id = self.mesh_ids.allocate();
        self.meshes.insert(
            id,
            GpuMesh {
                vertices: vertex_buffer,
                indices: index_buffer,
                index_count: indices.len() as u32,
            },
        );
        Ok(id)
    }

    fn destroy_mesh(&mut self, mesh: MeshId) {
        if let Some(mesh) = self.meshes.remove(&mesh) {
            mesh.vertices.destroy();
            mesh.indices.destroy();
        }
    }

    fn create_signal(&mut self) -> Signal {
        self.next_signal()
    }

    fn submit(&mut self, pass: &RecordedPass, waits: &[Signal]) -> Signal {
        for wait in waits {
            if wait.raw() == 0 || wait.raw() > self.last_signal {
                log::warn!("'{}' waits on {:?} which was never issued", pass.label, wait);
            }
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&pass.label),
        });
        match &pass.op {
            PassOp::Raster(raster) => self.encode_raster(&mut encoder, &pass.label, raster),
            PassOp::Fullscreen(fullscreen) => self.encode_fullscreen(&mut encoder, &pass.label, fullscreen),
            PassOp::Copy {
                source,
                destination,
            } => self.encode_copy(&mut encoder, &pass.label, *source, *destination),
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.next_signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_depth_is_never_copyable() {
        let desc = ImageDesc::render_target(
            "Depth",
            Extent::new(8, 8),
            ImageFormat::Depth24PlusStencil8,
        );
        let usage = texture_usage(&desc);
        assert!(usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(!usage.intersects(wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST));
    }

    #[test]
    fn colour_targets_keep_copy_usage() {
        let desc = ImageDesc::render_target("Color", Extent::new(8, 8), ImageFormat::Rgba16Float);
        assert!(texture_usage(&desc).contains(wgpu::TextureUsages::COPY_SRC));
        assert_eq!(texture_format(desc.format), wgpu::TextureFormat::Rgba16Float);
    }

    #[test]
    fn buffer_usage_maps_each_flag() {
        let usage = buffer_usage(BufferUsage::STORAGE | BufferUsage::COPY_DST);
        assert_eq!(usage, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST);
    }
}
