use std::collections::{HashMap, HashSet};

use crate::error::PassError;
use crate::renderer::config_buffer::ConfigBuffer;
use crate::renderer::device::{
    Attachment, BindingDesc, BindingId, BufferId, DrawCommand, ImageId, ImageView, PassOp,
    RasterPass, RasterPipeline, RecordedPass, RenderDevice,
};
use crate::renderer::material_buffer::{MaterialDataBuffer, UNREGISTERED_SLOT};
use crate::renderer::sync::{FrameGraph, PassCategory, Signal};
use crate::renderer::uniforms::ObjectUniform;
use crate::scene::drawable::{Drawable, DrawableId, RenderQueues};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Opaque,
    Transparent,
}

/// Fixed per-kind choices of a geometry pass.
pub struct PassBehaviour {
    pub label: &'static str,
    pub pipeline: RasterPipeline,
    pub category: PassCategory,
    /// Picks this pass's list out of the frame's queues.
    pub queue: fn(&RenderQueues) -> &[Drawable],
    pub clear_depth: bool,
    pub depth_write: bool,
    pub blend: bool,
}

fn opaque_queue(queues: &RenderQueues) -> &[Drawable] {
    &queues.opaque
}

fn transparent_queue(queues: &RenderQueues) -> &[Drawable] {
    &queues.transparent
}

static BEHAVIOURS: [PassBehaviour; 2] = [
    PassBehaviour {
        label: "Opaque",
        pipeline: RasterPipeline::Opaque,
        category: PassCategory::Opaque,
        queue: opaque_queue,
        clear_depth: true,
        depth_write: true,
        blend: false,
    },
    PassBehaviour {
        label: "Transparent",
        pipeline: RasterPipeline::Transparent,
        category: PassCategory::Transparent,
        queue: transparent_queue,
        clear_depth: false,
        depth_write: false,
        blend: true,
    },
];

impl PassKind {
    pub fn behaviour(self) -> &'static PassBehaviour {
        match self {
            PassKind::Opaque => &BEHAVIOURS[0],
            PassKind::Transparent => &BEHAVIOURS[1],
        }
    }
}

/// What a cached binding was built for; any change forces a rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub material_slot: u32,
    pub skinned: bool,
    pub topology_revision: u32,
}

impl BindingKey {
    fn of(drawable: &Drawable, material_slot: u32) -> Self {
        Self {
            material_slot,
            skinned: drawable.skinned,
            topology_revision: drawable.topology_revision,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindingStats {
    pub rebuilt: usize,
    pub reused: usize,
    pub skipped: usize,
}

#[derive(Debug)]
struct CachedBinding {
    key: BindingKey,
    binding: BindingId,
    object: ConfigBuffer<ObjectUniform>,
}

/// Per-drawable binding sets, kept across frames.
#[derive(Debug)]
pub struct BindingCache {
    label: String,
    entries: HashMap<DrawableId, CachedBinding>,
    queued: Vec<Drawable>,
    stats: BindingStats,
}

impl BindingCache {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: HashMap::new(),
            queued: Vec::new(),
            stats: BindingStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters of the last `realise`.
    pub fn stats(&self) -> BindingStats {
        self.stats
    }

    /// Binding key of `drawable`, or `None` when its material has no slot.
    /// Without `materials` (depth-only passes) the slot is ignored.
    fn key_for(drawable: &Drawable, materials: Option<&MaterialDataBuffer>) -> Option<BindingKey> {
        let material_slot = match materials {
            Some(buffer) => match buffer.id_of(drawable.material) {
                UNREGISTERED_SLOT => return None,
                slot => slot,
            },
            None => UNREGISTERED_SLOT,
        };
        Some(BindingKey::of(drawable, material_slot))
    }

    /// Takes the draw list for the coming frames and estimates the binding
    /// work against the current material slots. CPU only; slots are looked
    /// up again when the draws are realised.
    pub fn plan(&mut self, drawables: &[Drawable], materials: Option<&MaterialDataBuffer>) -> BindingStats {
        let mut stats = BindingStats::default();
        let mut seen = HashSet::with_capacity(drawables.len());
        for drawable in drawables {
            let key = match Self::key_for(drawable, materials) {
                Some(key) if seen.insert(drawable.id) => key,
                _ => {
                    stats.skipped += 1;
                    continue;
                }
            };
            match self.entries.get(&drawable.id) {
                Some(cached) if cached.key == key => stats.reused += 1,
                _ => stats.rebuilt += 1,
            }
        }

        self.queued.clear();
        self.queued.extend_from_slice(drawables);
        stats
    }

    /// Resolves each queued drawable's material slot, rebuilds bindings whose
    /// key changed, refreshes per-object uniforms and drops entries for
    /// drawables that left the list. Returns the draws in list order.
    pub fn realise(
        &mut self,
        device: &mut dyn RenderDevice,
        materials: Option<&MaterialDataBuffer>,
    ) -> Vec<DrawCommand> {
        let mut stats = BindingStats::default();
        let queued = std::mem::take(&mut self.queued);
        let mut draws = Vec::with_capacity(queued.len());
        let mut live: HashMap<DrawableId, CachedBinding> = HashMap::with_capacity(queued.len());

        for drawable in &queued {
            if live.contains_key(&drawable.id) {
                log::warn!("{}: drawable {:?} listed twice, drawn once", self.label, drawable.id);
                stats.skipped += 1;
                continue;
            }
            let Some(key) = Self::key_for(drawable, materials) else {
                log::warn!(
                    "{}: drawable {:?} uses unregistered material {:?}, skipped",
                    self.label,
                    drawable.id,
                    drawable.material
                );
                stats.skipped += 1;
                continue;
            };
            let uniform = ObjectUniform::new(drawable.transform, key.material_slot);

            let mut entry = match self.entries.remove(&drawable.id) {
                Some(mut cached) if cached.key == key => {
                    cached.object.set(uniform);
                    stats.reused += 1;
                    cached
                }
                stale => {
                    if let Some(stale) = stale {
                        device.destroy_binding(stale.binding);
                        stale.object.destroy(device);
                    }
                    match self.build(device, drawable, key, uniform) {
                        Some(entry) => {
                            stats.rebuilt += 1;
                            entry
                        }
                        None => {
                            stats.skipped += 1;
                            continue;
                        }
                    }
                }
            };

            entry.object.upload(device);
            draws.push(DrawCommand {
                mesh: drawable.mesh,
                binding: entry.binding,
                index_count: drawable.index_count,
                material_slot: key.material_slot,
            });
            live.insert(drawable.id, entry);
        }

        for (_, unused) in self.entries.drain() {
            device.destroy_binding(unused.binding);
            unused.object.destroy(device);
        }
        self.entries = live;
        self.queued = queued;
        self.stats = stats;
        draws
    }

    fn build(
        &self,
        device: &mut dyn RenderDevice,
        drawable: &Drawable,
        key: BindingKey,
        uniform: ObjectUniform,
    ) -> Option<CachedBinding> {
        let label = format!("{} {:?}", self.label, drawable.id);
        let object = match ConfigBuffer::new(device, &label, uniform) {
            Ok(object) => object,
            Err(err) => {
                log::warn!("{label}: object uniform allocation failed: {err}");
                return None;
            }
        };
        match device.create_binding(&BindingDesc {
            label,
            object: object.buffer(),
        }) {
            Ok(binding) => Some(CachedBinding {
                key,
                binding,
                object,
            }),
            Err(err) => {
                log::warn!("{}: binding for {:?} failed: {err}", self.label, drawable.id);
                object.destroy(device);
                None
            }
        }
    }

    pub fn clear(&mut self, device: &mut dyn RenderDevice) {
        for (_, cached) in self.entries.drain() {
            device.destroy_binding(cached.binding);
            cached.object.destroy(device);
        }
        self.queued.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Uninitialised,
    Ready,
}

/// Resources a geometry pass renders with and into.
#[derive(Clone, Debug)]
pub struct GeometryTargets {
    pub color: ImageId,
    pub depth: ImageId,
    pub scene: BufferId,
    pub materials: Option<BufferId>,
    pub shadow_maps: Vec<ImageView>,
}

#[derive(Debug)]
pub struct GeometryPass {
    kind: PassKind,
    state: PassState,
    cache: BindingCache,
}

impl GeometryPass {
    pub fn new(kind: PassKind) -> Self {
        Self {
            kind,
            state: PassState::Uninitialised,
            cache: BindingCache::new(kind.behaviour().label),
        }
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn stats(&self) -> BindingStats {
        self.cache.stats()
    }

    pub fn cached_bindings(&self) -> usize {
        self.cache.len()
    }

    pub fn initialise(&mut self) {
        self.state = PassState::Ready;
    }

    fn ensure_ready(&self) -> Result<(), PassError> {
        match self.state {
            PassState::Ready => Ok(()),
            PassState::Uninitialised => Err(PassError::NotReady {
                pass: self.kind.behaviour().label,
            }),
        }
    }

    /// Takes this pass's draw list for the frame. No GPU work.
    pub fn update(
        &mut self,
        queues: &RenderQueues,
        materials: &MaterialDataBuffer,
    ) -> Result<BindingStats, PassError> {
        self.ensure_ready()?;
        let drawables = (self.kind.behaviour().queue)(queues);
        Ok(self.cache.plan(drawables, Some(materials)))
    }

    /// Submits the draws in the order they were handed over, with material
    /// slots as they stand now.
    pub fn record(
        &mut self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        targets: &GeometryTargets,
        materials: &MaterialDataBuffer,
        waits: &[Signal],
    ) -> Result<Signal, PassError> {
        self.ensure_ready()?;
        let behaviour = self.kind.behaviour();
        let draws = self.cache.realise(device, Some(materials));

        let depth = if behaviour.clear_depth {
            Attachment::clear_depth(ImageView::base(targets.depth), 1.0)
        } else {
            Attachment::load(ImageView::base(targets.depth))
        };
        let pass = RecordedPass::new(
            behaviour.label,
            PassOp::Raster(RasterPass {
                pipeline: behaviour.pipeline,
                color: Some(Attachment::load(ImageView::base(targets.color))),
                depth: Some(depth),
                view: targets.scene,
                materials: targets.materials,
                sampled: targets.shadow_maps.clone(),
                draws,
            }),
        );

        Ok(graph.submit(device, behaviour.category, &pass, waits))
    }

    pub fn cleanup(&mut self, device: &mut dyn RenderDevice) {
        self.cache.clear(device);
        self.state = PassState::Uninitialised;
    }
}
