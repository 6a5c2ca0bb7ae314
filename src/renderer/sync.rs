use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use smallvec::SmallVec;

use crate::renderer::device::{ImageId, RecordedPass, RenderDevice};

/// GPU-visible completion marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signal(u64);

impl Signal {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

pub type SignalWaits = SmallVec<[Signal; 4]>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassSync {
    pub waits: SignalWaits,
    pub signal: Signal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassCategory {
    Shadow,
    Environment,
    Background,
    Opaque,
    Transparent,
    PostEffect,
    /// Tone-mapped resolve the presentation layer reads.
    Composite,
}

#[derive(Clone, Debug)]
pub struct SubmissionRecord {
    pub label: String,
    pub category: PassCategory,
    pub sync: PassSync,
    pub reads: Vec<ImageId>,
    pub writes: Vec<ImageId>,
    pub draws: usize,
}

/// Submission graph of one frame.
///
/// Signals passed to [`FrameGraph::new`] are the roots: they come from outside
/// the frame and have no producing record.
#[derive(Clone, Debug, Default)]
pub struct FrameGraph {
    roots: SignalWaits,
    records: Vec<SubmissionRecord>,
    producers: HashMap<Signal, usize>,
}

impl FrameGraph {
    pub fn new(roots: &[Signal]) -> Self {
        Self {
            roots: roots.iter().copied().collect(),
            records: Vec::new(),
            producers: HashMap::new(),
        }
    }

    pub fn roots(&self) -> &[Signal] {
        &self.roots
    }

    /// Submits `pass` after `waits` and records the resulting edge set.
    pub fn submit(
        &mut self,
        device: &mut dyn RenderDevice,
        category: PassCategory,
        pass: &RecordedPass,
        waits: &[Signal],
    ) -> Signal {
        let signal = device.submit(pass, waits);
        log::trace!("{} waits {:?} -> {:?}", pass.label, waits, signal);

        self.producers.insert(signal, self.records.len());
        self.records.push(SubmissionRecord {
            label: pass.label.clone(),
            category,
            sync: PassSync {
                waits: waits.iter().copied().collect(),
                signal,
            },
            reads: pass.reads(),
            writes: pass.writes(),
            draws: pass.draw_count(),
        });
        signal
    }

    pub fn records(&self) -> &[SubmissionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn producer_of(&self, signal: Signal) -> Option<&SubmissionRecord> {
        self.producers.get(&signal).map(|&index| &self.records[index])
    }

    pub fn find(&self, label: &str) -> Option<&SubmissionRecord> {
        self.records.iter().find(|record| record.label == label)
    }

    pub fn by_category(&self, category: PassCategory) -> impl Iterator<Item = &SubmissionRecord> {
        self.records
            .iter()
            .filter(move |record| record.category == category)
    }

    /// True when `later` transitively waits on `earlier`.
    pub fn is_ordered_before(&self, earlier: Signal, later: Signal) -> bool {
        let mut pending = vec![later];
        let mut seen = HashSet::new();

        while let Some(signal) = pending.pop() {
            if !seen.insert(signal) {
                continue;
            }
            let Some(record) = self.producer_of(signal) else {
                continue;
            };
            for &wait in &record.sync.waits {
                if wait == earlier {
                    return true;
                }
                pending.push(wait);
            }
        }

        false
    }

    /// Every record that writes an image `record` reads must be ordered
    /// before it. Returns the offending (writer, reader) label pairs.
    pub fn unordered_hazards(&self) -> Vec<(String, String)> {
        let mut hazards = Vec::new();
        for (reader_index, reader) in self.records.iter().enumerate() {
            for writer in &self.records[..reader_index] {
                let shares_image = writer.writes.iter().any(|image| reader.reads.contains(image));
                if shares_image && !self.is_ordered_before(writer.sync.signal, reader.sync.signal)
                {
                    hazards.push((writer.label.clone(), reader.label.clone()));
                }
            }
        }
        hazards
    }

    /// Multi-line dump of the graph for debug logging.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "roots: {:?}", self.roots.as_slice());
        for record in &self.records {
            let _ = writeln!(
                out,
                "{:?} {:<28} waits {:?} -> {:?} ({} draws)",
                record.category,
                record.label,
                record.sync.waits.as_slice(),
                record.sync.signal,
                record.draws
            );
        }
        out
    }
}
