//! Per-frame LOD selection and streaming decisions
//!
//! Every update rebuilds the set of split chunks top-down from the root. A
//! chunk splits when the viewpoint wants more detail than its own level can
//! encode and its children (plus the chunks its split would depend on) have
//! geometry resident. Missing geometry is requested and the split waits for a
//! later frame. Chunks that are close to wanting a split warm up their
//! children; chunks that are far from it let their subtrees go.

use crate::chunk::ChunkId;
use crate::core::types::Vec3;
use crate::math::frustum::CullResult;
use crate::math::Aabb;
use crate::streaming::{ChunkLoader, ChunkRequest, Delivery, PayloadKind};
use crate::tree::ChunkLodTree;

/// Largest level difference allowed between adjacent rendered chunks.
pub const MAX_ALLOWED_NEIGHBOR_DIFFERENCE: u32 = 2;

/// Warm-up priority above which children are prefetched instead of released.
const WARM_UP_PRIORITY: f32 = 0.5;

/// Desired packed LOD for a chunk whose box is `distance` from the viewpoint.
///
/// Full detail (`(tree_depth << 8) - 1`) within `distance_lod_max`, then one
/// level coarser per doubling of distance, with the morph byte interpolating
/// in between.
pub fn desired_lod(tree_depth: u16, distance: f32, distance_lod_max: f32) -> u16 {
    let ratio = (distance / distance_lod_max).max(1.0);
    let falloff = (ratio.log2() * 256.0) as i64;
    let desired = ((tree_depth as i64) << 8) - 1 - falloff;
    desired.clamp(0, 0xFFFF) as u16
}

impl ChunkLodTree {
    /// Run one frame of LOD selection for a viewpoint in the local frame.
    ///
    /// Finished loads are taken from `loader` first, so data requested during
    /// one update can be used for splitting in the next.
    pub fn update(&mut self, viewpoint: Vec3, loader: &mut dyn ChunkLoader) {
        self.frame += 1;
        self.apply_deliveries(loader);

        let root = self.root();
        self.request_load(root, 1.0, loader);

        self.clear(root);
        self.update_chunk(root, viewpoint, loader);
        self.flush_unloads(loader);

        if self.textures.is_some() {
            self.update_texture(root, viewpoint, loader);
        }

        self.refresh_stats();
        log::trace!(
            "LOD update: {} split, {} resident, {} pending",
            self.stats.split_chunks,
            self.stats.resident_chunks,
            self.stats.pending_loads
        );
    }

    /// Desired packed LOD of a box.
    pub fn compute_lod(&self, bounds: &Aabb, viewpoint: Vec3) -> u16 {
        desired_lod(
            self.header.tree_depth,
            bounds.distance_to_point(viewpoint),
            self.distance_lod_max,
        )
    }

    /// Desired texture quadtree level of a box. May be negative.
    pub fn compute_texture_lod(&self, bounds: &Aabb, viewpoint: Vec3) -> i32 {
        let Some(info) = self.textures else {
            return -1;
        };
        let ratio = (bounds.distance_to_point(viewpoint) / self.texture_distance_lod_max).max(1.0);
        let desired = info.depth as i64 - 1 - ratio.log2().floor() as i64;
        desired.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// Unsplit the split subtree under `id`.
    fn clear(&mut self, id: ChunkId) {
        let chunk = &mut self.chunks[id.index()];
        chunk.cull = CullResult::ALL_PLANES;
        if !chunk.split {
            return;
        }
        chunk.split = false;
        if let Some(children) = chunk.children {
            for child in children {
                self.clear(child);
            }
        }
    }

    fn update_chunk(&mut self, id: ChunkId, viewpoint: Vec3, loader: &mut dyn ChunkLoader) {
        let desired = self.compute_lod(&self.chunks[id.index()].bounds, viewpoint);
        let (children, lod, level) = {
            let chunk = &self.chunks[id.index()];
            (chunk.children, chunk.lod, chunk.level)
        };

        if let Some(children) = children {
            if desired > lod.ceil() && self.can_split(id, loader) {
                self.do_split(id, viewpoint);
                for child in children {
                    self.update_chunk(child, viewpoint, loader);
                }
                return;
            }
        }

        // This chunk represents its region within tolerance
        if level == 0 {
            self.chunks[id.index()].lod = lod.clamped(desired);
        }
        let lod = self.chunks[id.index()].lod;

        let Some(children) = children else {
            return;
        };
        let priority = if desired > lod.floor() {
            lod.morph() as f32 / 255.0
        } else {
            0.0
        };

        if priority < WARM_UP_PRIORITY {
            if self.budget.should_evict_geometry() {
                for child in children {
                    self.request_unload_subtree(child, loader);
                }
            }
        } else {
            for child in children {
                self.warm_up_data(child, priority, loader);
            }
        }
    }

    /// Whether `id` may be split this frame.
    ///
    /// Requests geometry for any child that lacks it. Also requires every
    /// unsplit ancestor, and the chunk
    /// `MAX_ALLOWED_NEIGHBOR_DIFFERENCE` levels above each neighbor, to be
    /// splittable, so adjacent chunks never drift too far apart in level.
    pub fn can_split(&mut self, id: ChunkId, loader: &mut dyn ChunkLoader) -> bool {
        let chunk = &self.chunks[id.index()];
        if chunk.split {
            return true;
        }
        let Some(children) = chunk.children else {
            return false;
        };
        let parent = chunk.parent;
        let neighbors = chunk.neighbors;

        let mut can_split = true;

        for child in children {
            if !self.chunks[child.index()].has_resident_data() {
                self.request_load(child, 1.0, loader);
                can_split = false;
            }
        }

        let mut ancestor = parent;
        while let Some(p) = ancestor {
            if self.chunks[p.index()].split {
                break;
            }
            if !self.can_split(p, loader) {
                can_split = false;
            }
            ancestor = self.chunks[p.index()].parent;
        }

        for neighbor in neighbors {
            let mut n = neighbor.chunk;
            for _ in 0..MAX_ALLOWED_NEIGHBOR_DIFFERENCE {
                n = n.and_then(|n| self.chunks[n.index()].parent);
            }
            if let Some(n) = n {
                if !self.can_split(n, loader) {
                    can_split = false;
                }
            }
        }

        can_split
    }

    /// Split `id`, giving its children valid morph values and splitting any
    /// unsplit ancestors first. Callers check [`Self::can_split`] beforehand.
    pub fn do_split(&mut self, id: ChunkId, viewpoint: Vec3) {
        if self.chunks[id.index()].split {
            return;
        }
        self.chunks[id.index()].split = true;

        if let Some(children) = self.chunks[id.index()].children {
            for child in children {
                debug_assert!(self.chunks[child.index()].has_resident_data());
                let desired = self.compute_lod(&self.chunks[child.index()].bounds, viewpoint);
                let child = &mut self.chunks[child.index()];
                child.lod = child.lod.clamped(desired);
                child.cull = CullResult::ALL_PLANES;
            }
        }

        let mut ancestor = self.chunks[id.index()].parent;
        while let Some(p) = ancestor {
            if self.chunks[p.index()].split {
                break;
            }
            self.do_split(p, viewpoint);
            ancestor = self.chunks[p.index()].parent;
        }
    }

    /// Ask for `id`'s geometry unless it is resident, already on its way or
    /// backing off after a failed load.
    pub(crate) fn request_load(&mut self, id: ChunkId, priority: f32, loader: &mut dyn ChunkLoader) {
        let frame = self.frame;
        let chunk = &mut self.chunks[id.index()];
        if chunk.data.is_some() || chunk.load_pending || !chunk.load_retry.ready(frame) {
            return;
        }
        chunk.load_pending = true;
        loader.request_load(ChunkRequest::for_record(id, chunk), priority);
    }

    /// Prefetch `id` and release its descendants.
    fn warm_up_data(&mut self, id: ChunkId, priority: f32, loader: &mut dyn ChunkLoader) {
        self.request_load(id, priority, loader);
        if let Some(children) = self.chunks[id.index()].children {
            for child in children {
                self.request_unload_subtree(child, loader);
            }
        }
    }

    /// Release geometry of `id` and everything below it. Pending loads are
    /// cancelled now; resident data is freed at the end of the update.
    pub(crate) fn request_unload_subtree(&mut self, id: ChunkId, loader: &mut dyn ChunkLoader) {
        let chunk = &mut self.chunks[id.index()];
        let mut active = chunk.data.is_some() || chunk.load_pending;

        if chunk.load_pending {
            chunk.load_pending = false;
            loader.request_unload(ChunkRequest::for_record(id, chunk));
        }
        if chunk.data.is_some() {
            self.unload_queue.push(id);
        }

        let Some(children) = self.chunks[id.index()].children else {
            return;
        };
        // Children can be requested on behalf of a neighbor before their parent
        active |= children.iter().any(|c| {
            let child = &self.chunks[c.index()];
            child.data.is_some() || child.load_pending
        });
        if active {
            for child in children {
                self.request_unload_subtree(child, loader);
            }
        }
    }

    /// Free queued geometry whose parent is not rendering it.
    fn flush_unloads(&mut self, loader: &mut dyn ChunkLoader) {
        let mut queue = std::mem::take(&mut self.unload_queue);
        queue.sort_unstable();
        queue.dedup();

        for &id in &queue {
            let parent_split = self.chunks[id.index()]
                .parent
                .is_some_and(|p| self.chunks[p.index()].split);
            if parent_split {
                continue;
            }

            let chunk = &mut self.chunks[id.index()];
            if let Some(data) = chunk.data.take() {
                self.budget.remove_geometry(data.byte_size());
                loader.request_unload(ChunkRequest::for_record(id, chunk));
                log::debug!("Unloaded chunk {} (level {})", chunk.label, chunk.level);
            }
        }

        queue.clear();
        self.unload_queue = queue;
    }

    /// Move finished loads into their chunks. Results nobody is waiting for
    /// any more are dropped.
    fn apply_deliveries(&mut self, loader: &mut dyn ChunkLoader) {
        for delivery in loader.poll_completed() {
            let id = delivery.chunk();
            let Some(chunk) = self.chunks.get_mut(id.index()) else {
                log::warn!("Delivery for unknown chunk {:?}", id);
                continue;
            };

            match delivery {
                Delivery::Data(_, data) => {
                    if !chunk.load_pending || chunk.data.is_some() {
                        log::debug!("Discarding unrequested geometry for chunk {}", chunk.label);
                        continue;
                    }
                    chunk.load_pending = false;
                    chunk.load_retry.reset();
                    self.budget.add_geometry(data.byte_size());
                    chunk.data = Some(data);
                }
                Delivery::Texture(_, texture) => {
                    if !chunk.texture_pending || chunk.texture.is_some() {
                        log::debug!("Discarding unrequested texture for chunk {}", chunk.label);
                        continue;
                    }
                    chunk.texture_pending = false;
                    chunk.texture_retry.reset();
                    self.budget.add_texture(texture.byte_size());
                    chunk.texture = Some(texture);
                }
                Delivery::Failed { kind, reason, .. } => {
                    let (pending, retry) = match kind {
                        PayloadKind::Geometry => (&mut chunk.load_pending, &mut chunk.load_retry),
                        PayloadKind::Texture => (&mut chunk.texture_pending, &mut chunk.texture_retry),
                    };
                    if !*pending {
                        log::debug!("Ignoring failure of unrequested {:?} for chunk {}", kind, chunk.label);
                        continue;
                    }
                    *pending = false;
                    retry.fail(self.frame);
                    log::warn!(
                        "Failed to load {:?} for chunk {} (attempt {}, retry at frame {}): {}",
                        kind,
                        chunk.label,
                        retry.failures,
                        retry.next_frame,
                        reason
                    );
                }
            }
        }
    }

    fn update_texture(&mut self, id: ChunkId, viewpoint: Vec3, loader: &mut dyn ChunkLoader) {
        let Some(info) = self.textures else {
            return;
        };
        let chunk = &self.chunks[id.index()];
        if chunk.level as u32 >= info.depth {
            // Inherits an ancestor's texture
            return;
        }

        let desired = self.compute_texture_lod(&chunk.bounds, viewpoint);
        let wanted = chunk.data.is_some() && desired >= chunk.level as i32;

        if chunk.texture.is_some() {
            if !wanted {
                self.request_unload_textures(id, loader);
            } else if let Some(children) = chunk.children {
                for child in children {
                    self.update_texture(child, viewpoint, loader);
                }
            }
        } else if chunk.texture_pending {
            if !wanted {
                self.request_unload_textures(id, loader);
            }
        } else if wanted
            && chunk.texture_retry.ready(self.frame)
            && !self.budget.should_evict_textures()
        {
            let chunk = &mut self.chunks[id.index()];
            chunk.texture_pending = true;
            loader.request_load_texture(ChunkRequest::for_record(id, chunk));
        }
    }

    /// Release textures of `id` and its descendants, deepest first.
    fn request_unload_textures(&mut self, id: ChunkId, loader: &mut dyn ChunkLoader) {
        let chunk = &self.chunks[id.index()];
        if chunk.texture.is_none() && !chunk.texture_pending {
            return;
        }
        if let Some(children) = chunk.children {
            for child in children {
                self.request_unload_textures(child, loader);
            }
        }

        let chunk = &mut self.chunks[id.index()];
        chunk.texture_pending = false;
        if let Some(texture) = chunk.texture.take() {
            self.budget.remove_texture(texture.byte_size());
        }
        loader.request_unload_texture(ChunkRequest::for_record(id, chunk));
    }
}
