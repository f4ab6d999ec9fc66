use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use image::{Rgba, RgbaImage};

use super::*;
use crate::chunk::{ChunkData, ChunkTexture, Direction, Lod, MeshVertex, RETRY_BASE_FRAMES, VERTEX_HALF_SPAN};
use crate::core::types::{DVec3, Mat4, Vec3};
use crate::format::header::HEADER_SIZE;
use crate::format::{ChunkFileWriter, GridTree};
use crate::math::{Frustum, Ray};
use crate::render::{ChunkDraw, RenderCapabilities, RenderOptions, RenderState, TerrainRenderer, TexGen};
use crate::streaming::{BlockingLoader, ChunkLoader, ChunkRequest, Delivery, PayloadKind};

/// Records every request and hands back whatever the test queues.
#[derive(Default)]
struct RecordingLoader {
    loads: Vec<ChunkRequest>,
    unloads: Vec<ChunkId>,
    texture_loads: Vec<ChunkId>,
    texture_unloads: Vec<ChunkId>,
    completed: Vec<Delivery>,
}

impl RecordingLoader {
    fn request_count(&self) -> usize {
        self.loads.len() + self.unloads.len() + self.texture_loads.len() + self.texture_unloads.len()
    }
}

impl ChunkLoader for RecordingLoader {
    fn request_load(&mut self, chunk: ChunkRequest, _priority: f32) {
        self.loads.push(chunk);
    }

    fn request_unload(&mut self, chunk: ChunkRequest) {
        self.unloads.push(chunk.id);
    }

    fn request_load_texture(&mut self, chunk: ChunkRequest) {
        self.texture_loads.push(chunk.id);
    }

    fn request_unload_texture(&mut self, chunk: ChunkRequest) {
        self.texture_unloads.push(chunk.id);
    }

    fn poll_completed(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.completed)
    }
}

#[derive(Default)]
struct CountingRenderer {
    draws: Vec<(ChunkId, f32, bool)>,
    binds: Vec<TexGen>,
}

impl TerrainRenderer for CountingRenderer {
    fn bind_texture(&mut self, _texture: &ChunkTexture, texgen: TexGen) {
        self.binds.push(texgen);
    }

    fn draw_chunk(&mut self, draw: &ChunkDraw<'_>) -> u32 {
        self.draws.push((draw.chunk, draw.morph, draw.positions.is_some()));
        draw.data.triangle_count
    }
}

struct TestTextures;

impl TextureSource for TestTextures {
    fn depth(&self) -> u32 {
        2
    }

    fn tile_size(&self) -> u32 {
        4
    }

    fn load_tile(&self, _level: u8, _x: u16, _z: u16) -> Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(4, 4, Rgba([0, 128, 0, 255])))
    }
}

/// Two-triangle quad covering a chunk's whole footprint at one height.
fn flat_quad(height: i16) -> ChunkData {
    let s = VERTEX_HALF_SPAN as i16;
    let vertices = vec![
        MeshVertex { x: -s, y: height, z: -s, y_delta: 0 },
        MeshVertex { x: s, y: height, z: -s, y_delta: 0 },
        MeshVertex { x: -s, y: height, z: s, y_delta: 0 },
        MeshVertex { x: s, y: height, z: s, y_delta: 0 },
    ];
    ChunkData::new(0, vertices, vec![0, 1, 2, 3])
}

/// Chunk height used by the stepped test terrain: 10 units per level.
fn level_height(level: u8) -> i16 {
    level as i16 * 10
}

fn grid(depth: u16) -> GridTree {
    GridTree { tree_depth: depth, ..Default::default() }
}

fn stepped_bytes(grid: &GridTree) -> Vec<u8> {
    grid.write(Vec::new(), |(level, _, _), _| flat_quad(level_height(level)))
        .unwrap()
}

fn flat_bytes(grid: &GridTree) -> Vec<u8> {
    grid.write(Vec::new(), |_, _| flat_quad(0)).unwrap()
}

fn open(bytes: &[u8]) -> ChunkLodTree {
    crate::core::logging::init();
    ChunkLodTree::from_file(ChunkFile::new(Cursor::new(bytes.to_vec()))).unwrap()
}

/// Install geometry directly on chunks matching `filter`.
fn make_resident(tree: &mut ChunkLodTree, filter: impl Fn(&ChunkRecord) -> bool) {
    for chunk in tree.chunks.iter_mut().filter(|c| filter(c)) {
        let mut data = flat_quad(level_height(chunk.level));
        data.label = chunk.label;
        chunk.data = Some(Box::new(data));
    }
}

fn far_away() -> Vec3 {
    Vec3::new(1.0e6, 0.0, 1.0e6)
}

fn children_of(tree: &ChunkLodTree, id: ChunkId) -> [ChunkId; 4] {
    tree.chunk(id).children.unwrap()
}

/// Chunks the current cut renders.
fn rendered_leaves(tree: &ChunkLodTree) -> Vec<ChunkId> {
    let mut leaves = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let chunk = tree.chunk(id);
        match chunk.children {
            Some(children) if chunk.split => stack.extend(children),
            _ => leaves.push(id),
        }
    }
    leaves
}

fn assert_split_invariants(tree: &ChunkLodTree) {
    for (id, chunk) in tree.chunks() {
        if !chunk.split {
            continue;
        }
        for child in children_of(tree, id) {
            assert!(
                tree.chunk(child).has_resident_data(),
                "chunk {} is split but child {} has no data",
                chunk.label,
                tree.chunk(child).label
            );
        }
        if let Some(parent) = chunk.parent {
            assert!(tree.chunk(parent).split, "chunk {} split under an unsplit parent", chunk.label);
        }
    }
}

fn bounds_bits(tree: &ChunkLodTree) -> Vec<[u32; 6]> {
    tree.chunks()
        .map(|(_, c)| {
            let (min, max) = (c.bounds.min, c.bounds.max);
            [min.x, min.y, min.z, max.x, max.y, max.z].map(f32::to_bits)
        })
        .collect()
}

// --- Construction ---

#[test]
fn test_open_links_quadtree() {
    let tree = open(&stepped_bytes(&grid(3)));
    assert_eq!(tree.chunk_count(), 21);
    assert_eq!(tree.tree_depth(), 3);

    let root = tree.chunk(tree.root());
    assert_eq!(root.level, 0);
    assert_eq!(root.parent, None);
    assert_eq!(root.neighbors, [Neighbor::NONE; 4]);

    let children = children_of(&tree, tree.root());
    for (i, &child) in children.iter().enumerate() {
        let record = tree.chunk(child);
        assert_eq!(record.level, 1);
        assert_eq!(record.parent, Some(tree.root()));
        assert_eq!((record.x, record.z), ((i & 1) as u16, (i >> 1) as u16));
        assert_eq!(record.vertex_count, 4);
    }

    // (0, 0) sees (1, 0) to the east and (0, 1) to the south
    let nw = tree.chunk(children[0]);
    assert_eq!(nw.neighbor(Direction::East), Some(children[1]));
    assert_eq!(nw.neighbor(Direction::South), Some(children[2]));
    assert_eq!(nw.neighbor(Direction::West), None);
    assert_eq!(nw.neighbor(Direction::North), None);

    let leaf = tree.chunk(children_of(&tree, children[3])[0]);
    assert!(!leaf.has_children());
    assert_eq!(leaf.level, 2);

    assert_eq!(tree.find_label(tree.chunk(children[2]).label), Some(children[2]));
    assert_eq!(tree.find_label(999), None);
}

#[test]
fn test_open_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terrain.chu");
    std::fs::write(&path, stepped_bytes(&grid(2))).unwrap();

    let tree = ChunkLodTree::open(&path).unwrap();
    assert_eq!(tree.chunk_count(), 5);
    assert!(matches!(
        ChunkLodTree::open(&dir.path().join("missing.chu")),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_initial_bounds_centered_on_root() {
    let tree = open(&stepped_bytes(&grid(3)));
    assert_eq!(tree.root_size(), 64.0);
    assert_eq!(tree.local_origin(), DVec2::ZERO);

    let bounds = tree.bounding_box();
    assert_eq!(bounds.min.x, -32.0);
    assert_eq!(bounds.max.z, 32.0);
    assert_eq!(bounds.center().x, 0.0);

    // Children tile the root
    let children = children_of(&tree, tree.root());
    for (i, &child) in children.iter().enumerate() {
        let (child, quadrant) = (tree.chunk(child).bounds, bounds.quadrant(i));
        assert_eq!((child.min.x, child.min.z), (quadrant.min.x, quadrant.min.z));
        assert_eq!((child.max.x, child.max.z), (quadrant.max.x, quadrant.max.z));
    }
    // Heights come from the stored range
    assert_eq!(tree.chunk(children[0]).bounds.min.y, 10.0);
}

#[test]
fn test_version_9_reads_vertex_counts_lazily() {
    let grid = GridTree { version: crate::format::VERSION_LAZY_VERTEX_COUNT, ..grid(3) };
    let tree = open(&stepped_bytes(&grid));
    assert!(tree.chunks().all(|(_, c)| c.vertex_count == 4));
}

#[test]
fn test_bad_magic_is_format_error() {
    let mut bytes = stepped_bytes(&grid(2));
    bytes[1] = b'X';
    let result = ChunkLodTree::from_file(ChunkFile::new(Cursor::new(bytes)));
    assert!(matches!(result, Err(Error::Format(_))));
}

#[test]
fn test_header_without_records_is_format_error() {
    // A valid depth-16 header claiming 1.4 billion chunks, and nothing else
    let header = GridTree { tree_depth: 16, ..Default::default() }.header();
    let mut out = ChunkFileWriter::new(Vec::new());
    header.write(&mut out).unwrap();
    let bytes = out.into_inner();
    assert_eq!(bytes.len() as u64, HEADER_SIZE);

    match ChunkLodTree::from_file(ChunkFile::new(Cursor::new(bytes))) {
        Err(Error::Format(msg)) => assert!(msg.contains("chunk records need")),
        Err(other) => panic!("expected format error, got {:?}", other),
        Ok(_) => panic!("truncated file opened"),
    }
}

#[test]
fn test_truncated_record_table_is_format_error() {
    let mut bytes = stepped_bytes(&grid(3));
    bytes.truncate(HEADER_SIZE as usize + 3 * NodeHeader::size(VERSION_CURRENT) as usize);
    let result = ChunkLodTree::from_file(ChunkFile::new(Cursor::new(bytes)));
    assert!(matches!(result, Err(Error::Format(_))));
}

#[test]
fn test_bad_neighbor_label_becomes_edge() {
    let grid = grid(2);
    let mut bytes = stepped_bytes(&grid);
    // East neighbor of the first level-1 record
    let record = HEADER_SIZE + NodeHeader::size(grid.version);
    let offset = (record + 4) as usize;
    bytes[offset..offset + 4].copy_from_slice(&999i32.to_le_bytes());

    let tree = open(&bytes);
    let first = children_of(&tree, tree.root())[0];
    assert_eq!(tree.chunk(first).neighbors[Direction::East as usize], Neighbor::NONE);
    assert!(tree.chunk(first).neighbor(Direction::South).is_some());
}

#[test]
fn test_bad_chunk_label_is_range_error() {
    let grid = grid(2);
    let mut bytes = stepped_bytes(&grid);
    let record = (HEADER_SIZE + 2 * NodeHeader::size(grid.version)) as usize;
    bytes[record..record + 4].copy_from_slice(&500i32.to_le_bytes());

    let result = ChunkLodTree::from_file(ChunkFile::new(Cursor::new(bytes)));
    assert!(matches!(result, Err(Error::Range { label: 500, count: 5 })));
}

// --- LOD selection ---

#[test]
fn test_far_viewpoint_issues_no_requests() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();

    tree.update(far_away(), &mut loader);

    assert!(!tree.chunk(tree.root()).split);
    assert_eq!(loader.request_count(), 0);
    assert_eq!(tree.stats().resident_chunks, 21);
    assert_eq!(tree.chunk(tree.root()).lod, Lod(0));
}

#[test]
fn test_near_viewpoint_splits_root_and_requests_grandchildren() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |c| c.level == 1);
    let mut loader = RecordingLoader::default();

    assert!(tree.can_split(tree.root(), &mut loader));
    assert!(loader.loads.is_empty());

    tree.update(Vec3::new(0.0, 5.0, 0.0), &mut loader);

    assert!(tree.chunk(tree.root()).split);
    assert!(loader.unloads.is_empty());

    let grandchild_loads: Vec<ChunkId> = loader
        .loads
        .iter()
        .filter(|r| r.level == 2)
        .map(|r| r.id)
        .collect();
    let unique: HashSet<ChunkId> = grandchild_loads.iter().copied().collect();
    assert_eq!(unique.len(), grandchild_loads.len(), "duplicate load requests");

    for child in children_of(&tree, tree.root()) {
        assert!(!tree.chunk(child).split);
        let wanted = children_of(&tree, child);
        let requested = grandchild_loads.iter().filter(|id| wanted.contains(id)).count();
        assert_eq!(requested, 4);
        assert!(wanted.iter().all(|&g| tree.chunk(g).is_load_pending()));
    }

    // Nothing new is asked for while those loads are in flight
    let before = loader.loads.len();
    tree.update(Vec3::new(0.0, 5.0, 0.0), &mut loader);
    assert_eq!(loader.loads.len(), before);
}

#[test]
fn test_streaming_split_settles_over_updates() {
    let bytes = stepped_bytes(&grid(3));
    let mut tree = open(&bytes);
    let mut loader = BlockingLoader::new(ChunkFile::new(Cursor::new(bytes)));
    let viewpoint = Vec3::new(-20.0, 15.0, -20.0);

    // Root, then children, then grandchildren
    for _ in 0..4 {
        tree.update(viewpoint, &mut loader);
        assert_split_invariants(&tree);
    }

    assert!(tree.chunk(tree.root()).has_resident_data());
    assert!(tree.chunk(tree.root()).split);
    let nw = children_of(&tree, tree.root())[0];
    assert!(tree.chunk(nw).split);
    assert_eq!(tree.stats().pending_loads, 0);
    assert!(tree.budget().geometry_used() > 0);
}

#[test]
fn test_invariants_hold_while_viewpoint_moves() {
    let grid = grid(4);
    let bytes = stepped_bytes(&grid);
    let mut tree = open(&bytes);
    tree.set_camera_parameters(256.0, 90.0);
    let mut loader = BlockingLoader::new(ChunkFile::new(Cursor::new(bytes)));

    let path = [
        Vec3::new(-60.0, 30.0, -60.0),
        Vec3::new(-20.0, 30.0, 10.0),
        Vec3::new(50.0, 30.0, 50.0),
        Vec3::new(500.0, 30.0, 500.0),
        Vec3::new(0.0, 30.0, 0.0),
    ];
    for viewpoint in path {
        for _ in 0..3 {
            tree.update(viewpoint, &mut loader);
            assert_split_invariants(&tree);
        }
    }
}

#[test]
fn test_neighbor_level_difference_is_bounded() {
    let mut tree = open(&flat_bytes(&grid(5)));
    make_resident(&mut tree, |_| true);
    // distance_lod_max of four base chunks
    tree.set_camera_parameters(64.0, 90.0);
    tree.set_quality(8.0, 1.0);
    let mut loader = RecordingLoader::default();

    for viewpoint in [
        Vec3::new(-120.0, 2.0, -120.0),
        Vec3::new(0.0, 2.0, 0.0),
        Vec3::new(90.0, 40.0, -30.0),
    ] {
        tree.update(viewpoint, &mut loader);
        assert_split_invariants(&tree);

        let leaves = rendered_leaves(&tree);
        let levels: HashSet<u8> = leaves.iter().map(|&id| tree.chunk(id).level).collect();
        assert!(levels.len() > 1, "expected mixed levels, got {:?}", levels);

        for &a in &leaves {
            for &b in &leaves {
                let (ba, bb) = (tree.chunk(a).bounds, tree.chunk(b).bounds);
                let x_touch = ba.max.x == bb.min.x || bb.max.x == ba.min.x;
                let z_touch = ba.max.z == bb.min.z || bb.max.z == ba.min.z;
                let x_overlap = ba.min.x < bb.max.x && bb.min.x < ba.max.x;
                let z_overlap = ba.min.z < bb.max.z && bb.min.z < ba.max.z;
                if (x_touch && z_overlap) || (z_touch && x_overlap) {
                    let diff = tree.chunk(a).level.abs_diff(tree.chunk(b).level) as u32;
                    assert!(diff <= MAX_ALLOWED_NEIGHBOR_DIFFERENCE);
                }
            }
        }
    }
}

#[test]
fn test_do_split_is_idempotent() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let viewpoint = Vec3::new(-16.0, 0.0, -16.0);
    let child = children_of(&tree, tree.root())[2];

    let snapshot = |tree: &ChunkLodTree| -> Vec<(bool, Lod)> {
        tree.chunks().map(|(_, c)| (c.split, c.lod)).collect()
    };

    tree.do_split(child, viewpoint);
    let once = snapshot(&tree);
    tree.do_split(child, viewpoint);
    assert_eq!(snapshot(&tree), once);

    // Splitting a child forces its parent to split first
    assert!(tree.chunk(tree.root()).split);
    assert!(tree.chunk(child).split);
    for grandchild in children_of(&tree, child) {
        assert_eq!(tree.chunk(grandchild).lod.level(), 2);
    }
}

#[test]
fn test_can_split_leaf_is_false() {
    let mut tree = open(&stepped_bytes(&grid(2)));
    let mut loader = RecordingLoader::default();
    let leaf = children_of(&tree, tree.root())[1];
    assert!(!tree.can_split(leaf, &mut loader));
    assert_eq!(loader.request_count(), 0);
}

#[test]
fn test_geometry_released_under_pressure() {
    let bytes = stepped_bytes(&grid(3));
    let mut tree = open(&bytes);
    let mut loader = BlockingLoader::new(ChunkFile::new(Cursor::new(bytes)));

    for _ in 0..4 {
        tree.update(Vec3::ZERO, &mut loader);
    }
    assert_eq!(tree.stats().resident_chunks, 21);

    // Without pressure, moving away keeps everything cached
    tree.update(far_away(), &mut loader);
    assert_eq!(tree.stats().resident_chunks, 21);

    tree.set_budget(ResidencyBudget::from_bytes(1, 1));
    tree.update(far_away(), &mut loader);
    assert!(!tree.chunk(tree.root()).split);
    assert_eq!(tree.stats().resident_chunks, 1);
    assert!(tree.chunk(tree.root()).has_resident_data());
    assert_eq!(tree.budget().geometry_used(), tree.chunk(tree.root()).data.as_ref().unwrap().byte_size());
}

#[test]
fn test_warm_up_releases_grandchildren() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();

    // Root morphs towards level 1 without splitting: priority >= 0.5
    let dlm = tree.distance_lod_max();
    let viewpoint = Vec3::new(32.0 + dlm * 4.5, 0.0, 0.0);
    let desired = tree.compute_lod(&tree.bounding_box(), viewpoint);
    assert!((0x80..0x100).contains(&desired));
    tree.update(viewpoint, &mut loader);

    let root = tree.chunk(tree.root());
    assert!(!root.split);
    assert_eq!(root.lod, Lod(desired));
    // All 16 grandchildren released, children kept
    assert_eq!(loader.unloads.len(), 16);
    assert_eq!(tree.stats().resident_chunks, 5);
}

// --- Streaming results ---

#[test]
fn test_failed_root_load_is_retried_with_backoff() {
    let mut tree = open(&stepped_bytes(&grid(2)));
    let mut loader = RecordingLoader::default();
    let root = tree.root();
    let root_loads = |loader: &RecordingLoader| loader.loads.iter().filter(|r| r.id == root).count();

    tree.update(far_away(), &mut loader);
    assert_eq!(root_loads(&loader), 1);

    // First failure: no new request until the base delay has passed
    loader.completed.push(Delivery::Failed {
        chunk: root,
        kind: PayloadKind::Geometry,
        reason: "read timed out".into(),
    });
    for _ in 0..RETRY_BASE_FRAMES {
        tree.update(far_away(), &mut loader);
        assert!(!tree.chunk(root).is_load_pending());
        assert_eq!(root_loads(&loader), 1);
    }
    tree.update(far_away(), &mut loader);
    assert_eq!(root_loads(&loader), 2);
    assert!(tree.chunk(root).is_load_pending());
    assert_eq!(tree.chunk(root).load_failures(), 1);

    // Second failure waits twice as long
    loader.completed.push(Delivery::Failed {
        chunk: root,
        kind: PayloadKind::Geometry,
        reason: "read timed out".into(),
    });
    for _ in 0..2 * RETRY_BASE_FRAMES {
        tree.update(far_away(), &mut loader);
    }
    assert_eq!(root_loads(&loader), 2);
    tree.update(far_away(), &mut loader);
    assert_eq!(root_loads(&loader), 3);

    // Success clears the failure count
    loader.completed.push(Delivery::Data(root, Box::new(flat_quad(0))));
    tree.update(far_away(), &mut loader);
    assert!(tree.chunk(root).has_resident_data());
    assert_eq!(tree.chunk(root).load_failures(), 0);
}

#[test]
fn test_failed_child_keeps_parent_coarse_until_retry() {
    let mut tree = open(&stepped_bytes(&grid(2)));
    make_resident(&mut tree, |c| c.level == 0);
    let mut loader = RecordingLoader::default();

    tree.update(Vec3::ZERO, &mut loader);
    assert_eq!(loader.loads.len(), 4);
    let failed = loader.loads[0].id;
    for request in loader.loads.clone() {
        let delivery = if request.id == failed {
            Delivery::Failed {
                chunk: failed,
                kind: PayloadKind::Geometry,
                reason: "disk on fire".into(),
            }
        } else {
            let mut data = flat_quad(level_height(1));
            data.label = request.label;
            Delivery::Data(request.id, Box::new(data))
        };
        loader.completed.push(delivery);
    }

    tree.update(Vec3::ZERO, &mut loader);
    assert!(!tree.chunk(failed).is_load_pending());
    assert!(!tree.chunk(failed).has_resident_data());
    assert!(!tree.chunk(tree.root()).split);
    assert_eq!(loader.loads.len(), 4);

    for _ in 0..RETRY_BASE_FRAMES {
        tree.update(Vec3::ZERO, &mut loader);
    }
    assert_eq!(loader.loads.len(), 5);
    assert_eq!(loader.loads[4].id, failed);
}

#[test]
fn test_failure_for_unrequested_load_is_ignored() {
    let mut tree = open(&stepped_bytes(&grid(2)));
    make_resident(&mut tree, |c| c.level == 0);
    let mut loader = RecordingLoader::default();
    let child = children_of(&tree, tree.root())[1];

    loader.completed.push(Delivery::Failed {
        chunk: child,
        kind: PayloadKind::Geometry,
        reason: "cancelled".into(),
    });
    tree.update(far_away(), &mut loader);
    assert_eq!(tree.chunk(child).load_failures(), 0);
}

#[test]
fn test_late_delivery_after_unload_is_discarded() {
    let mut tree = open(&stepped_bytes(&grid(2)));
    let mut loader = RecordingLoader::default();
    let child = children_of(&tree, tree.root())[0];

    tree.request_load(child, 1.0, &mut loader);
    assert!(tree.chunk(child).is_load_pending());
    tree.request_unload_subtree(child, &mut loader);
    assert_eq!(loader.unloads, vec![child]);

    loader.completed.push(Delivery::Data(child, Box::new(flat_quad(0))));
    tree.update(far_away(), &mut loader);

    assert!(!tree.chunk(child).has_resident_data());
    assert_eq!(tree.budget().geometry_used(), 0);
}

#[test]
fn test_delivery_for_unknown_chunk_is_ignored() {
    let mut tree = open(&stepped_bytes(&grid(2)));
    let mut loader = RecordingLoader::default();
    loader.completed.push(Delivery::Data(ChunkId(99), Box::new(flat_quad(0))));
    tree.update(far_away(), &mut loader);
    assert_eq!(tree.stats().resident_chunks, 0);
}

// --- Textures ---

#[test]
fn test_texture_lod_loads_and_releases() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    tree.set_texture_source(&TestTextures);
    assert!(tree.texture_distance_lod_max() > 0.0);
    let mut loader = RecordingLoader::default();

    tree.update(Vec3::ZERO, &mut loader);
    assert_eq!(loader.texture_loads, vec![tree.root()]);

    // Same request is not repeated while pending
    tree.update(Vec3::ZERO, &mut loader);
    assert_eq!(loader.texture_loads.len(), 1);

    let texture = Arc::new(ChunkTexture::new(TestTextures.load_tile(0, 0, 0).unwrap()));
    loader.completed.push(Delivery::Texture(tree.root(), texture.clone()));
    tree.update(Vec3::ZERO, &mut loader);
    assert!(tree.chunk(tree.root()).has_texture());
    // Level 1 is the finest texture level; level 2 inherits
    assert_eq!(loader.texture_loads.len(), 5);
    assert!(loader.texture_loads.iter().all(|&id| tree.chunk(id).level <= 1));

    for &child in &children_of(&tree, tree.root()) {
        loader.completed.push(Delivery::Texture(child, texture.clone()));
    }
    tree.update(Vec3::ZERO, &mut loader);
    assert_eq!(tree.stats().resident_textures, 5);
    assert_eq!(tree.budget().texture_used(), 5 * texture.byte_size());

    tree.update(far_away(), &mut loader);
    assert_eq!(tree.stats().resident_textures, 0);
    // Children released before the root
    assert_eq!(loader.texture_unloads.len(), 5);
    assert_eq!(*loader.texture_unloads.last().unwrap(), tree.root());
    assert_eq!(tree.budget().texture_used(), 0);
}

#[test]
fn test_no_texture_requests_without_source() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();
    tree.update(Vec3::ZERO, &mut loader);
    assert!(loader.texture_loads.is_empty());
}

// --- Origin ---

#[test]
fn test_origin_steps_at_lattice_boundary() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    tree.set_lattice_width(1000.0);

    assert!(!tree.set_camera_position(999.0, 0.0));
    assert_eq!(tree.local_origin(), DVec2::ZERO);
    let before: Vec<_> = tree.chunks().map(|(_, c)| c.bounds).collect();

    assert!(tree.set_camera_position(1001.0, 0.0));
    assert_eq!(tree.local_origin(), DVec2::new(1000.0, 0.0));

    for ((_, chunk), old) in tree.chunks().zip(&before) {
        assert_eq!(chunk.bounds.min.x, old.min.x - 1000.0);
        assert_eq!(chunk.bounds.max.x, old.max.x - 1000.0);
        assert_eq!(chunk.bounds.min.z, old.min.z);
        assert_eq!(chunk.bounds.max.y, old.max.y);
    }

    // Moving within the cell changes nothing
    assert!(!tree.set_camera_position(1500.0, 999.0));
}

#[test]
fn test_update_origin_round_trip_is_exact() {
    let mut tree = open(&stepped_bytes(&grid(4)));
    tree.set_lattice_width(37.3);
    tree.set_camera_position(-1234.5, 987.6);

    tree.update_origin();
    let first = bounds_bits(&tree);
    tree.update_origin();
    assert_eq!(bounds_bits(&tree), first);

    // Going away and coming back lands on the same boxes
    tree.set_camera_position(50_000.0, 50_000.0);
    tree.set_camera_position(-1234.5, 987.6);
    assert_eq!(bounds_bits(&tree), first);
}

#[test]
fn test_world_local_conversion() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    tree.set_camera_position(2500.0, -10.0);
    assert_eq!(tree.local_origin(), DVec2::new(2000.0, -1000.0));

    let world = DVec3::new(2010.5, 3.0, -990.25);
    let local = tree.world_to_local(world);
    assert_eq!(local, Vec3::new(10.5, 3.0, 9.75));
    assert_eq!(tree.local_to_world(local), world);
}

// --- Queries and rendering ---

#[test]
fn test_find_elevation_uses_deepest_leaf() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();

    // Coarse: the root answers
    tree.update(far_away(), &mut loader);
    assert_eq!(tree.find_elevation(-20.0, 12.0), Some(0.0));

    tree.update(Vec3::new(-20.0, 0.0, 12.0), &mut loader);
    let child = children_of(&tree, tree.root())[2];
    assert!(tree.chunk(child).split);
    assert_eq!(tree.find_elevation(-20.0, 12.0), Some(20.0));

    // Outside the terrain
    assert_eq!(tree.find_elevation(100.0, 0.0), None);
}

#[test]
fn test_find_elevation_world_follows_origin() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();
    tree.update(far_away(), &mut loader);

    tree.set_camera_position(1200.0, 0.0);
    assert_eq!(tree.find_elevation_world(10.0, 10.0), Some(0.0));
    assert_eq!(tree.find_elevation(10.0, 10.0), None);
}

#[test]
fn test_intersect_hits_rendered_surface() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();
    tree.update(Vec3::new(5.0, 0.0, 5.0), &mut loader);

    let ray = Ray::new(Vec3::new(5.5, 100.0, 5.5), Vec3::NEG_Y);
    let hit = tree.intersect(&ray, true).unwrap();
    assert!((hit.point.y - 20.0).abs() < 1e-4);
    assert!((hit.t - 80.0).abs() < 1e-4);
    assert_eq!(tree.chunk(hit.chunk).level, 2);

    let first = tree.intersect(&ray, false).unwrap();
    assert_eq!(first.chunk, hit.chunk);

    let miss = Ray::new(Vec3::new(500.0, 100.0, 0.5), Vec3::NEG_Y);
    assert!(tree.intersect(&miss, true).is_none());
}

#[test]
fn test_render_draws_current_cut() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();
    let caps = RenderCapabilities::default();
    let state = RenderState { capabilities: &caps, options: RenderOptions::default() };

    tree.update(far_away(), &mut loader);
    let mut renderer = CountingRenderer::default();
    assert_eq!(tree.render(&mut renderer, &state), 2);
    assert_eq!(renderer.draws.len(), 1);
    assert_eq!(renderer.draws[0].0, tree.root());

    tree.update(Vec3::new(0.0, 1.0, 0.0), &mut loader);
    let mut renderer = CountingRenderer::default();
    let triangles = tree.render(&mut renderer, &state);
    assert_eq!(renderer.draws.len(), 16);
    assert_eq!(triangles, 32);
    assert_eq!(tree.stats().rendered_chunks, 16);
    assert!(renderer.draws.iter().all(|&(_, _, cpu)| !cpu));
}

#[test]
fn test_render_cpu_path_premorphs() {
    let mut tree = open(&stepped_bytes(&grid(2)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();
    tree.update(far_away(), &mut loader);

    let caps = RenderCapabilities { vertex_morph_shader: false };
    let options = RenderOptions { morph: true, textures: false };
    let state = RenderState { capabilities: &caps, options };
    let mut renderer = CountingRenderer::default();
    tree.render(&mut renderer, &state);

    assert_eq!(renderer.draws, vec![(tree.root(), 0.0, true)]);
}

#[test]
fn test_render_binds_nearest_texture() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();
    tree.update(Vec3::new(0.0, 1.0, 0.0), &mut loader);

    let texture = Arc::new(ChunkTexture::new(RgbaImage::new(2, 2)));
    let root = tree.root();
    let first_child = children_of(&tree, root)[0];
    tree.chunks[root.index()].texture = Some(texture.clone());
    tree.chunks[first_child.index()].texture = Some(texture);

    let caps = RenderCapabilities::default();
    let state = RenderState { capabilities: &caps, options: RenderOptions::default() };
    let mut renderer = CountingRenderer::default();
    tree.render(&mut renderer, &state);

    // Child texture for its four leaves, root texture for the other twelve
    assert_eq!(renderer.binds.len(), 2);
    assert_eq!(renderer.binds[0], TexGen::covering(&tree.chunk(first_child).bounds));
    assert_eq!(renderer.binds[1], TexGen::covering(&tree.chunk(root).bounds));

    let state = RenderState {
        capabilities: &caps,
        options: RenderOptions { morph: true, textures: false },
    };
    let mut renderer = CountingRenderer::default();
    tree.render(&mut renderer, &state);
    assert!(renderer.binds.is_empty());
}

#[test]
fn test_cull_skips_chunks_outside_frustum() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    make_resident(&mut tree, |_| true);
    let mut loader = RecordingLoader::default();
    tree.update(Vec3::new(0.0, 1.0, 0.0), &mut loader);

    // Looking straight down at x in [-31, -1]
    let proj = Mat4::orthographic_rh(-15.0, 15.0, -40.0, 40.0, 0.1, 500.0);
    let view = Mat4::look_at_rh(Vec3::new(-16.0, 100.0, 0.0), Vec3::new(-16.0, 0.0, 0.0), Vec3::NEG_Z);
    let frustum = Frustum::from_view_projection(&(proj * view));

    // The two +x children, with their subtrees
    assert_eq!(tree.cull(&frustum), 2);

    let caps = RenderCapabilities::default();
    let state = RenderState { capabilities: &caps, options: RenderOptions::default() };
    let mut renderer = CountingRenderer::default();
    tree.render(&mut renderer, &state);
    assert_eq!(renderer.draws.len(), 8);
    assert!(renderer.draws.iter().all(|&(id, _, _)| tree.chunk(id).bounds.max.x <= 0.0));

    // The next update forgets the cull
    tree.update(Vec3::new(0.0, 1.0, 0.0), &mut loader);
    let mut renderer = CountingRenderer::default();
    tree.render(&mut renderer, &state);
    assert_eq!(renderer.draws.len(), 16);
}

#[test]
fn test_config_applies_to_tree() {
    let mut tree = open(&stepped_bytes(&grid(3)));
    let config = crate::core::TerrainConfig {
        max_pixel_error: 2.0,
        lattice_width: 10.0,
        ..Default::default()
    };
    let before = tree.distance_lod_max();
    config.apply_to(&mut tree);
    assert!((tree.distance_lod_max() - before * 2.5).abs() < 1e-2);
    assert_eq!(tree.lattice_width(), 10.0);
}
