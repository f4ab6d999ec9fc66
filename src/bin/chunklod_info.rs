//! Inspect a chunk file and, optionally, the cut a viewpoint selects.
//!
//! Usage: cargo run --release --bin chunklod-info -- <FILE> [OPTIONS]
//!
//! Options:
//!   --config <PATH>    Terrain config JSON applied before selecting
//!   --view <X,Y,Z>     Viewpoint in the local frame; streams the tree until
//!                      the cut settles and prints its statistics
//!   --updates <N>      Update limit while settling (default: 32)
//!   --tiles <DIR>      Texture tiles laid out as <DIR>/<level>/<x>_<z>.png
//!   --tile-depth <N>   Texture quadtree depth (default: 1)
//!   --tile-size <N>    Tile edge in texels (default: 256)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;

use chunklod::core::types::Result;
use chunklod::core::{Error, TerrainConfig};
use chunklod::format::ChunkFile;
use chunklod::streaming::{BlockingLoader, TileDirectory};
use chunklod::tree::ChunkLodTree;

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let path = args
        .get(1)
        .filter(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .ok_or_else(|| Error::Config("Usage: chunklod-info <FILE> [--config <PATH>] [--view <X,Y,Z>]".into()))?;
    let config_path = parse_str_arg(&args, "--config").map(PathBuf::from);
    let view = parse_str_arg(&args, "--view").map(|s| parse_vec3(&s)).transpose()?;
    let max_updates = parse_usize_arg(&args, "--updates").unwrap_or(32);
    let tiles = parse_str_arg(&args, "--tiles").map(|dir| {
        Arc::new(TileDirectory::new(
            dir,
            parse_usize_arg(&args, "--tile-depth").unwrap_or(1) as u32,
            parse_usize_arg(&args, "--tile-size").unwrap_or(256) as u32,
        ))
    });

    let mut tree = ChunkLodTree::open(&path)?;
    if let Some(config_path) = &config_path {
        let config = TerrainConfig::load(config_path)?;
        config.apply_to(&mut tree);
        let loader = config.loader_config();
        println!("Config:         {} ({} concurrent loads)", config_path.display(), loader.max_concurrent);
    }
    if let Some(tiles) = &tiles {
        tree.set_texture_source(tiles.as_ref());
    }

    let header = tree.header();
    println!("=== {} ===", path.display());
    println!("Version:        {}", header.version);
    println!("Tree depth:     {}", header.tree_depth);
    println!("Chunks:         {}", header.chunk_count);
    println!("Error (max):    {}", header.error_lod_max);
    println!("Vertical scale: {}", header.vertical_scale);
    println!("Leaf size:      {}", header.base_chunk_dimension);
    println!("Root size:      {}", tree.root_size());

    let bounds = tree.bounding_box();
    println!(
        "Bounds:         ({:.1}, {:.1}, {:.1}) .. ({:.1}, {:.1}, {:.1})",
        bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
    );

    let mut per_level: BTreeMap<u8, (usize, u64)> = BTreeMap::new();
    for (_, chunk) in tree.chunks() {
        let entry = per_level.entry(chunk.level).or_default();
        entry.0 += 1;
        entry.1 += chunk.vertex_count as u64;
    }
    println!();
    println!("Level  Chunks  Vertices");
    for (level, (chunks, vertices)) in &per_level {
        println!("{:>5}  {:>6}  {:>8}", level, chunks, vertices);
    }

    println!();
    println!("LOD distance threshold:     {:.1}", tree.distance_lod_max());
    if tiles.is_some() {
        println!("Texture distance threshold: {:.1}", tree.texture_distance_lod_max());
    }

    let Some(viewpoint) = view else {
        return Ok(());
    };

    let mut loader = BlockingLoader::new(ChunkFile::open(&path)?);
    if let Some(tiles) = tiles {
        loader = loader.with_textures(tiles);
    }
    let start = Instant::now();
    let mut updates = 0;
    let mut last_served = usize::MAX;
    while updates < max_updates && loader.loads_served() != last_served {
        last_served = loader.loads_served();
        tree.update(viewpoint, &mut loader);
        updates += 1;
    }

    let stats = tree.stats();
    println!();
    println!("=== View ({}, {}, {}) ===", viewpoint.x, viewpoint.y, viewpoint.z);
    println!("Updates:          {} in {:.1} ms", updates, start.elapsed().as_secs_f64() * 1000.0);
    println!("Chunk reads:      {}", loader.loads_served());
    println!("Resident chunks:  {}", stats.resident_chunks);
    println!("Split chunks:     {}", stats.split_chunks);
    println!("Resident textures: {}", stats.resident_textures);
    println!("Pending loads:    {}", stats.pending_loads);
    println!(
        "Geometry:         {:.1} KB",
        tree.budget().geometry_used() as f64 / 1024.0
    );

    Ok(())
}

fn parse_vec3(s: &str) -> Result<Vec3> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Config(format!("Bad viewpoint '{}': {}", s, e)))?;
    match parts[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(Error::Config(format!("Viewpoint needs three components, got '{}'", s))),
    }
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
