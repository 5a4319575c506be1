//! Map grid: walkability and line-of-sight over a square cell grid, plus
//! the binary map file loader.
//!
//! The map file interleaves server-relevant cell flags with client-only
//! texture, terrain, zone, and area sections; the loader reads the flags
//! and skips the rest.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use bitflags::bitflags;

/// Isometric cell footprint in world units.
pub const BASE_CELL_WIDTH: f32 = 64.0;
pub const BASE_CELL_HEIGHT: f32 = 32.0;

const NUM_LAYERS: usize = 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellFlags: u8 {
        const UNWALKABLE    = 0x01;
        /// Blocks line of sight.
        const COLLIDE_BLOCK = 0x02;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MapCell {
    pub flags: CellFlags,
}

pub struct Map {
    id: i32,
    name: String,
    width: i32,
    cells: Vec<MapCell>,
}

impl Map {
    /// An in-memory map with every cell walkable; cells are then edited
    /// through [`Map::set_cell_flags`]. Used by tests and tools.
    pub fn empty(id: i32, width: i32) -> Map {
        Map {
            id,
            name: String::new(),
            width,
            cells: vec![MapCell::default(); (width * width).max(0) as usize],
        }
    }

    pub fn load(id: i32, path: impl AsRef<Path>) -> Result<Map> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("could not open map file {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let width = read_i32(&mut reader)?;
        if !(1..=10_000).contains(&width) {
            bail!("invalid map width {width} in {}", path.display());
        }

        let mut map = Map::empty(id, width);
        map.name = name;

        // Cell texture names are client data.
        let num_textures = read_i32(&mut reader)?;
        for _ in 0..num_textures {
            skip_cstring(&mut reader)?;
        }

        let num_cells = read_i32(&mut reader)?;
        for _ in 0..num_cells {
            let cell_id = read_i32(&mut reader)?;
            let flags = read_u8(&mut reader)?;

            if cell_id >= 0 && (cell_id as usize) < map.cells.len() {
                map.cells[cell_id as usize].flags = CellFlags::from_bits_truncate(flags);
            }

            // Per-layer texture payloads are client data.
            for _ in 0..NUM_LAYERS {
                let has_texture = read_u8(&mut reader)? != 0;
                if has_texture {
                    read_i32(&mut reader)?; // texture index
                    read_f32(&mut reader)?; // scale
                }
            }
        }

        // Terrain, zone, and area sections are client data.
        let num_terrain_textures = read_i32(&mut reader)?;
        if num_terrain_textures > 0 {
            for _ in 0..num_terrain_textures {
                skip_cstring(&mut reader)?;
            }
            let num_terrains = read_i32(&mut reader)?;
            for _ in 0..num_terrains {
                read_i32(&mut reader)?;
                read_i32(&mut reader)?;
            }
        }
        let num_zones = read_i32(&mut reader)?;
        for _ in 0..num_zones {
            read_i32(&mut reader)?;
            read_i32(&mut reader)?;
        }
        let num_areas = read_i32(&mut reader)?;
        for _ in 0..num_areas {
            read_i32(&mut reader)?;
            read_i32(&mut reader)?;
        }

        log::info!(
            "Map: loaded '{}' ({}x{}, {} cells with flags)",
            map.name,
            width,
            width,
            num_cells
        );

        Ok(map)
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn set_cell_flags(&mut self, cell_id: i32, flags: CellFlags) {
        if cell_id >= 0 && (cell_id as usize) < self.cells.len() {
            self.cells[cell_id as usize].flags = flags;
        }
    }

    pub fn cell(&self, cell_id: i32) -> Option<&MapCell> {
        if cell_id < 0 {
            return None;
        }
        self.cells.get(cell_id as usize)
    }

    /// Out of bounds is not walkable.
    pub fn is_walkable(&self, cell_id: i32) -> bool {
        match self.cell(cell_id) {
            Some(cell) => !cell.flags.contains(CellFlags::UNWALKABLE),
            None => false,
        }
    }

    /// Out of bounds blocks line of sight.
    pub fn blocks_line_of_sight(&self, cell_id: i32) -> bool {
        match self.cell(cell_id) {
            Some(cell) => cell.flags.contains(CellFlags::COLLIDE_BLOCK),
            None => true,
        }
    }

    pub fn cell_id_from_coords(&self, x: i32, y: i32) -> i32 {
        if x < 0 || x >= self.width || y < 0 || y >= self.width {
            return -1;
        }
        y * self.width + x
    }

    pub fn coords_from_cell_id(&self, cell_id: i32) -> Option<(i32, i32)> {
        if cell_id < 0 || cell_id >= self.width * self.width {
            return None;
        }
        Some((cell_id % self.width, cell_id / self.width))
    }

    pub fn cell_id_from_world_pos(&self, world_x: f32, world_y: f32) -> i32 {
        let cell_x = (world_x / BASE_CELL_WIDTH).floor() as i32;
        let cell_y = (world_y / BASE_CELL_HEIGHT).floor() as i32;
        self.cell_id_from_coords(cell_x, cell_y)
    }

    pub fn is_walkable_world(&self, world_x: f32, world_y: f32) -> bool {
        self.is_walkable(self.cell_id_from_world_pos(world_x, world_y))
    }

    /// Sample the segment between two world positions cell by cell; any
    /// sight-blocking cell on the way breaks the line.
    pub fn in_line_of_sight(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        let dx = x2 - x1;
        let dy = y2 - y1;
        let distance = (dx * dx + dy * dy).sqrt();
        let step = BASE_CELL_HEIGHT / 2.0;
        let steps = (distance / step).ceil() as i32;

        for i in 0..=steps {
            let t = if steps == 0 { 0.0 } else { i as f32 / steps as f32 };
            let cell_id = self.cell_id_from_world_pos(x1 + dx * t, y1 + dy * t);
            if self.blocks_line_of_sight(cell_id) {
                return false;
            }
        }
        true
    }
}

fn read_u8(reader: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i32(reader: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32(reader: &mut impl Read) -> Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn skip_cstring(reader: &mut impl Read) -> Result<()> {
    loop {
        if read_u8(reader)? == 0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cell_id_round_trips() {
        let map = Map::empty(1, 16);
        let id = map.cell_id_from_coords(3, 5);
        assert_eq!(id, 5 * 16 + 3);
        assert_eq!(map.coords_from_cell_id(id), Some((3, 5)));
    }

    #[test]
    fn out_of_bounds_is_hostile() {
        let map = Map::empty(1, 16);
        assert_eq!(map.cell_id_from_coords(-1, 0), -1);
        assert_eq!(map.cell_id_from_coords(16, 0), -1);
        assert!(!map.is_walkable(-1));
        assert!(map.blocks_line_of_sight(-1));
        assert!(!map.is_walkable(16 * 16));
    }

    #[test]
    fn world_position_maps_to_cell() {
        let map = Map::empty(1, 16);
        // (100, 100) world -> cell (1, 3).
        assert_eq!(map.cell_id_from_world_pos(100.0, 100.0), 3 * 16 + 1);
    }

    #[test]
    fn flags_gate_walkability_and_los() {
        let mut map = Map::empty(1, 16);
        let id = map.cell_id_from_coords(2, 2);
        map.set_cell_flags(id, CellFlags::UNWALKABLE | CellFlags::COLLIDE_BLOCK);

        assert!(!map.is_walkable(id));
        assert!(map.blocks_line_of_sight(id));
        assert!(map.is_walkable(map.cell_id_from_coords(3, 3)));
    }

    #[test]
    fn line_of_sight_breaks_on_blocking_cell() {
        let mut map = Map::empty(1, 16);
        // Wall across column x=5.
        for y in 0..16 {
            map.set_cell_flags(map.cell_id_from_coords(5, y), CellFlags::COLLIDE_BLOCK);
        }

        let y = BASE_CELL_HEIGHT * 2.5;
        assert!(map.in_line_of_sight(BASE_CELL_WIDTH * 1.5, y, BASE_CELL_WIDTH * 3.5, y));
        assert!(!map.in_line_of_sight(BASE_CELL_WIDTH * 1.5, y, BASE_CELL_WIDTH * 8.5, y));
    }

    #[test]
    fn loads_binary_map_file() {
        let dir = std::env::temp_dir().join("duskmere-map-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("unit.map");

        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(&4i32.to_le_bytes()); // width
        bytes.extend_from_slice(&1i32.to_le_bytes()); // texture count
        bytes.extend_from_slice(b"grass\0");
        bytes.extend_from_slice(&2i32.to_le_bytes()); // cells with data
        for (cell_id, flags) in [(5i32, 0x01u8), (6, 0x02)] {
            bytes.extend_from_slice(&cell_id.to_le_bytes());
            bytes.push(flags);
            // Layer 0 carries a texture, layers 1-3 are empty.
            bytes.push(1);
            bytes.extend_from_slice(&0i32.to_le_bytes());
            bytes.extend_from_slice(&1.0f32.to_le_bytes());
            bytes.extend_from_slice(&[0, 0, 0]);
        }
        bytes.extend_from_slice(&0i32.to_le_bytes()); // terrain textures
        bytes.extend_from_slice(&0i32.to_le_bytes()); // zones
        bytes.extend_from_slice(&0i32.to_le_bytes()); // areas
        File::create(&path).unwrap().write_all(&bytes).unwrap();

        let map = Map::load(9, &path).unwrap();
        assert_eq!(map.id(), 9);
        assert_eq!(map.name(), "unit");
        assert_eq!(map.width(), 4);
        assert!(!map.is_walkable(5));
        assert!(map.is_walkable(6));
        assert!(map.blocks_line_of_sight(6));

        std::fs::remove_file(&path).ok();
    }
}
