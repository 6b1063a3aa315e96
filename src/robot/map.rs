//! Static occupancy map of the course.
//!
//! The grid is row-major with row 0 at the bottom edge and column 0 at the
//! left edge; `scale` is length units per cell. Maps load from `0/1` CSV
//! (legacy format, file top = map top) or from a stable JSON schema
//! `{scale, cells}` where `cells[0]` is the bottom row.

use crate::utility::{Point, Pose};
use failure::Fail;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::Path;

/// What occupies a cell. `Wall` is the only descriptor the localizer cares
/// about; the richer vocabulary exists for the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellDesc {
    DrivingSurface,
    Edge,
    WhiteLine,
    Start,
    Air,
    Sea,
    Land,
    Storage,
    Wall,
}

impl Default for CellDesc {
    fn default() -> CellDesc {
        CellDesc::DrivingSurface
    }
}

/// Platform level of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Ground,
    LowerPlatform,
    UpperPlatform,
    Ramp,
}

impl Default for Level {
    fn default() -> Level {
        Level::Ground
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub desc: CellDesc,
}

impl Cell {
    pub fn new(level: Level, desc: CellDesc) -> Cell {
        Cell { level, desc }
    }

    pub fn wall() -> Cell {
        Cell {
            level: Level::Ground,
            desc: CellDesc::Wall,
        }
    }

    pub fn is_wall(self) -> bool {
        self.desc == CellDesc::Wall
    }
}

#[derive(Debug, Fail)]
pub enum MapError {
    #[fail(display = "map i/o failed: {}", _0)]
    Io(#[cause] io::Error),
    #[fail(display = "map grid is empty")]
    Empty,
    #[fail(display = "map grid is ragged: row {} has {} cells, expected {}", row, got, expected)]
    Ragged {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[fail(display = "bad cell value {:?} in row {}", token, row)]
    BadCell { token: String, row: usize },
    #[fail(display = "map scale must be positive, got {}", _0)]
    BadScale(f64),
    #[fail(display = "malformed map json: {}", _0)]
    Json(#[cause] serde_json::Error),
}

impl From<io::Error> for MapError {
    fn from(err: io::Error) -> MapError {
        MapError::Io(err)
    }
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> MapError {
        MapError::Json(err)
    }
}

/// On-disk JSON schema. Replaces the legacy pickled object graph with a
/// layout any tool can read back.
#[derive(Serialize, Deserialize)]
struct MapFile {
    scale: f64,
    cells: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone)]
pub struct Map {
    cells: Vec<Cell>,
    cols: usize,
    rows: usize,
    scale: f64,
}

impl Map {
    /// Builds a map from a row-major grid, row 0 at the bottom.
    pub fn from_grid(cells: Vec<Cell>, cols: usize, scale: f64) -> Result<Map, MapError> {
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(MapError::BadScale(scale));
        }
        if cols == 0 || cells.is_empty() {
            return Err(MapError::Empty);
        }
        if cells.len() % cols != 0 {
            return Err(MapError::Ragged {
                row: cells.len() / cols,
                got: cells.len() % cols,
                expected: cols,
            });
        }
        let rows = cells.len() / cols;
        Ok(Map {
            cells,
            cols,
            rows,
            scale,
        })
    }

    /// Loads a `0/1` CSV where the first file row is the top of the map;
    /// rows are reversed so that row 0 ends up at the bottom edge.
    pub fn from_csv<R: BufRead>(reader: R, scale: f64) -> Result<Map, MapError> {
        let mut grid: Vec<Vec<Cell>> = Vec::new();
        for (row, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cells = line
                .split(',')
                .map(|token| match token.trim() {
                    "0" => Ok(Cell::default()),
                    "1" => Ok(Cell::wall()),
                    other => Err(MapError::BadCell {
                        token: other.to_string(),
                        row,
                    }),
                })
                .collect::<Result<Vec<Cell>, MapError>>()?;
            grid.push(cells);
        }
        grid.reverse();
        Map::from_rows(grid, scale)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P, scale: f64) -> Result<Map, MapError> {
        Map::from_csv(BufReader::new(File::open(path)?), scale)
    }

    pub fn from_json_path<P: AsRef<Path>>(path: P) -> Result<Map, MapError> {
        let file: MapFile = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Map::from_rows(file.cells, file.scale)
    }

    pub fn to_json_path<P: AsRef<Path>>(&self, path: P) -> Result<(), MapError> {
        let file = MapFile {
            scale: self.scale,
            cells: self
                .cells
                .chunks(self.cols)
                .map(|row| row.to_vec())
                .collect(),
        };
        serde_json::to_writer(BufWriter::new(File::create(path)?), &file)?;
        Ok(())
    }

    fn from_rows(grid: Vec<Vec<Cell>>, scale: f64) -> Result<Map, MapError> {
        let cols = grid.first().map(|row| row.len()).unwrap_or(0);
        for (row, cells) in grid.iter().enumerate() {
            if cells.len() != cols {
                return Err(MapError::Ragged {
                    row,
                    got: cells.len(),
                    expected: cols,
                });
            }
        }
        Map::from_grid(grid.into_iter().flatten().collect(), cols, scale)
    }

    /// Grid dimensions in cells: `(cols, rows)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Map dimensions in length units: `(width, height)`.
    pub fn size(&self) -> (f64, f64) {
        (self.width(), self.height())
    }

    pub fn width(&self) -> f64 {
        self.cols as f64 * self.scale
    }

    pub fn height(&self) -> f64 {
        self.rows as f64 * self.scale
    }

    /// Length units per cell.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The sentinel "no echo" reading: the map diagonal.
    pub fn diagonal(&self) -> f64 {
        self.width().hypot(self.height())
    }

    pub fn cell(&self, cx: usize, cy: usize) -> Option<Cell> {
        if cx < self.cols && cy < self.rows {
            Some(self.cells[cy * self.cols + cx])
        } else {
            None
        }
    }

    pub fn is_wall(&self, cx: usize, cy: usize) -> bool {
        self.cell(cx, cy).map(Cell::is_wall).unwrap_or(false)
    }

    /// Clamps a point into the map's bounding box.
    pub fn clamp(&self, point: Point) -> Point {
        point.clamped(
            Point { x: 0.0, y: 0.0 },
            Point {
                x: self.width(),
                y: self.height(),
            },
        )
    }

    /// Center of a cell, in length units.
    fn cell_center(&self, cx: isize, cy: isize) -> Point {
        Point {
            x: (cx as f64 + 0.5) * self.scale,
            y: (cy as f64 + 0.5) * self.scale,
        }
    }

    fn in_grid(&self, cx: isize, cy: isize) -> bool {
        cx >= 0 && cy >= 0 && (cx as usize) < self.cols && (cy as usize) < self.rows
    }

    fn wall_at(&self, cx: isize, cy: isize) -> bool {
        self.in_grid(cx, cy) && self.is_wall(cx as usize, cy as usize)
    }

    /// Traces a ray from `from` along its heading, one cell at a time, and
    /// returns the center of the first wall cell within `max_range`, or
    /// `None` if the ray leaves the grid or exceeds the range first. A ray
    /// starting outside the grid sees nothing; a ray starting inside a wall
    /// cell hits immediately. Ties at cell corners step in x first.
    pub fn raycast(&self, from: Pose, max_range: f64) -> Option<Point> {
        // Work in cell units; direction angles are scale-invariant.
        let gx = from.position.x / self.scale;
        let gy = from.position.y / self.scale;
        let mut cx = gx.floor() as isize;
        let mut cy = gy.floor() as isize;
        if !self.in_grid(cx, cy) {
            return None;
        }
        if self.wall_at(cx, cy) {
            return Some(self.cell_center(cx, cy));
        }

        let (dy, dx) = from.angle.sin_cos();
        let step_x: isize = if dx >= 0.0 { 1 } else { -1 };
        let step_y: isize = if dy >= 0.0 { 1 } else { -1 };
        let t_delta_x = if dx != 0.0 { (1.0 / dx).abs() } else { f64::INFINITY };
        let t_delta_y = if dy != 0.0 { (1.0 / dy).abs() } else { f64::INFINITY };
        let mut t_max_x = if dx != 0.0 {
            let next = if dx > 0.0 { cx as f64 + 1.0 } else { cx as f64 };
            ((next - gx) / dx).abs()
        } else {
            f64::INFINITY
        };
        let mut t_max_y = if dy != 0.0 {
            let next = if dy > 0.0 { cy as f64 + 1.0 } else { cy as f64 };
            ((next - gy) / dy).abs()
        } else {
            f64::INFINITY
        };

        loop {
            let t = if t_max_x <= t_max_y {
                cx += step_x;
                let t = t_max_x;
                t_max_x += t_delta_x;
                t
            } else {
                cy += step_y;
                let t = t_max_y;
                t_max_y += t_delta_y;
                t
            };
            if t * self.scale > max_range {
                return None;
            }
            if !self.in_grid(cx, cy) {
                return None;
            }
            if self.wall_at(cx, cy) {
                return Some(self.cell_center(cx, cy));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
    use std::io::Cursor;

    fn open_map(cols: usize, rows: usize) -> Map {
        Map::from_grid(vec![Cell::default(); cols * rows], cols, 1.0).unwrap()
    }

    fn map_with_walls(cols: usize, rows: usize, walls: &[(usize, usize)]) -> Map {
        let mut cells = vec![Cell::default(); cols * rows];
        for &(x, y) in walls {
            cells[y * cols + x] = Cell::wall();
        }
        Map::from_grid(cells, cols, 1.0).unwrap()
    }

    #[test]
    fn dims_and_size_respect_scale() {
        let map = Map::from_grid(vec![Cell::default(); 12], 4, 2.0).unwrap();
        assert_eq!(map.dims(), (4, 3));
        assert_eq!(map.size(), (8.0, 6.0));
        assert!((map.diagonal() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn raycast_across_an_open_map_returns_none() {
        let map = open_map(5, 5);
        assert!(map.raycast(Pose::new(0.5, 0.5, FRAC_PI_4), f64::INFINITY).is_none());
        assert!((map.diagonal() - 50f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn raycast_from_outside_returns_none() {
        let map = map_with_walls(5, 5, &[(2, 2)]);
        assert!(map.raycast(Pose::new(-1.0, 2.5, 0.0), f64::INFINITY).is_none());
        assert!(map.raycast(Pose::new(2.5, 7.0, -FRAC_PI_2), f64::INFINITY).is_none());
    }

    #[test]
    fn raycast_hits_the_first_wall_center() {
        let map = map_with_walls(10, 10, &[(7, 4), (8, 4)]);
        let hit = map.raycast(Pose::new(2.5, 4.5, 0.0), f64::INFINITY).unwrap();
        assert_eq!(hit, Point { x: 7.5, y: 4.5 });
    }

    #[test]
    fn raycast_starting_inside_a_wall_hits_immediately() {
        let map = map_with_walls(5, 5, &[(2, 2)]);
        let hit = map.raycast(Pose::new(2.5, 2.5, 1.0), f64::INFINITY).unwrap();
        assert_eq!(hit, Point { x: 2.5, y: 2.5 });
    }

    #[test]
    fn raycast_corner_tie_steps_x_first() {
        // From (0.5, 0.5) at 45° the ray meets the (1,1) corner exactly;
        // the x-first rule visits (1,0) before (1,1).
        let map = map_with_walls(3, 3, &[(1, 0), (1, 1)]);
        let hit = map.raycast(Pose::new(0.5, 0.5, FRAC_PI_4), f64::INFINITY).unwrap();
        assert_eq!(hit, Point { x: 1.5, y: 0.5 });
    }

    #[test]
    fn raycast_is_monotone_in_max_range() {
        let map = map_with_walls(10, 10, &[(7, 4)]);
        let from = Pose::new(2.5, 4.5, 0.0);
        // The ray enters the wall cell 4.5 units out.
        assert!(map.raycast(from, 4.25).is_none());
        assert!(map.raycast(from, 4.75).is_some());
        assert!(map.raycast(from, f64::INFINITY).is_some());
    }

    #[test]
    fn raycast_heading_down_and_left() {
        let map = map_with_walls(6, 6, &[(1, 1)]);
        let hit = map.raycast(Pose::new(4.5, 4.2, PI + FRAC_PI_4 * 0.96), f64::INFINITY);
        assert!(hit.is_some());
        let map = map_with_walls(6, 6, &[(3, 0)]);
        let hit = map.raycast(Pose::new(3.5, 4.5, 3.0 * FRAC_PI_2), f64::INFINITY).unwrap();
        assert_eq!(hit, Point { x: 3.5, y: 0.5 });
    }

    #[test]
    fn csv_rows_reverse_so_row_zero_is_the_bottom() {
        // File top row is the map top; the wall in the last file row ends
        // up at grid row 0.
        let csv = "0,0\n1,0\n";
        let map = Map::from_csv(Cursor::new(csv), 1.0).unwrap();
        assert!(map.is_wall(0, 0));
        assert!(!map.is_wall(0, 1));
    }

    #[test]
    fn csv_rejects_junk_cells() {
        assert!(Map::from_csv(Cursor::new("0,2\n"), 1.0).is_err());
    }

    #[test]
    fn ragged_grids_are_rejected() {
        let grid = vec![
            vec![Cell::default(), Cell::default()],
            vec![Cell::default()],
        ];
        assert!(Map::from_rows(grid, 1.0).is_err());
    }

    #[test]
    fn json_round_trips() {
        let map = map_with_walls(4, 3, &[(1, 2), (3, 0)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("course.json");
        map.to_json_path(&path).unwrap();
        let loaded = Map::from_json_path(&path).unwrap();
        assert_eq!(loaded.dims(), map.dims());
        assert_eq!(loaded.scale(), map.scale());
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(loaded.is_wall(x, y), map.is_wall(x, y));
            }
        }
    }

    #[test]
    fn bad_scale_is_rejected() {
        assert!(Map::from_grid(vec![Cell::default()], 1, 0.0).is_err());
        assert!(Map::from_grid(vec![Cell::default()], 1, -2.0).is_err());
    }
}
