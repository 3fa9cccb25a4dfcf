use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::Point;

/// Represents errors that can occur while building a [`GridMap`] from text.
#[derive(Debug, thiserror::Error)]
pub enum MapFormatError {
    #[error("Unknown map symbol '{symbol}' at position ({x}, {y})")]
    UnknownSymbol { symbol: char, x: usize, y: usize },
    #[error("Map source is empty")]
    Empty,
    #[error("Duplicate {kind} tile at position ({x}, {y})")]
    DuplicateSpawn { kind: TileKind, x: usize, y: usize },
    #[error("Failed to read map file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Lookups take a [`Point`] and answer `None` for anything outside the grid,
/// including negative coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled by a generator function.
    ///
    /// The generator function `f` takes `(x, y)` coordinates and returns the value for that cell.
    pub fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Grid {
            width,
            height,
            cells,
        }
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Converts a point to a flat vector index.
    ///
    /// Returns `None` if the point is out of bounds.
    #[inline]
    pub fn point_to_index(&self, point: Point) -> Option<usize> {
        let x = usize::try_from(point.x).ok()?;
        let y = usize::try_from(point.y).ok()?;
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    /// Gets an immutable reference to the cell at the given point.
    ///
    /// Returns `None` if the point is out of bounds.
    pub fn get(&self, point: Point) -> Option<&T> {
        self.cells.get(self.point_to_index(point)?)
    }

    /// Returns an iterator that yields `(Point, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Point, &T)> {
        let width = self.width;
        self.cells.iter().enumerate().map(move |(index, cell)| {
            let point = Point::new((index % width) as i32, (index / width) as i32);
            (point, cell)
        })
    }
}

/// The static kind of a map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Floor,
    Wall,
    AgentSpawn,
    Extraction,
    PackageSpawn,
}

impl TileKind {
    pub const ALL: [TileKind; 5] = [
        TileKind::Floor,
        TileKind::Wall,
        TileKind::AgentSpawn,
        TileKind::Extraction,
        TileKind::PackageSpawn,
    ];

    /// Map file symbol (upper case).
    pub const fn symbol(self) -> char {
        match self {
            TileKind::Floor => '.',
            TileKind::Wall => '#',
            TileKind::AgentSpawn => 'I',
            TileKind::Extraction => 'E',
            TileKind::PackageSpawn => 'P',
        }
    }

    /// Only walls block movement.
    pub const fn is_walkable(self) -> bool {
        !matches!(self, TileKind::Wall)
    }

    pub const fn description(self) -> &'static str {
        match self {
            TileKind::Floor => "floor",
            TileKind::Wall => "wall",
            TileKind::AgentSpawn => "agent spawn",
            TileKind::Extraction => "extraction zone",
            TileKind::PackageSpawn => "package spawn",
        }
    }

    /// Looks up a tile by its symbol, ignoring case.
    pub fn from_symbol(symbol: char) -> Option<TileKind> {
        let symbol = symbol.to_ascii_uppercase();
        TileKind::ALL.into_iter().find(|kind| kind.symbol() == symbol)
    }
}

impl std::fmt::Display for TileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Immutable static layout of a map.
///
/// Cells beyond the end of a short row are absent (`None`) and, like
/// anything outside the grid, unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridMap {
    tiles: Grid<Option<TileKind>>,
    extraction_area: HashSet<Point>,
    agent_spawn: Option<Point>,
    package_spawn: Option<Point>,
}

impl GridMap {
    /// Builds a map from rows of tiles. Rows may have different lengths; the
    /// map width is the longest row.
    ///
    /// # Errors
    ///
    /// [`MapFormatError::Empty`] for no rows, and
    /// [`MapFormatError::DuplicateSpawn`] when a spawn tile appears twice.
    pub fn from_rows(rows: &[Vec<TileKind>]) -> Result<Self, MapFormatError> {
        if rows.is_empty() {
            return Err(MapFormatError::Empty);
        }
        let height = rows.len();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut extraction_area = HashSet::new();
        let mut agent_spawn = None;
        let mut package_spawn = None;

        for (y, row) in rows.iter().enumerate() {
            for (x, tile) in row.iter().enumerate() {
                let point = Point::new(x as i32, y as i32);
                let slot = match tile {
                    TileKind::Extraction => {
                        extraction_area.insert(point);
                        continue;
                    }
                    TileKind::AgentSpawn => &mut agent_spawn,
                    TileKind::PackageSpawn => &mut package_spawn,
                    TileKind::Floor | TileKind::Wall => continue,
                };
                if slot.replace(point).is_some() {
                    return Err(MapFormatError::DuplicateSpawn { kind: *tile, x, y });
                }
            }
        }

        let tiles = Grid::from_generator(width, height, |x, y| rows[y].get(x).copied());

        Ok(GridMap {
            tiles,
            extraction_area,
            agent_spawn,
            package_spawn,
        })
    }

    /// Reads and parses a map file.
    ///
    /// # Arguments
    ///
    /// * `path` - Text file in the map format understood by [`FromStr`].
    ///
    /// # Errors
    ///
    /// [`MapFormatError::Io`] if the file cannot be read, otherwise whatever
    /// parsing the contents reports.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MapFormatError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| MapFormatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        source.parse()
    }

    /// Returns the width of the map: the length of its longest row.
    pub fn width(&self) -> usize {
        self.tiles.width()
    }

    /// Returns the height of the map: its number of rows.
    pub fn height(&self) -> usize {
        self.tiles.height()
    }

    /// Tile at `point`, or `None` if the point is outside the map or past the
    /// end of its row.
    pub fn tile(&self, point: Point) -> Option<TileKind> {
        self.tiles.get(point).copied().flatten()
    }

    /// True iff the point is inside the map and its tile is walkable.
    pub fn is_reachable(&self, point: Point) -> bool {
        self.tile(point).is_some_and(TileKind::is_walkable)
    }

    /// True iff the point holds an extraction tile.
    pub fn is_within_extraction_area(&self, point: Point) -> bool {
        self.extraction_area.contains(&point)
    }

    /// Every extraction tile on the map.
    pub fn extraction_area(&self) -> &HashSet<Point> {
        &self.extraction_area
    }

    /// Where the agent starts each episode, if the map marks it.
    pub fn agent_spawn(&self) -> Option<Point> {
        self.agent_spawn
    }

    /// Where the package starts each episode, if the map marks it.
    pub fn package_spawn(&self) -> Option<Point> {
        self.package_spawn
    }

    /// Every reachable point, in row-major order.
    pub fn reachable_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.tiles
            .enumerate()
            .filter(|(_, tile)| tile.is_some_and(TileKind::is_walkable))
            .map(|(point, _)| point)
    }
}

impl FromStr for GridMap {
    type Err = MapFormatError;

    /// Parses the text map format: one row per line, one tile per character.
    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let mut rows = Vec::new();
        for (y, line) in source.lines().enumerate() {
            let row = line
                .trim_end()
                .chars()
                .enumerate()
                .map(|(x, symbol)| {
                    TileKind::from_symbol(symbol)
                        .ok_or(MapFormatError::UnknownSymbol { symbol, x, y })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
        GridMap::from_rows(&rows)
    }
}
