use geo::{Coord, Polygon, Rect};

/// Rows of the fallback tile grid.
pub const TILE_ROWS: usize = 5;
/// Columns of the fallback tile grid.
pub const TILE_COLS: usize = 6;

/// Partition `bounds` into `rows` x `cols` equal cells.
///
/// Cells are returned row-major starting at the north-west corner: the first
/// `cols` cells span the northern edge from west to east.
pub fn fishnet(bounds: &Rect<f64>, rows: usize, cols: usize) -> Vec<Polygon<f64>> {
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    let (min, max) = (bounds.min(), bounds.max());
    let dx = (max.x - min.x) / cols as f64;
    let dy = (max.y - min.y) / rows as f64;
    let mut cells = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        let north = max.y - r as f64 * dy;
        // Last row and column snap to the bounds so the grid covers them exactly.
        let south = if r + 1 == rows { min.y } else { north - dy };
        for c in 0..cols {
            let west = min.x + c as f64 * dx;
            let east = if c + 1 == cols { max.x } else { west + dx };
            cells.push(
                Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north }).to_polygon(),
            );
        }
    }
    cells
}
