//! Windows into square vertex grids stored row by row, north to south.
use houtu_scene::{math::HighLowVertices, Box3};

/// Copies the `(size + 1)²` window starting at row `i0`, column `j0` of a
/// grid `grid_size` cells wide. Returns `None` when the window leaves the grid.
pub fn sub_array_f64(
    source: &[f64],
    grid_size: usize,
    i0: usize,
    j0: usize,
    size: usize,
) -> Option<Vec<f64>> {
    let row = grid_size + 1;
    if i0 + size > grid_size || j0 + size > grid_size || source.len() < row * row * 3 {
        return None;
    }
    let mut out = Vec::with_capacity((size + 1) * (size + 1) * 3);
    for i in i0..=i0 + size {
        let start = (i * row + j0) * 3;
        out.extend_from_slice(&source[start..start + (size + 1) * 3]);
    }
    Some(out)
}

pub fn sub_array_f32(
    source: &[f32],
    grid_size: usize,
    i0: usize,
    j0: usize,
    size: usize,
) -> Option<Vec<f32>> {
    let row = grid_size + 1;
    if i0 + size > grid_size || j0 + size > grid_size || source.len() < row * row * 3 {
        return None;
    }
    let mut out = Vec::with_capacity((size + 1) * (size + 1) * 3);
    for i in i0..=i0 + size {
        let start = (i * row + j0) * 3;
        out.extend_from_slice(&source[start..start + (size + 1) * 3]);
    }
    Some(out)
}

pub fn sub_vertices(
    source: &HighLowVertices,
    grid_size: usize,
    i0: usize,
    j0: usize,
    size: usize,
) -> Option<HighLowVertices> {
    Some(HighLowVertices {
        vertices: sub_array_f64(&source.vertices, grid_size, i0, j0, size)?,
        high: sub_array_f32(&source.high, grid_size, i0, j0, size)?,
        low: sub_array_f32(&source.low, grid_size, i0, j0, size)?,
    })
}

/// Window of a terrain grid together with its no-data marks and the box of
/// the vertices that carry data. The box is empty when no vertex does.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedWindow {
    pub vertices: HighLowVertices,
    pub no_data: Option<Vec<u8>>,
    pub bounds: Box3,
}

pub fn sub_vertices_with_bounds(
    source: &HighLowVertices,
    no_data: Option<&[u8]>,
    grid_size: usize,
    i0: usize,
    j0: usize,
    size: usize,
) -> Option<BoundedWindow> {
    let vertices = sub_vertices(source, grid_size, i0, j0, size)?;
    let row = grid_size + 1;
    let out_row = size + 1;
    let mut out_no_data = no_data.map(|_| vec![0u8; out_row * out_row]);
    let mut bounds = Box3::empty();
    for i in 0..out_row {
        for j in 0..out_row {
            let k = i * out_row + j;
            let source_k = (i0 + i) * row + j0 + j;
            let missing = no_data
                .and_then(|nd| nd.get(source_k))
                .map_or(false, |flag| *flag == 1);
            if missing {
                if let Some(marks) = out_no_data.as_mut() {
                    marks[k] = 1;
                }
                continue;
            }
            if let Some(v) = vertices.get(k) {
                bounds.expand_point(v);
            }
        }
    }
    Some(BoundedWindow {
        vertices,
        no_data: out_no_data,
        bounds,
    })
}

/// Box over every vertex whose no-data mark is unset.
pub fn bounds_of(vertices: &HighLowVertices, no_data: Option<&[u8]>) -> Box3 {
    let mut bounds = Box3::empty();
    for k in 0..vertices.len() / 3 {
        if no_data.and_then(|nd| nd.get(k)).map_or(false, |flag| *flag == 1) {
            continue;
        }
        if let Some(v) = vertices.get(k) {
            bounds.expand_point(v);
        }
    }
    bounds
}

#[cfg(test)]
mod tests {
    use bevy::math::DVec3;

    use super::*;

    fn numbered_grid(grid_size: usize) -> HighLowVertices {
        let row = grid_size + 1;
        let mut v = Vec::with_capacity(row * row * 3);
        for i in 0..row {
            for j in 0..row {
                v.extend_from_slice(&[j as f64, i as f64, (i * row + j) as f64]);
            }
        }
        HighLowVertices::from_vertices(v)
    }

    #[test]
    fn window_picks_rows_and_columns() {
        let grid = numbered_grid(4);
        let w = sub_vertices(&grid, 4, 2, 1, 2).unwrap();
        assert_eq!(w.grid_size(), 2);
        assert_eq!(w.get(0), Some(DVec3::new(1.0, 2.0, 11.0)));
        assert_eq!(w.get(8), Some(DVec3::new(3.0, 4.0, 23.0)));
        assert_eq!(w.high.len(), 27);
    }

    #[test]
    fn window_outside_grid() {
        let grid = numbered_grid(4);
        assert!(sub_vertices(&grid, 4, 3, 0, 2).is_none());
        assert!(sub_array_f64(&grid.vertices, 8, 0, 0, 1).is_none());
    }

    #[test]
    fn bounds_skip_missing_vertices() {
        let grid = numbered_grid(2);
        let mut marks = vec![0u8; 9];
        marks[8] = 1;
        let w = sub_vertices_with_bounds(&grid, Some(&marks), 2, 1, 1, 1).unwrap();
        assert_eq!(w.no_data, Some(vec![0, 0, 0, 1]));
        assert_eq!(w.bounds.max, DVec3::new(2.0, 2.0, 7.0));

        let all = vec![1u8; 9];
        let w = sub_vertices_with_bounds(&grid, Some(&all), 2, 0, 0, 2).unwrap();
        assert!(w.bounds.is_empty());
        assert!(bounds_of(&grid, Some(&all)).is_empty());
        assert_eq!(bounds_of(&grid, None).max, DVec3::new(2.0, 2.0, 8.0));
    }
}
