//! Triangle strip topology of a tile grid: the interior body plus one skirt
//! strip per side that folds the edge onto the neighbour's resolution.
use std::{collections::HashMap, sync::Arc};

use crate::quad::Side;

fn center_body(size: u32) -> Vec<u32> {
    let mut indexes = vec![];
    let (i0, j0, i1, j1) = (1, 1, 1, 1);
    let mut ind2 = 0;
    let mut nr = 0;
    let mut i = i0;
    while i + 1 + i1 < size {
        let mut j = j0;
        while j + j1 < size {
            let ind1 = i * size + j;
            nr = (i + 1) * size;
            ind2 = nr + j;
            indexes.push(ind1);
            indexes.push(ind2);
            j += 1;
        }
        indexes.push(ind2);
        indexes.push(nr + j0);
        i += 1;
    }
    let last = indexes.last().copied().unwrap_or(0);
    indexes.push(last);
    indexes.push(size * size - size);
    indexes
}

/// Row of the coarse edge vertex each fine step of a skirt snaps to.
fn skirt_steps(size: u32, delta: u32) -> impl Iterator<Item = (u32, u32)> {
    let group = f64::from(size - 1) / f64::from(delta);
    let mut k = 0;
    (0..size.saturating_sub(2)).map(move |i| {
        if f64::from(i) % group == 0.0 {
            k = i;
        }
        (i, k)
    })
}

fn west_skirt(size: u32, delta: u32) -> Vec<u32> {
    let b = size * size - size;
    let mut indexes = vec![];
    for (i, k) in skirt_steps(size, delta) {
        indexes.push(b - size * k);
        indexes.push(b - size * i - size + 1);
    }
    if delta == size - 1 {
        indexes.push(size);
        indexes.push(0);
    }
    indexes
}

fn north_skirt(size: u32, delta: u32) -> Vec<u32> {
    let mut indexes = vec![];
    for (i, k) in skirt_steps(size, delta) {
        indexes.push(k);
        indexes.push(size + i + 1);
    }
    if delta == size - 1 {
        indexes.push(size - 2);
        indexes.push(size - 1);
    }
    indexes
}

fn east_skirt(size: u32, delta: u32) -> Vec<u32> {
    let mut indexes = vec![];
    for (i, k) in skirt_steps(size, delta) {
        indexes.push(size + size * k - 1);
        indexes.push(size * (i + 1) + size - 2);
    }
    if delta == size - 1 {
        indexes.push(size * (size - 1) - 1);
        indexes.push(size * size - 1);
    }
    indexes
}

fn south_skirt(size: u32, delta: u32) -> Vec<u32> {
    let rb = size * (size - 1) - 2;
    let lb = size * size - 1;
    let mut indexes = vec![];
    for (i, k) in skirt_steps(size, delta) {
        indexes.push(lb - k);
        indexes.push(rb - i);
    }
    if delta == size - 1 {
        indexes.push(size * size - size + 1);
    }
    indexes.push(size * size - size);
    indexes
}

/// Precomputed strips for every grid size up to `2^max_pow` cells.
#[derive(Debug, Clone)]
pub struct SegmentIndexes {
    max_pow: u32,
    center: Vec<Vec<u32>>,
    /// `skirts[side][own_pow][neighbour_pow]`.
    skirts: [Vec<Vec<Vec<u32>>>; 4],
}

impl SegmentIndexes {
    pub fn new(max_pow: u32) -> Self {
        let center = (0..=max_pow).map(|i| center_body((1 << i) + 1)).collect();
        let build = |f: fn(u32, u32) -> Vec<u32>| {
            (0..=max_pow)
                .map(|i| (0..=max_pow).map(|j| f((1 << i) + 1, 1 << j)).collect())
                .collect()
        };
        Self {
            max_pow,
            center,
            skirts: [
                build(north_skirt),
                build(east_skirt),
                build(south_skirt),
                build(west_skirt),
            ],
        }
    }

    pub fn max_pow(&self) -> u32 {
        self.max_pow
    }

    /// Strip for a grid of `2^size_log2` cells whose sides meet neighbours
    /// of `2^sides[side]` cells. Sides are indexed N, E, S, W.
    pub fn create_segment_indexes(&self, size_log2: u32, sides: [u32; 4]) -> Option<Vec<u32>> {
        if size_log2 == 0 {
            return Some(vec![0, 2, 1, 3]);
        }
        let c = self.center.get(size_log2 as usize)?;
        let skirt = |side: Side| {
            self.skirts[side.index()]
                .get(size_log2 as usize)
                .and_then(|row| row.get(sides[side.index()] as usize))
        };
        let w = skirt(Side::West)?;
        let n = skirt(Side::North)?;
        let e = skirt(Side::East)?;
        let s = skirt(Side::South)?;
        let mut indexes = Vec::with_capacity(c.len() + w.len() + n.len() + e.len() + s.len());
        indexes.extend_from_slice(c);
        indexes.extend_from_slice(w);
        indexes.extend_from_slice(n);
        indexes.extend_from_slice(e);
        indexes.extend_from_slice(s);
        Some(indexes)
    }
}

/// Normalized `u16` texture coordinates of a grid `size` cells wide.
pub fn texture_coords(size: u32) -> Vec<u16> {
    let mut coords = Vec::with_capacity(((size + 1) * (size + 1) * 2) as usize);
    let s = f64::from(size.max(1));
    for i in 0..=size {
        for j in 0..=size {
            coords.push((f64::from(j) / s * f64::from(u16::MAX)) as u16);
            coords.push((f64::from(i) / s * f64::from(u16::MAX)) as u16);
        }
    }
    coords
}

/// Strips assembled so far, shared between tiles with the same key.
#[derive(Debug)]
pub struct IndexCache {
    segment: SegmentIndexes,
    strips: HashMap<(u32, [u32; 4]), Arc<Vec<u32>>>,
    texture_coords: Vec<Arc<Vec<u16>>>,
}

impl IndexCache {
    pub fn new(max_pow: u32) -> Self {
        Self {
            segment: SegmentIndexes::new(max_pow),
            strips: HashMap::new(),
            texture_coords: (0..=max_pow).map(|i| Arc::new(texture_coords(1 << i))).collect(),
        }
    }

    pub fn get(&mut self, size_log2: u32, sides: [u32; 4]) -> Option<Arc<Vec<u32>>> {
        if let Some(strip) = self.strips.get(&(size_log2, sides)) {
            return Some(strip.clone());
        }
        let strip = Arc::new(self.segment.create_segment_indexes(size_log2, sides)?);
        self.strips.insert((size_log2, sides), strip.clone());
        Some(strip)
    }

    pub fn texture_coords(&self, size_log2: u32) -> Option<Arc<Vec<u16>>> {
        self.texture_coords.get(size_log2 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.strips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }
}
