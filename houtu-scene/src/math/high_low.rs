use bevy::math::{DVec3, Vec3};

const SPLIT_UNIT: f64 = 65536.0;

/// Splits a double into a pair of floats whose sum restores the value.
///
/// The high part is a multiple of 65536 so it survives the `f32` conversion
/// exactly, the low part keeps the remainder.
pub fn double_to_two_floats(value: f64) -> (f32, f32) {
    if value >= 0.0 {
        let double_high = (value / SPLIT_UNIT).floor() * SPLIT_UNIT;
        (double_high as f32, (value - double_high) as f32)
    } else {
        let double_high = (-value / SPLIT_UNIT).floor() * SPLIT_UNIT;
        ((-double_high) as f32, (value + double_high) as f32)
    }
}

pub fn dvec3_to_two_vec3(v: DVec3) -> (Vec3, Vec3) {
    let (hx, lx) = double_to_two_floats(v.x);
    let (hy, ly) = double_to_two_floats(v.y);
    let (hz, lz) = double_to_two_floats(v.z);
    (Vec3::new(hx, hy, hz), Vec3::new(lx, ly, lz))
}

/// Flat xyz vertex array kept both in double precision and as a high/low
/// float split for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighLowVertices {
    pub vertices: Vec<f64>,
    pub high: Vec<f32>,
    pub low: Vec<f32>,
}

impl HighLowVertices {
    pub fn with_len(len: usize) -> Self {
        Self {
            vertices: vec![0.0; len],
            high: vec![0.0; len],
            low: vec![0.0; len],
        }
    }

    pub fn from_vertices(vertices: Vec<f64>) -> Self {
        let mut high = Vec::with_capacity(vertices.len());
        let mut low = Vec::with_capacity(vertices.len());
        for v in vertices.iter() {
            let (h, l) = double_to_two_floats(*v);
            high.push(h);
            low.push(l);
        }
        Self {
            vertices,
            high,
            low,
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Side of the square grid in cells, `sqrt(len / 3) - 1`.
    pub fn grid_size(&self) -> u32 {
        let points = (self.vertices.len() / 3) as f64;
        (points.sqrt() as u32).saturating_sub(1)
    }

    pub fn get(&self, vertex: usize) -> Option<DVec3> {
        let i = vertex * 3;
        if i + 2 >= self.vertices.len() {
            return None;
        }
        Some(DVec3::new(
            self.vertices[i],
            self.vertices[i + 1],
            self.vertices[i + 2],
        ))
    }

    pub fn set(&mut self, vertex: usize, v: DVec3) {
        let i = vertex * 3;
        let (high, low) = dvec3_to_two_vec3(v);
        self.vertices[i] = v.x;
        self.vertices[i + 1] = v.y;
        self.vertices[i + 2] = v.z;
        self.high[i] = high.x;
        self.high[i + 1] = high.y;
        self.high[i + 2] = high.z;
        self.low[i] = low.x;
        self.low[i + 1] = low.y;
        self.low[i + 2] = low.z;
    }

    /// Copies one vertex (all three representations) from another buffer.
    pub fn copy_vertex_from(&mut self, vertex: usize, source: &HighLowVertices, source_vertex: usize) {
        let i = vertex * 3;
        let j = source_vertex * 3;
        self.vertices[i..i + 3].copy_from_slice(&source.vertices[j..j + 3]);
        self.high[i..i + 3].copy_from_slice(&source.high[j..j + 3]);
        self.low[i..i + 3].copy_from_slice(&source.low[j..j + 3]);
    }
}
