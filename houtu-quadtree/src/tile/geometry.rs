//! Vertex grids computed off the frame thread: the bare ellipsoid surface of a
//! tile and the same surface displaced by elevations.
use bevy::math::DVec3;
use houtu_scene::{math::HighLowVertices, Box3, Ellipsoid, Extent, LonLat, Projection};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct PlainParams {
    pub projection: Projection,
    /// Grid the tile renders at this zoom.
    pub grid_size: u32,
    /// Grid the normal map is sampled at.
    pub plain_grid_size: u32,
    /// Native extent.
    pub extent: Extent,
    pub ellipsoid: Ellipsoid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlainGeometry {
    pub plain_vertices: HighLowVertices,
    pub plain_normals: Vec<f32>,
    /// Half diagonal of the plain vertices' box.
    pub plain_radius: f64,
    pub normal_map_vertices: HighLowVertices,
    pub normal_map_normals: Vec<f32>,
}

/// Samples the ellipsoid over the extent. The normal map grid is the finer of
/// both sizes and the plain grid takes every `dg`-th of its points.
pub fn create_plain_geometry(params: &PlainParams) -> PlainGeometry {
    let grid_size = params.grid_size.max(1);
    let max_fgs = params.plain_grid_size.max(grid_size);
    let dg = (params.plain_grid_size / grid_size).max(1);
    let gs = max_fgs + 1;
    let e = params.extent;
    let lon_step = e.width() / f64::from(max_fgs);
    let lat_step = e.height() / f64::from(max_fgs);
    let one_over_radii_squared = params.ellipsoid.one_over_radii_squared;

    let plain_len = ((grid_size + 1) * (grid_size + 1) * 3) as usize;
    let mut plain = Vec::with_capacity(plain_len);
    let mut plain_normals = Vec::with_capacity(plain_len);
    let mut nm_vertices = Vec::with_capacity((gs * gs * 3) as usize);
    let mut nm_normals = Vec::with_capacity((gs * gs * 3) as usize);
    let mut bounds = Box3::empty();

    for i in 0..gs {
        for j in 0..gs {
            let native = LonLat::new(
                e.south_west.lon + f64::from(j) * lon_step,
                e.north_east.lat - f64::from(i) * lat_step,
                0.0,
            );
            let v = params
                .ellipsoid
                .lon_lat_to_cartesian(&params.projection.unproject(&native));
            let n = (v * one_over_radii_squared).normalize_or_zero();
            nm_vertices.extend_from_slice(&[v.x, v.y, v.z]);
            nm_normals.extend_from_slice(&[n.x as f32, n.y as f32, n.z as f32]);
            if i % dg == 0 && j % dg == 0 {
                plain.extend_from_slice(&[v.x, v.y, v.z]);
                plain_normals.extend_from_slice(&[n.x as f32, n.y as f32, n.z as f32]);
                bounds.expand_point(v);
            }
        }
    }

    PlainGeometry {
        plain_vertices: HighLowVertices::from_vertices(plain),
        plain_normals,
        plain_radius: ((bounds.max - bounds.min) * 0.5).length(),
        normal_map_vertices: HighLowVertices::from_vertices(nm_vertices),
        normal_map_normals: nm_normals,
    }
}

#[derive(Debug, Clone)]
pub struct TerrainParams {
    /// Row major from the north west corner, `(file_grid_size + 1)²` samples.
    pub elevations: Vec<f32>,
    pub plain_vertices: Vec<f64>,
    pub plain_normals: Vec<f32>,
    pub normal_map_vertices: Vec<f64>,
    pub normal_map_normals: Vec<f32>,
    pub height_factor: f64,
    /// 0 takes the size from the elevation count.
    pub file_grid_size: u32,
    /// Grid the tile renders at this zoom.
    pub grid_size: u32,
    pub no_data_values: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerrainGeometry {
    pub terrain_vertices: HighLowVertices,
    pub normal_map_vertices: HighLowVertices,
    pub normal_map_normals: Vec<f32>,
    /// One byte per terrain vertex, 1 where the source had no data.
    pub no_data: Option<Vec<u8>>,
    /// Box over the vertices with data, empty when there are none.
    pub bounds: Box3,
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::MalformedTerrain { expected, actual });
    }
    Ok(())
}

fn vec3_at(source: &[f64], k: usize) -> DVec3 {
    DVec3::new(source[k * 3], source[k * 3 + 1], source[k * 3 + 2])
}

fn normal_at(source: &[f32], k: usize) -> DVec3 {
    DVec3::new(
        f64::from(source[k * 3]),
        f64::from(source[k * 3 + 1]),
        f64::from(source[k * 3 + 2]),
    )
}

fn slice(t: f64, h1: f64, h0: f64) -> f64 {
    t * (h1 - h0)
}

/// Displaces the tile surface by `elevations`. A file grid at least as fine
/// as the target grid also yields per-vertex normals for lighting, a coarser
/// one is interpolated across each cell's two triangles.
pub fn create_terrain_geometry(params: &TerrainParams) -> Result<TerrainGeometry> {
    let elevations = &params.elevations;
    let fgs = if params.file_grid_size == 0 {
        ((elevations.len() as f64).sqrt() as u32).saturating_sub(1)
    } else {
        params.file_grid_size
    };
    let tgs = params.grid_size.max(1);
    let fgs_one = (fgs + 1) as usize;
    let gs = (tgs + 1) as usize;
    check_len(fgs_one * fgs_one, elevations.len())?;
    if fgs == 0 {
        return Err(Error::MalformedTerrain {
            expected: 4,
            actual: elevations.len(),
        });
    }

    let hf = params.height_factor;
    let is_no_data = |h: f32| params.no_data_values.iter().any(|nd| *nd == h);
    let height = |k: usize| {
        let h = elevations[k];
        if is_no_data(h) {
            0.0
        } else {
            hf * f64::from(h)
        }
    };

    let mut terrain = Vec::with_capacity(gs * gs * 3);
    let mut no_data = vec![0u8; gs * gs];
    let mut any_missing = false;
    let mut bounds = Box3::empty();

    if fgs >= tgs {
        let nv = &params.normal_map_vertices;
        let nn = &params.normal_map_normals;
        check_len(fgs_one * fgs_one * 3, nv.len())?;
        check_len(fgs_one * fgs_one * 3, nn.len())?;

        let dg = (fgs / tgs) as usize;
        let displaced = |k: usize| vec3_at(nv, k) + normal_at(nn, k) * height(k);
        let mut nm_vertices = vec![0.0f64; fgs_one * fgs_one * 3];
        let mut nm_normals = vec![DVec3::ZERO; fgs_one * fgs_one];

        for i in 0..fgs_one {
            for j in 0..fgs_one {
                let k0 = i * fgs_one + j;
                let v0 = displaced(k0);
                nm_vertices[k0 * 3..k0 * 3 + 3].copy_from_slice(&[v0.x, v0.y, v0.z]);

                if i % dg == 0 && j % dg == 0 {
                    let t = terrain.len() / 3;
                    terrain.extend_from_slice(&[v0.x, v0.y, v0.z]);
                    if is_no_data(elevations[k0]) {
                        no_data[t] = 1;
                        any_missing = true;
                    } else {
                        bounds.expand_point(v0);
                    }
                }

                if i + 1 < fgs_one && j + 1 < fgs_one {
                    let k1 = k0 + 1;
                    let k2 = k0 + fgs_one;
                    let k3 = k2 + 1;
                    let (v1, v2, v3) = (displaced(k1), displaced(k2), displaced(k3));
                    let e10 = v1 - v0;
                    let e20 = v2 - v0;
                    let e30 = v3 - v0;
                    let sw = e20.cross(e30).normalize_or_zero();
                    let ne = e30.cross(e10).normalize_or_zero();
                    let n0 = (ne + sw).normalize_or_zero();
                    nm_normals[k0] += n0;
                    nm_normals[k1] += ne;
                    nm_normals[k2] += sw;
                    nm_normals[k3] += n0;
                }
            }
        }

        let normals = nm_normals
            .iter()
            .flat_map(|n| {
                let n = n.normalize_or_zero();
                [n.x as f32, n.y as f32, n.z as f32]
            })
            .collect();

        return Ok(TerrainGeometry {
            terrain_vertices: HighLowVertices::from_vertices(terrain),
            normal_map_vertices: HighLowVertices::from_vertices(nm_vertices),
            normal_map_normals: normals,
            no_data: any_missing.then_some(no_data),
            bounds,
        });
    }

    let plain = &params.plain_vertices;
    let normals = &params.plain_normals;
    check_len(gs * gs * 3, plain.len())?;
    check_len(gs * gs * 3, normals.len())?;

    let one_size = f64::from(tgs) / f64::from(fgs);
    let cell = |i: usize| {
        let fi = i as f64;
        if i == gs - 1 {
            (one_size, (fi / one_size).floor() as usize - 1)
        } else {
            (fi % one_size, (fi / one_size).floor() as usize)
        }
    };

    for i in 0..gs {
        let (inside_i, v_i) = cell(i);
        for j in 0..gs {
            let (inside_j, v_j) = cell(j);
            let lt = v_i * fgs_one + v_j;
            let lb = lt + fgs_one;
            let corners = [lt, lt + 1, lb, lb + 1];
            let (hvlt, hvrt, hvlb, hvrb) = (height(lt), height(lt + 1), height(lb), height(lb + 1));

            let h = if inside_i + inside_j < one_size {
                hvlt + slice(inside_j / one_size, hvrt, hvlt) + slice(inside_i / one_size, hvlb, hvlt)
            } else {
                hvrb + slice((one_size - inside_j) / one_size, hvlb, hvrb)
                    + slice((one_size - inside_i) / one_size, hvrt, hvrb)
            };

            let k = i * gs + j;
            let v = vec3_at(plain, k) + normal_at(normals, k) * h;
            terrain.extend_from_slice(&[v.x, v.y, v.z]);
            if corners.iter().any(|c| is_no_data(elevations[*c])) {
                no_data[k] = 1;
                any_missing = true;
            } else {
                bounds.expand_point(v);
            }
        }
    }

    Ok(TerrainGeometry {
        terrain_vertices: HighLowVertices::from_vertices(terrain),
        normal_map_vertices: HighLowVertices::from_vertices(params.normal_map_vertices.clone()),
        normal_map_normals: params.plain_normals.clone(),
        no_data: any_missing.then_some(no_data),
        bounds,
    })
}
