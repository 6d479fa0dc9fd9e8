//! Artifact writing: OBJ mesh files, SDF descriptors and PNG map previews.
//!
//! Every export lands in its own directory under the output root, named
//! after the artifact stem `mesh{seed1}t{seed2}[f{filter}][T|F]_h{height}`,
//! so artifacts from different parameter sets never collide.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use thiserror::Error;

use crate::grid::Grid;
use crate::mesh::Mesh;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("filesystem error during export: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid export geometry: {0}")]
    Format(String),
}

/// Placement and scale metadata written next to the mesh file.
#[derive(Clone, Debug)]
pub struct ExportDescriptor {
    pub object_name: String,
    pub mesh_path: PathBuf,
    /// Side length of the terrain footprint in meters.
    pub footprint_length: f64,
    /// Terrain height in meters.
    pub height: f64,
}

/// Artifact stem for a generation run: seed label, classification suffix and
/// map height in cell units.
pub fn artifact_stem(seed_label: &str, map_suffix: &str, height: u32) -> String {
    format!("mesh{seed_label}{map_suffix}_h{height}")
}

/// Serialize a repaired mesh and its descriptor under `out_root/<name>/`.
/// Returns the mesh and descriptor file paths.
///
/// The mesh must be watertight at this point; an open mesh is a geometry
/// failure, not an I/O failure, and is reported as such.
pub fn export(
    mesh: &Mesh,
    name: &str,
    footprint_length: f64,
    height: f64,
    out_root: &Path,
) -> Result<(PathBuf, PathBuf), ExportError> {
    if !mesh.is_watertight() {
        return Err(ExportError::Format(
            "mesh is not watertight, run repair before exporting".to_string(),
        ));
    }

    let directory = out_root.join(name);
    fs::create_dir_all(&directory)?;

    let mesh_path = directory.join(format!("{name}.obj"));
    write_obj(mesh, &mesh_path)?;

    let descriptor = ExportDescriptor {
        object_name: name.to_string(),
        mesh_path: mesh_path.clone(),
        footprint_length,
        height,
    };
    let descriptor_path = directory.join(format!("{name}.sdf"));
    write_sdf(&descriptor, &descriptor_path)?;

    Ok((mesh_path, descriptor_path))
}

/// Wavefront OBJ: vertex list followed by 1-indexed triangle faces.
fn write_obj(mesh: &Mesh, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    for v in &mesh.vertices {
        writeln!(out, "v {} {} {}", v[0], v[1], v[2])?;
    }
    for f in &mesh.faces {
        writeln!(out, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }
    out.flush()?;
    Ok(())
}

/// SDF model descriptor: a static model whose visual and collision entries
/// reference the same mesh with the same size, so rendering and physics see
/// identical terrain.
fn write_sdf(descriptor: &ExportDescriptor, path: &Path) -> Result<(), ExportError> {
    let name = &descriptor.object_name;
    let uri = descriptor.mesh_path.display();
    let length = descriptor.footprint_length;
    let height = descriptor.height;

    let text = format!(
        r#"<?xml version='1.0'?>
<sdf version="1.6">
    <model name="{name}">
        <static>1</static>
        <link name="link">
            <visual name="visual">
                <geometry>
                    <mesh>
                        <uri>{uri}</uri>
                        <size>{length} {length} {height}</size>
                    </mesh>
                </geometry>
            </visual>
            <collision name="collision">
                <geometry>
                    <mesh>
                        <uri>{uri}</uri>
                        <size>{length} {length} {height}</size>
                    </mesh>
                </geometry>
            </collision>
        </link>
    </model>
</sdf>
"#
    );

    fs::write(path, text)?;
    Ok(())
}

/// Recover `(footprint_length, height)` from a descriptor file, for
/// round-trip verification of exported artifacts.
pub fn read_descriptor_size(path: &Path) -> Result<(f64, f64), ExportError> {
    let content = fs::read_to_string(path)?;
    let start = content
        .find("<size>")
        .ok_or_else(|| ExportError::Format("descriptor has no <size> element".to_string()))?;
    let rest = &content[start + "<size>".len()..];
    let end = rest
        .find("</size>")
        .ok_or_else(|| ExportError::Format("descriptor <size> element is unterminated".to_string()))?;

    let fields: Vec<f64> = rest[..end]
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| ExportError::Format("descriptor <size> fields are not numeric".to_string()))?;
    if fields.len() != 3 {
        return Err(ExportError::Format(
            "descriptor <size> must hold three fields".to_string(),
        ));
    }
    Ok((fields[0], fields[2]))
}

/// Export a classified map as a grayscale PNG preview.
/// Values are expected in [0,1]; cell (i, j) maps to pixel (x=j, y=i).
pub fn export_map_png(map: &Grid<f64>, path: &str) -> Result<(), image::ImageError> {
    let size = map.size() as u32;
    let mut img = GrayImage::new(size, size);

    for (i, j, &v) in map.iter() {
        let shade = (v.clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(j as u32, i as u32, Luma([shade]));
    }

    img.save(path)
}
