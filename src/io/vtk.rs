//! VTK XML output: one `.vtu` file per write and a `.pvd` collection per series.
//!
//! The files are ASCII and open directly in ParaView.

use crate::geom::mesh::TetrahedralMesh;
use crate::io::sink::{FieldData, NamedField, OutputSink, OutputTag, check_field_size};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// VTK cell type of a linear tetrahedron.
const VTK_TETRA: u8 = 10;

/// Writes every series as a PVD time series of VTU files.
#[derive(Debug)]
pub struct VtkSeriesWriter {
    dir: PathBuf,
    mesh: Arc<TetrahedralMesh>,
    /// Written `(file name, time)` pairs per series.
    series: BTreeMap<String, Vec<(String, f64)>>,
}

impl VtkSeriesWriter {
    /// Creates the output directory if needed.
    pub fn new(dir: &Path, mesh: Arc<TetrahedralMesh>) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            mesh,
            series: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the collection file of a series.
    pub fn pvd_path(&self, series: &str) -> PathBuf {
        self.dir.join(format!("{series}.pvd"))
    }

    fn write_vtu(&self, path: &Path, field: &NamedField, time: f64) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        let mut w = BufWriter::new(file);
        let mesh = &self.mesh;

        writeln!(w, r#"<?xml version="1.0"?>"#)?;
        writeln!(
            w,
            r#"<VTKFile type="UnstructuredGrid" version="0.1" byte_order="LittleEndian">"#
        )?;
        writeln!(w, r#"  <UnstructuredGrid>"#)?;
        writeln!(w, r#"    <FieldData>"#)?;
        writeln!(
            w,
            r#"      <DataArray type="Float64" Name="TimeValue" NumberOfTuples="1">{time}</DataArray>"#
        )?;
        writeln!(w, r#"    </FieldData>"#)?;
        writeln!(
            w,
            r#"    <Piece NumberOfPoints="{}" NumberOfCells="{}">"#,
            mesh.vertex_count(),
            mesh.tetrahedra_count()
        )?;

        writeln!(w, r#"      <Points>"#)?;
        writeln!(
            w,
            r#"        <DataArray type="Float64" NumberOfComponents="3" format="ascii">"#
        )?;
        for p in &mesh.vertices {
            writeln!(w, "          {:e} {:e} {:e}", p.x, p.y, p.z)?;
        }
        writeln!(w, r#"        </DataArray>"#)?;
        writeln!(w, r#"      </Points>"#)?;

        writeln!(w, r#"      <Cells>"#)?;
        writeln!(
            w,
            r#"        <DataArray type="Int64" Name="connectivity" format="ascii">"#
        )?;
        for t in &mesh.tetrahedra {
            writeln!(w, "          {} {} {} {}", t.0, t.1, t.2, t.3)?;
        }
        writeln!(w, r#"        </DataArray>"#)?;
        writeln!(w, r#"        <DataArray type="Int64" Name="offsets" format="ascii">"#)?;
        for i in 1..=mesh.tetrahedra_count() {
            writeln!(w, "          {}", 4 * i)?;
        }
        writeln!(w, r#"        </DataArray>"#)?;
        writeln!(w, r#"        <DataArray type="UInt8" Name="types" format="ascii">"#)?;
        for _ in 0..mesh.tetrahedra_count() {
            writeln!(w, "          {VTK_TETRA}")?;
        }
        writeln!(w, r#"        </DataArray>"#)?;
        writeln!(w, r#"      </Cells>"#)?;

        writeln!(w, r#"      <PointData>"#)?;
        match &field.data {
            FieldData::Scalar(values) => {
                writeln!(
                    w,
                    r#"        <DataArray type="Float64" Name="{}" format="ascii">"#,
                    field.name
                )?;
                for v in values {
                    writeln!(w, "          {v:e}")?;
                }
            }
            FieldData::Vector(values) => {
                writeln!(
                    w,
                    r#"        <DataArray type="Float64" Name="{}" NumberOfComponents="3" format="ascii">"#,
                    field.name
                )?;
                for v in values {
                    writeln!(w, "          {:e} {:e} {:e}", v[0], v[1], v[2])?;
                }
            }
        }
        writeln!(w, r#"        </DataArray>"#)?;
        writeln!(w, r#"      </PointData>"#)?;
        writeln!(w, r#"    </Piece>"#)?;
        writeln!(w, r#"  </UnstructuredGrid>"#)?;
        writeln!(w, r#"</VTKFile>"#)?;

        w.flush()
            .with_context(|| format!("Failed to write file: {}", path.display()))?;
        Ok(())
    }

    fn write_pvd(&self, series: &str, files: &[(String, f64)]) -> Result<()> {
        let path = self.pvd_path(series);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        let mut w = BufWriter::new(file);

        writeln!(w, r#"<?xml version="1.0"?>"#)?;
        writeln!(
            w,
            r#"<VTKFile type="Collection" version="0.1" byte_order="LittleEndian">"#
        )?;
        writeln!(w, r#"  <Collection>"#)?;
        for (name, time) in files {
            writeln!(
                w,
                r#"    <DataSet timestep="{time}" group="" part="0" file="{name}"/>"#
            )?;
        }
        writeln!(w, r#"  </Collection>"#)?;
        writeln!(w, r#"</VTKFile>"#)?;

        w.flush()
            .with_context(|| format!("Failed to write file: {}", path.display()))?;
        Ok(())
    }
}

impl OutputSink for VtkSeriesWriter {
    fn write(&mut self, series: &str, field: &NamedField, tag: OutputTag) -> Result<()> {
        check_field_size(&self.mesh, field)?;

        let index = self.series.get(series).map_or(0, Vec::len);
        let name = format!("{series}_{index:06}.vtu");
        self.write_vtu(&self.dir.join(&name), field, tag.time)?;

        let mut files = self.series.remove(series).unwrap_or_default();
        files.push((name, tag.time));
        // The collection is rewritten after every frame so that an
        // interrupted run still leaves a readable series.
        let result = self.write_pvd(series, &files);
        self.series.insert(series.to_string(), files);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::mesh::generate_sphere_mesh;
    use tempfile::tempdir;

    #[test]
    fn test_writes_vtu_and_pvd() -> Result<()> {
        let dir = tempdir()?;
        let mesh = Arc::new(generate_sphere_mesh(1));
        let n = mesh.vertex_count();
        let mut writer = VtkSeriesWriter::new(dir.path(), mesh.clone())?;

        let p = NamedField::scalar("pressure", vec![1.5; n]);
        writer.write("pressure", &p, OutputTag { step: 5, time: 0.5 })?;
        writer.write("pressure", &p, OutputTag { step: 10, time: 1.0 })?;
        let u = NamedField::vector("velocity", vec![[0.0, 0.0, 1.0]; n]);
        writer.write("velocity", &u, OutputTag { step: 5, time: 0.5 })?;

        let vtu = fs::read_to_string(dir.path().join("pressure_000001.vtu"))?;
        assert!(vtu.contains(r#"NumberOfCells="6""#));
        assert!(vtu.contains(r#"Name="pressure""#));
        assert!(vtu.contains(r#"NumberOfTuples="1">1</DataArray>"#));

        let pvd = fs::read_to_string(writer.pvd_path("pressure"))?;
        assert!(pvd.contains("pressure_000000.vtu"));
        assert!(pvd.contains(r#"timestep="1" group="" part="0" file="pressure_000001.vtu""#));
        assert!(dir.path().join("velocity_000000.vtu").exists());
        assert!(dir.path().join("velocity.pvd").exists());
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_field_size() -> Result<()> {
        let dir = tempdir()?;
        let mesh = Arc::new(generate_sphere_mesh(1));
        let mut writer = VtkSeriesWriter::new(dir.path(), mesh)?;
        let bad = NamedField::scalar("porosity", vec![0.0; 3]);
        let err = writer
            .write("porosity", &bad, OutputTag { step: 0, time: 0.0 })
            .unwrap_err();
        assert!(err.to_string().contains("8 vertices"));
        Ok(())
    }
}
