use crate::geom::mesh::TetrahedralMesh;
use anyhow::Result;

/// Nodal values of an output field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Scalar(Vec<f64>),
    Vector(Vec<[f64; 3]>),
}

impl FieldData {
    pub fn len(&self) -> usize {
        match self {
            FieldData::Scalar(v) => v.len(),
            FieldData::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A field sampled at the mesh vertices, ready for output.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedField {
    pub name: String,
    pub data: FieldData,
}

impl NamedField {
    pub fn scalar(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            data: FieldData::Scalar(values),
        }
    }

    pub fn vector(name: &str, values: Vec<[f64; 3]>) -> Self {
        Self {
            name: name.to_string(),
            data: FieldData::Vector(values),
        }
    }
}

/// Logical position of an output in the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputTag {
    pub step: usize,
    pub time: f64,
}

/// Destination of time-series output, one series per field.
pub trait OutputSink {
    fn write(&mut self, series: &str, field: &NamedField, tag: OutputTag) -> Result<()>;
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub series: String,
    pub field: NamedField,
    pub tag: OutputTag,
}

/// Keeps every write in memory. Used in tests and for post-processing
/// without touching the file system.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Vec<OutputRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[OutputRecord] {
        &self.records
    }

    /// All writes to one series, in write order.
    pub fn series(&self, name: &str) -> Vec<&OutputRecord> {
        self.records.iter().filter(|r| r.series == name).collect()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, series: &str, field: &NamedField, tag: OutputTag) -> Result<()> {
        self.records.push(OutputRecord {
            series: series.to_string(),
            field: field.clone(),
            tag,
        });
        Ok(())
    }
}

/// Checks that a field can be drawn on the mesh vertices.
pub fn check_field_size(mesh: &TetrahedralMesh, field: &NamedField) -> Result<()> {
    anyhow::ensure!(
        field.data.len() == mesh.vertex_count(),
        "field `{}` has {} values but the mesh has {} vertices",
        field.name,
        field.data.len(),
        mesh.vertex_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_groups_by_series() -> Result<()> {
        let mut sink = MemorySink::new();
        let tag = OutputTag { step: 5, time: 0.5 };
        sink.write("pressure", &NamedField::scalar("p", vec![1.0, 2.0]), tag)?;
        sink.write("velocity", &NamedField::vector("u", vec![[0.0; 3]; 2]), tag)?;
        sink.write("pressure", &NamedField::scalar("p", vec![3.0, 4.0]), tag)?;

        assert_eq!(sink.records().len(), 3);
        let p = sink.series("pressure");
        assert_eq!(p.len(), 2);
        assert_eq!(p[1].field.data, FieldData::Scalar(vec![3.0, 4.0]));
        assert!(sink.series("porosity").is_empty());
        Ok(())
    }
}
