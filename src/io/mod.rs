//! Parameter input and field output.

pub mod params;
pub mod sink;
pub mod vtk;

pub use params::{parse_params, read_params, write_params};
pub use sink::{FieldData, MemorySink, NamedField, OutputRecord, OutputSink, OutputTag};
pub use vtk::VtkSeriesWriter;
