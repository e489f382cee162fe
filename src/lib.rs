pub mod fem;
pub mod geom;
pub mod io;
pub mod linalg;
pub mod logging;
pub mod sim;

// Prelude
pub use geom::mesh::{TetrahedralMesh, generate_sphere_mesh};
pub use geom::point::Point;
pub use geom::vector::Vector;
pub use io::{MemorySink, OutputSink, VtkSeriesWriter};
pub use sim::{RunSummary, Simulation, SimulationParams};
