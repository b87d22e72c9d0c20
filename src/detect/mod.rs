mod backend;
mod backends;
mod registry;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
pub use registry::BackendRegistry;
