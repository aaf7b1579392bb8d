pub mod diagram_cache;

pub use diagram_cache::DiagramCache;
