//! Path helpers: Windows path resolution and file-system searching.

mod searcher;
mod windows_path;

pub use searcher::{FileSystemSearcher, FindSpec, SearchIter};
pub use windows_path::WindowsPathResolver;
