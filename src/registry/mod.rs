//! Package registry access and tarball extraction

pub mod npm;
pub mod tarball;

pub use npm::{plugin_tarball_path, NpmRegistry, PackageFetcher, PublishedVersion, SearchHit};
pub use tarball::extract_tarball;
