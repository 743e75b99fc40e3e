pub mod cache;
pub mod cancel;
pub mod console;
pub mod error;
pub mod image;
pub mod merge;
pub mod package;
pub mod platform;
pub mod repository;
pub mod resolve;

pub use cancel::CancellationToken;
pub use error::{DependencyError, ImagoError};
pub use image::{ImageIdentifier, ImageSpecifier, ImageSpecifierBuilder};
pub use platform::CpuArchitecture;

pub type Result<T> = std::result::Result<T, ImagoError>;
