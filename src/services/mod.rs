mod files;

pub use files::{pdf_placeholder, read_files, FileDescriptor};
