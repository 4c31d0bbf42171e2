mod goku_file;

pub use goku_file::GokuFileFrontend;
