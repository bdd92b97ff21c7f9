pub mod image_file_surface;
pub mod memory_surface;
