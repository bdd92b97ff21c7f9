pub mod compositor;
pub mod output_surface;
