pub mod canvas;
pub mod renderer;

pub use renderer::Renderer;
