pub mod generation;
pub mod renderer;
pub mod view_session;

pub use generation::{Generation, GenerationGuard};
pub use renderer::{ChannelRenderer, RenderEvent, RenderedItem, Renderer};
pub use view_session::{FillOutcome, SessionSnapshot, ViewSession, Viewport};
