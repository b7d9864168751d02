pub mod pane;
pub mod reload;
pub mod window;

pub use pane::Pane;
pub use window::SlidingWindow;
