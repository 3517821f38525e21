//! UI panels

mod editor;
mod step_grid;
mod transport;

pub use editor::{EditorAction, EditorPanel};
pub use step_grid::StepGridPanel;
pub use transport::{TransportAction, TransportPanel};
