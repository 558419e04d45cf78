//! Terminal presentation for the reader: key mapping and kitty image output.

mod input;
mod kitty;

pub use input::{EventMapper, InputMode, UiEvent};
pub use kitty::{write_status_line, DrawParams, KittyRenderer};
