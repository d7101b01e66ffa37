pub mod error;
pub mod widget;

pub use error::*;
pub use widget::*;
