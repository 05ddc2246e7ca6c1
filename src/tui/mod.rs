//! In-call terminal user interface
//!
//! Renders the call session snapshot using Ratatui.

mod app;
mod ui;

pub use app::run;
