//! RenderAI: architectural rendering on top of a hosted image model.
//!
//! The GUI (`app`) and the headless runner (`cli`) share the same session
//! state (`project`) and orchestrator (`ops::generation`).

#[macro_use]
pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;
