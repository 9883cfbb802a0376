//! Case evaluation agent.
//!
//! The orchestrator runs the ReAct loop and delegates to the image and text
//! analyzers, which share one completion client.

pub mod extraction;
pub mod image_analyzer;
pub mod info;
pub mod orchestrator;
pub mod state;
pub mod text_analyzer;

pub use info::StdinInfoProvider;
pub use orchestrator::Orchestrator;
