// ABOUTME: Root library for the roundtable command line tool
// ABOUTME: Wires a discussion file into the orchestration core and renders transcripts

pub mod app;
pub mod capabilities;
pub mod telemetry;

pub use app::{render_message, render_transcript, Session};
pub use capabilities::builtin_capabilities;
