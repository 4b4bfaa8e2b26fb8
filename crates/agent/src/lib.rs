//! The Driftline agent: bounded tool iterations around a chat model.
//!
//! [`AgentLoop`] seeds a working message list from conversation memory,
//! probes the model for tool calls, executes web searches on request, and
//! streams the final answer back to the shell. Tool-call detection lives in
//! [`tool_call`] as a pure parsing function.

pub mod loop_runner;
pub mod tool_call;

pub use loop_runner::{AgentLoop, DateTimeFn};
pub use tool_call::{ToolDirective, parse_tool_directive};
