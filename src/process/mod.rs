// ABOUTME: Child process execution with line streaming, byte accounting and reaping cancellation

pub mod runner;

pub use runner::{
    CommandSpec, LineSplitter, OutputLine, OutputStream, ProcessError, ProcessHandle, ProcessRunner,
};
