// ABOUTME: Library crate for commit-canvas - git task orchestration, change-set analysis
// and credential verification, consumed by the canvas binary and integration tests

#![allow(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod git;
pub mod models;
pub mod process;
pub mod tasks;
