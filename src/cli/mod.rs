// IntelliPest 🌿 AGPL-3.0 License

//! CLI module for running pest detection.
//!
//! This module contains the command-line interface logic, including
//! argument parsing and the `predict` command implementation.

// Modules
/// CLI arguments.
pub mod args;

/// Console output helpers.
pub mod logging;

/// Prediction logic.
pub mod predict;
