//! Utility functions and types

pub mod data_loader;

pub use data_loader::{panel_from_frame, snapshot_from_frame, DataLoader, PanelSummary};
