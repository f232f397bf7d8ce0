//! Analysis logic for instruction counts
//!
//! This module contains pure business logic for ranking and summarizing
//! registry contents, separated from the CLI presentation layer.

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{analyze_hotspots, InstructionHotspot, SizeProfile};
