//! Story Engine — branching interactive fiction as a graph of scenes.
//!
//! Stories are directed graphs of scenes connected by choices. The engine
//! plays them (history, back-navigation, variable accumulation, conditional
//! gating, endings), lays them out as leveled graphs for authoring views,
//! and checks them for broken references before anyone reads them.

pub mod core;
pub mod schema;
