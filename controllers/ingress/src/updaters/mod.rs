//! Updaters shipped with the controller binary.

pub mod file;

pub use file::FileUpdater;
