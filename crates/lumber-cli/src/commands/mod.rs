//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`view`] - Paging and following a log file
//! - [`generate`] - Synthetic log generation

pub mod generate;
pub mod view;

pub use generate::GenerateCommand;
pub use view::ViewCommand;
