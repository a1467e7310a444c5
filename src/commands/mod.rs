//! Front-end operations, organized by concern.
//!
//! - `logic`: register/remove ports, input parsing, status rows and paging
//! - `menu`: the interactive menu driving `logic`
//! - `service`: systemd unit rendering and installation
//! - `table`: plain-text status table

pub mod logic;
pub mod menu;
pub mod service;
pub mod table;
