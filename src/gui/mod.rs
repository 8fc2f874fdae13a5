//! Terminal Front-end
//!
//! Status presentation and the line-based console the kiosk and admin
//! pages are driven from.

pub mod console;
pub mod status;

pub use console::{parse_admin_command, parse_kiosk_command, run_status_renderer};
pub use status::{StatusBoard, StatusKind, StatusPresenter};
