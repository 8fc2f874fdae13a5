//! Console rendering and command parsing

use std::path::PathBuf;
use tokio::sync::watch;

use super::status::{StatusKind, StatusView};
use crate::admin::AdminAction;
use crate::app::UiAction;

/// One-line rendering of a status view
pub fn render_status(view: &StatusView) -> String {
    match view.kind {
        StatusKind::None => format!("[ .. ] {}", view.text),
        StatusKind::Success => format!("[ OK ] {}", view.text),
        StatusKind::Error => format!("[FAIL] {}", view.text),
    }
}

/// Print every status change until the board goes away
pub async fn run_status_renderer(mut rx: watch::Receiver<StatusView>) {
    while rx.changed().await.is_ok() {
        let line = render_status(&rx.borrow_and_update());
        println!("{}", line);
    }
}

/// Kiosk console: empty line presses Verify, `code <text>` types into the
/// manual field, `quit` leaves.
pub fn parse_kiosk_command(line: &str) -> Option<UiAction> {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("verify") {
        return Some(UiAction::Verify);
    }
    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        return Some(UiAction::Quit);
    }
    match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) if cmd.eq_ignore_ascii_case("code") => {
            Some(UiAction::EnterCode(rest.trim().to_string()))
        }
        _ if line.eq_ignore_ascii_case("code") => Some(UiAction::EnterCode(String::new())),
        _ => None,
    }
}

/// Admin console commands
pub fn parse_admin_command(line: &str) -> Option<AdminAction> {
    let line = line.trim();
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };
    match (cmd.to_ascii_lowercase().as_str(), arg) {
        ("start", _) => Some(AdminAction::StartCamera),
        ("snap", _) => Some(AdminAction::CaptureSnapshot),
        ("clear", _) => Some(AdminAction::ClearSnapshot),
        ("file", path) if !path.is_empty() => Some(AdminAction::SelectFile(PathBuf::from(path))),
        ("preview", path) if !path.is_empty() => {
            Some(AdminAction::SavePreview(PathBuf::from(path)))
        }
        ("quit", _) | ("exit", _) => Some(AdminAction::Quit),
        _ => None,
    }
}
