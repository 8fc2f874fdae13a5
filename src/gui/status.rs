//! Status Presenter
//!
//! The message line and the status panel that frame it. Both carry the
//! same tone; setting a tone always clears the other one.

use tokio::sync::watch;

/// Visual tone of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusKind {
    #[default]
    None,
    Success,
    Error,
}

/// Anything that can display a status message
pub trait StatusPresenter: Send + Sync {
    fn set_status(&self, text: &str, kind: StatusKind);
}

/// What is currently on screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusView {
    pub text: String,
    pub kind: StatusKind,
    /// Tone of the message element
    pub message_tone: StatusKind,
    /// Tone of the surrounding panel
    pub panel_tone: StatusKind,
}

/// Presenter backed by a watch channel so renderers can follow changes
pub struct StatusBoard {
    tx: watch::Sender<StatusView>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusView::default());
        Self { tx }
    }

    pub fn current(&self) -> StatusView {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.tx.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPresenter for StatusBoard {
    fn set_status(&self, text: &str, kind: StatusKind) {
        self.tx.send_modify(|view| {
            view.text = text.to_string();
            view.kind = kind;
            view.message_tone = StatusKind::None;
            view.panel_tone = StatusKind::None;
            if kind != StatusKind::None {
                view.message_tone = kind;
                view.panel_tone = kind;
            }
        });
    }
}
