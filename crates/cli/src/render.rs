//! Terminal rendering of progress views.

use cvflow_core::presentation::{BarColor, ProgressView, ResultAction};
use cvflow_progress::events::ConnectionState;

const BAR_WIDTH: usize = 20;

/// One status line, e.g. `[####------] 40% Extracting CV data...`.
pub fn progress_line(view: &ProgressView) -> String {
    let filled = usize::from(view.percentage) * BAR_WIDTH / 100;
    let fill = match view.color {
        BarColor::Green => '=',
        BarColor::Red => '!',
        BarColor::Blue => '#',
    };
    let bar: String = std::iter::repeat(fill)
        .take(filled)
        .chain(std::iter::repeat('-').take(BAR_WIDTH - filled))
        .collect();
    format!("[{bar}] {:>3}% {}", view.percentage, view.message)
}

pub fn action_line(action: &ResultAction) -> String {
    match action {
        ResultAction::Download { path } => format!("Download: {path}"),
        ResultAction::ViewOnline { url } => format!("View online: {url}"),
    }
}

/// Describe a connection change worth telling the user about.
pub fn connection_line(connection: &ConnectionState) -> Option<String> {
    if connection.retry_available {
        return Some("Connection lost and automatic reconnect failed".to_string());
    }
    if connection.reconnect_pending {
        let reason = connection.last_error.as_deref().unwrap_or("connection closed");
        return Some(format!("Reconnecting ({reason})"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvflow_core::stage::Stage;
    use serde_json::json;

    #[test]
    fn bar_tracks_percentage() {
        let view =
            ProgressView::new(&Stage::Extracting, 40.0, "Extracting CV data...", false, None);
        assert_eq!(
            progress_line(&view),
            "[########------------]  40% Extracting CV data..."
        );
    }

    #[test]
    fn completed_bar_is_full() {
        let result = json!({"pdf_path": "/x.pdf"});
        let view = ProgressView::new(&Stage::Completed, 100.0, "", true, Some(&result));
        assert!(progress_line(&view).starts_with("[====================] 100%"));
        assert_eq!(action_line(&view.actions[0]), "Download: /x.pdf");
    }

    #[test]
    fn quiet_while_connected() {
        assert_eq!(connection_line(&ConnectionState::default()), None);
        let pending = ConnectionState {
            reconnect_pending: true,
            last_error: Some("reset".into()),
            ..Default::default()
        };
        assert_eq!(connection_line(&pending).as_deref(), Some("Reconnecting (reset)"));
    }
}
