use crate::api::{ApiClient, FolderListing};
use crate::error::ApiError;
use crate::folders::{sanitize_folder_name, FolderBrowser};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, PartialEq)]
enum Screen {
    Loading,
    Browsing,
    EnterName,
    Creating,
    Error(String),
    /// Picker closed; carries the chosen folder, if any.
    Done(Option<String>),
}

struct Picker {
    screen: Screen,
    browser: FolderBrowser,
    listing: Option<FolderListing>,
    selected: usize,
    new_name: String,
    error_message: Option<String>,
}

impl Picker {
    fn new(start: &str) -> Self {
        Self {
            screen: Screen::Loading,
            browser: FolderBrowser::at(start),
            listing: None,
            selected: 0,
            new_name: String::new(),
            error_message: None,
        }
    }

    fn highlighted(&self) -> Option<&str> {
        self.listing
            .as_ref()
            .and_then(|l| l.folders.get(self.selected))
            .map(|f| f.path.as_str())
    }

    fn folder_count(&self) -> usize {
        self.listing.as_ref().map(|l| l.folders.len()).unwrap_or(0)
    }

    fn handle_key(&mut self, code: KeyCode) {
        if code == KeyCode::Esc {
            self.screen = match self.screen {
                Screen::EnterName => {
                    self.new_name.clear();
                    self.error_message = None;
                    Screen::Browsing
                }
                _ => Screen::Done(None),
            };
            return;
        }

        match &self.screen {
            Screen::Browsing => match code {
                KeyCode::Up => {
                    self.selected = self.selected.saturating_sub(1);
                }
                KeyCode::Down => {
                    if self.selected + 1 < self.folder_count() {
                        self.selected += 1;
                    }
                }
                KeyCode::Enter => {
                    if let Some(path) = self.highlighted().map(str::to_string) {
                        self.browser.descend(&path);
                        self.screen = Screen::Loading;
                    }
                }
                KeyCode::Backspace => {
                    if self.browser.go_up() {
                        self.screen = Screen::Loading;
                    }
                }
                KeyCode::Char('s') => {
                    self.screen = Screen::Done(Some(self.browser.current_path.clone()));
                }
                KeyCode::Char('u') => {
                    if let Some(path) = self.highlighted().map(str::to_string) {
                        self.screen = Screen::Done(Some(path));
                    }
                }
                KeyCode::Char('n') => {
                    self.new_name.clear();
                    self.error_message = None;
                    self.screen = Screen::EnterName;
                }
                _ => {}
            },
            Screen::EnterName => {
                self.error_message = None;
                match code {
                    KeyCode::Char(c) => self.new_name.push(c),
                    KeyCode::Backspace => {
                        self.new_name.pop();
                    }
                    KeyCode::Enter => {
                        if sanitize_folder_name(&self.new_name).is_none() {
                            self.error_message = Some("folder name required".to_string());
                        } else {
                            self.screen = Screen::Creating;
                        }
                    }
                    _ => {}
                }
            }
            Screen::Error(_) => {
                if code == KeyCode::Char('r') {
                    self.screen = Screen::Loading;
                }
            }
            _ => {}
        }
    }
}

/// Browse remote folders interactively. Returns the chosen folder path, or
/// `None` if the user quit without choosing.
pub async fn pick_folder(api: &ApiClient, token: &str, start: &str) -> anyhow::Result<Option<String>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut picker = Picker::new(start);
    let result = run_picker(&mut terminal, &mut picker, api, token).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_picker(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    picker: &mut Picker,
    api: &ApiClient,
    token: &str,
) -> anyhow::Result<Option<String>> {
    loop {
        terminal.draw(|f| ui(f, picker))?;

        match &picker.screen {
            Screen::Loading => {
                match picker.browser.list(api, token).await {
                    Ok(listing) => {
                        picker.listing = Some(listing);
                        picker.selected = 0;
                        picker.screen = Screen::Browsing;
                    }
                    Err(ApiError::AuthExpired) => return Err(ApiError::AuthExpired.into()),
                    Err(e) => picker.screen = Screen::Error(e.to_string()),
                }
                continue;
            }
            Screen::Creating => {
                let name = std::mem::take(&mut picker.new_name);
                match picker.browser.create(api, token, &name).await {
                    Ok(path) => picker.screen = Screen::Done(Some(path)),
                    Err(ApiError::AuthExpired) => return Err(ApiError::AuthExpired.into()),
                    Err(e) => picker.screen = Screen::Error(e.to_string()),
                }
                continue;
            }
            Screen::Done(choice) => return Ok(choice.clone()),
            _ => {}
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    picker.handle_key(key.code);
                }
            }
        }
    }
}

fn ui(f: &mut Frame, picker: &Picker) {
    let area = f.area();

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(0)])
        .split(area);

    let current = if picker.browser.current_path.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", picker.browser.current_path)
    };
    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled("docsearch folders", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(format!("* {}", current)),
        Line::from(""),
    ];

    match &picker.screen {
        Screen::Loading => lines.push(Line::from("loading...")),
        Screen::Creating => lines.push(Line::from("creating folder...")),
        Screen::Browsing | Screen::EnterName => {
            let folders = picker.listing.as_ref().map(|l| l.folders.as_slice()).unwrap_or(&[]);
            if folders.is_empty() {
                lines.push(Line::from("  (no subfolders)"));
            }
            for (i, folder) in folders.iter().enumerate() {
                let text = format!("{:<32} {:>6}", folder.name, folder.count);
                if i == picker.selected {
                    lines.push(Line::from(Span::styled(
                        format!("> {}", text),
                        Style::default().add_modifier(Modifier::REVERSED),
                    )));
                } else {
                    lines.push(Line::from(format!("  {}", text)));
                }
            }
            lines.push(Line::from(""));
            if picker.screen == Screen::EnterName {
                lines.push(Line::from(format!("> new folder: {}_", picker.new_name)));
                if let Some(err) = &picker.error_message {
                    lines.push(Line::from(format!("  ! {}", err)));
                }
                lines.push(Line::from("[enter] create  [esc] cancel"));
            } else {
                lines.push(Line::from(
                    "[enter] open  [backspace] up  [s] select current  [u] use highlighted  [n] new  [esc] quit",
                ));
            }
        }
        Screen::Error(e) => {
            lines.push(Line::from("! request failed"));
            lines.push(Line::from(""));
            lines.push(Line::from(e.as_str()));
            lines.push(Line::from(""));
            lines.push(Line::from("[r] retry  [esc] quit"));
        }
        Screen::Done(_) => lines.push(Line::from("done")),
    }

    f.render_widget(Paragraph::new(lines), layout[0]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FolderEntry;

    fn browsing(at: &str, names: &[&str]) -> Picker {
        let mut picker = Picker::new(at);
        picker.listing = Some(FolderListing {
            breadcrumb: Vec::new(),
            folders: names
                .iter()
                .map(|n| FolderEntry {
                    name: n.to_string(),
                    path: format!("{}{}/", at, n),
                    count: 0,
                })
                .collect(),
            time_ms: None,
        });
        picker.screen = Screen::Browsing;
        picker
    }

    #[test]
    fn test_enter_descends_into_highlighted() {
        let mut picker = browsing("2024/", &["BBVA", "BCP"]);
        picker.handle_key(KeyCode::Down);
        picker.handle_key(KeyCode::Down);
        assert_eq!(picker.selected, 1);
        picker.handle_key(KeyCode::Enter);
        assert_eq!(picker.browser.current_path, "2024/BCP/");
        assert_eq!(picker.screen, Screen::Loading);
    }

    #[test]
    fn test_backspace_at_root_stays() {
        let mut picker = browsing("", &["2024"]);
        picker.handle_key(KeyCode::Backspace);
        assert_eq!(picker.screen, Screen::Browsing);

        let mut picker = browsing("2024/", &[]);
        picker.handle_key(KeyCode::Backspace);
        assert_eq!(picker.browser.current_path, "");
        assert_eq!(picker.screen, Screen::Loading);
    }

    #[test]
    fn test_select_current_and_highlighted() {
        let mut picker = browsing("2024/", &["BCP"]);
        picker.handle_key(KeyCode::Char('s'));
        assert_eq!(picker.screen, Screen::Done(Some("2024/".into())));

        let mut picker = browsing("2024/", &["BCP"]);
        picker.handle_key(KeyCode::Char('u'));
        assert_eq!(picker.screen, Screen::Done(Some("2024/BCP/".into())));

        let mut picker = browsing("2024/", &[]);
        picker.handle_key(KeyCode::Char('u'));
        assert_eq!(picker.screen, Screen::Browsing);
    }

    #[test]
    fn test_new_folder_name_validated() {
        let mut picker = browsing("2024/", &[]);
        picker.handle_key(KeyCode::Char('n'));
        for c in "??".chars() {
            picker.handle_key(KeyCode::Char(c));
        }
        picker.handle_key(KeyCode::Enter);
        assert_eq!(picker.screen, Screen::EnterName);
        assert!(picker.error_message.is_some());

        picker.handle_key(KeyCode::Backspace);
        picker.handle_key(KeyCode::Backspace);
        for c in "Enero".chars() {
            picker.handle_key(KeyCode::Char(c));
        }
        picker.handle_key(KeyCode::Enter);
        assert_eq!(picker.screen, Screen::Creating);
        assert_eq!(picker.new_name, "Enero");
    }

    #[test]
    fn test_esc_cancels_name_then_quits() {
        let mut picker = browsing("", &[]);
        picker.handle_key(KeyCode::Char('n'));
        picker.handle_key(KeyCode::Esc);
        assert_eq!(picker.screen, Screen::Browsing);
        picker.handle_key(KeyCode::Esc);
        assert_eq!(picker.screen, Screen::Done(None));
    }
}
