use crate::app::App;
use crate::auth::AuthState;
use crate::codec::{self, FilterDraft, Rule};
use crate::models::CredentialSet;
use crate::notify::Severity;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use tui_textarea::{CursorMove, TextArea};

const SECRET_MASK: char = '•';

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum View {
    #[default]
    Filters,
    NewFilter,
    Settings,
}

impl View {
    const ALL: [View; 3] = [View::Filters, View::NewFilter, View::Settings];

    fn title(self) -> &'static str {
        match self {
            View::Filters => "Filters",
            View::NewFilter => "New Filter",
            View::Settings => "Settings",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum FormField {
    #[default]
    From,
    To,
    Subject,
    Query,
    HasAttachment,
    ExcludeChats,
    AddLabels,
    RemoveLabels,
    Forward,
    MarkAsRead,
    MarkAsImportant,
    Delete,
    NeverSpam,
}

impl FormField {
    const ORDER: [FormField; 13] = [
        FormField::From,
        FormField::To,
        FormField::Subject,
        FormField::Query,
        FormField::HasAttachment,
        FormField::ExcludeChats,
        FormField::AddLabels,
        FormField::RemoveLabels,
        FormField::Forward,
        FormField::MarkAsRead,
        FormField::MarkAsImportant,
        FormField::Delete,
        FormField::NeverSpam,
    ];

    fn position(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ORDER[(self.position() + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Self {
        Self::ORDER[(self.position() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }

    fn title(self) -> &'static str {
        match self {
            FormField::From => "From",
            FormField::To => "To",
            FormField::Subject => "Subject",
            FormField::Query => "Has the words",
            FormField::HasAttachment => "Has attachment",
            FormField::ExcludeChats => "Don't include chats",
            FormField::AddLabels => "Apply labels",
            FormField::RemoveLabels => "Remove labels",
            FormField::Forward => "Forward to",
            FormField::MarkAsRead => "Mark as read",
            FormField::MarkAsImportant => "Mark as important",
            FormField::Delete => "Delete it",
            FormField::NeverSpam => "Never send it to Spam",
        }
    }

    pub fn is_label_picker(self) -> bool {
        matches!(self, FormField::AddLabels | FormField::RemoveLabels)
    }

    pub fn is_text(self) -> bool {
        matches!(
            self,
            FormField::From
                | FormField::To
                | FormField::Subject
                | FormField::Query
                | FormField::Forward
        )
    }
}

fn draft_text_mut(draft: &mut FilterDraft, field: FormField) -> Option<&mut String> {
    match field {
        FormField::From => Some(&mut draft.criteria.from),
        FormField::To => Some(&mut draft.criteria.to),
        FormField::Subject => Some(&mut draft.criteria.subject),
        FormField::Query => Some(&mut draft.criteria.query),
        FormField::Forward => Some(&mut draft.action.forward),
        _ => None,
    }
}

fn draft_flag(draft: &FilterDraft, field: FormField) -> Option<bool> {
    match field {
        FormField::HasAttachment => Some(draft.criteria.has_attachment),
        FormField::ExcludeChats => Some(draft.criteria.exclude_chats),
        FormField::MarkAsRead => Some(draft.action.mark_as_read),
        FormField::MarkAsImportant => Some(draft.action.mark_as_important),
        FormField::Delete => Some(draft.action.delete),
        FormField::NeverSpam => Some(draft.action.never_spam),
        _ => None,
    }
}

fn draft_flag_mut(draft: &mut FilterDraft, field: FormField) -> Option<&mut bool> {
    match field {
        FormField::HasAttachment => Some(&mut draft.criteria.has_attachment),
        FormField::ExcludeChats => Some(&mut draft.criteria.exclude_chats),
        FormField::MarkAsRead => Some(&mut draft.action.mark_as_read),
        FormField::MarkAsImportant => Some(&mut draft.action.mark_as_important),
        FormField::Delete => Some(&mut draft.action.delete),
        FormField::NeverSpam => Some(&mut draft.action.never_spam),
        _ => None,
    }
}

fn draft_label_ids(draft: &FilterDraft, field: FormField) -> Option<&Vec<String>> {
    match field {
        FormField::AddLabels => Some(&draft.action.add_label_ids),
        FormField::RemoveLabels => Some(&draft.action.remove_label_ids),
        _ => None,
    }
}

fn draft_label_ids_mut(draft: &mut FilterDraft, field: FormField) -> Option<&mut Vec<String>> {
    match field {
        FormField::AddLabels => Some(&mut draft.action.add_label_ids),
        FormField::RemoveLabels => Some(&mut draft.action.remove_label_ids),
        _ => None,
    }
}

fn single_line<'a>(text: &str) -> TextArea<'a> {
    let mut textarea = TextArea::from([text.to_string()]);
    textarea.set_cursor_line_style(Style::default());
    textarea.move_cursor(CursorMove::End);
    textarea
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    }
}

fn style_field(textarea: &mut TextArea<'_>, title: &str, focused: bool) {
    textarea.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", title))
            .border_style(focus_style(focused)),
    );
    textarea.set_cursor_style(if focused {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    });
}

/// Text inputs of the new-filter screen. Toggles and label selections live
/// directly in the app's draft.
pub struct FilterForm<'a> {
    pub from: TextArea<'a>,
    pub to: TextArea<'a>,
    pub subject: TextArea<'a>,
    pub query: TextArea<'a>,
    pub forward: TextArea<'a>,
    pub focused: FormField,
    pub label_cursor: usize,
}

impl<'a> FilterForm<'a> {
    pub fn from_draft(draft: &FilterDraft) -> Self {
        Self {
            from: single_line(&draft.criteria.from),
            to: single_line(&draft.criteria.to),
            subject: single_line(&draft.criteria.subject),
            query: single_line(&draft.criteria.query),
            forward: single_line(&draft.action.forward),
            focused: FormField::default(),
            label_cursor: 0,
        }
    }

    pub fn text_field_mut(&mut self, field: FormField) -> Option<&mut TextArea<'a>> {
        match field {
            FormField::From => Some(&mut self.from),
            FormField::To => Some(&mut self.to),
            FormField::Subject => Some(&mut self.subject),
            FormField::Query => Some(&mut self.query),
            FormField::Forward => Some(&mut self.forward),
            _ => None,
        }
    }

    pub fn focus(&mut self, field: FormField) {
        self.focused = field;
        self.label_cursor = 0;
    }

    /// Copies the focused text input into the draft.
    pub fn sync_focused(&mut self, draft: &mut FilterDraft) {
        let field = self.focused;
        if let (Some(textarea), Some(target)) =
            (self.text_field_mut(field), draft_text_mut(draft, field))
        {
            *target = textarea.lines().join("");
        }
    }

    /// Flips the focused checkbox, or the label under the cursor when a label
    /// picker is focused. `label_ids` are the ids the picker lists.
    pub fn toggle_focused(&self, draft: &mut FilterDraft, label_ids: &[&str]) {
        if let Some(flag) = draft_flag_mut(draft, self.focused) {
            *flag = !*flag;
            return;
        }

        let Some(id) = label_ids.get(self.label_cursor) else {
            return;
        };
        if let Some(ids) = draft_label_ids_mut(draft, self.focused) {
            if let Some(pos) = ids.iter().position(|existing| existing == id) {
                ids.remove(pos);
            } else {
                ids.push(id.to_string());
            }
        }
    }

    pub fn move_label_cursor(&mut self, down: bool, label_count: usize) {
        if down {
            if self.label_cursor + 1 < label_count {
                self.label_cursor += 1;
            }
        } else {
            self.label_cursor = self.label_cursor.saturating_sub(1);
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum SettingsField {
    #[default]
    ClientId,
    ClientSecret,
    RedirectUri,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::ClientId => SettingsField::ClientSecret,
            SettingsField::ClientSecret => SettingsField::RedirectUri,
            SettingsField::RedirectUri => SettingsField::ClientId,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SettingsField::ClientId => SettingsField::RedirectUri,
            SettingsField::ClientSecret => SettingsField::ClientId,
            SettingsField::RedirectUri => SettingsField::ClientSecret,
        }
    }
}

pub struct SettingsForm<'a> {
    pub client_id: TextArea<'a>,
    pub client_secret: TextArea<'a>,
    pub redirect_uri: TextArea<'a>,
    pub focused: SettingsField,
    pub reveal_secret: bool,
}

impl<'a> SettingsForm<'a> {
    pub fn from_credentials(credentials: &CredentialSet) -> Self {
        let mut client_secret = single_line(&credentials.client_secret);
        client_secret.set_mask_char(SECRET_MASK);
        Self {
            client_id: single_line(&credentials.client_id),
            client_secret,
            redirect_uri: single_line(&credentials.redirect_uri),
            focused: SettingsField::default(),
            reveal_secret: false,
        }
    }

    pub fn to_credentials(&self) -> CredentialSet {
        CredentialSet {
            client_id: self.client_id.lines().join(""),
            client_secret: self.client_secret.lines().join(""),
            redirect_uri: self.redirect_uri.lines().join(""),
        }
    }

    pub fn focused_textarea(&mut self) -> &mut TextArea<'a> {
        match self.focused {
            SettingsField::ClientId => &mut self.client_id,
            SettingsField::ClientSecret => &mut self.client_secret,
            SettingsField::RedirectUri => &mut self.redirect_uri,
        }
    }

    pub fn toggle_reveal(&mut self) {
        self.reveal_secret = !self.reveal_secret;
        if self.reveal_secret {
            self.client_secret.clear_mask_char();
        } else {
            self.client_secret.set_mask_char(SECRET_MASK);
        }
    }
}

pub struct UIState<'a> {
    pub view: View,
    pub selected_filter: usize,
    pub filters_list_state: ListState,
    /// Filter awaiting a yes/no answer before it is deleted.
    pub pending_delete: Option<String>,
    pub form: FilterForm<'a>,
    pub settings: SettingsForm<'a>,
}

impl<'a> UIState<'a> {
    pub fn new(app: &App) -> Self {
        Self {
            view: View::default(),
            selected_filter: 0,
            filters_list_state: ListState::default(),
            pending_delete: None,
            form: FilterForm::from_draft(&app.draft),
            settings: SettingsForm::from_credentials(&app.credentials),
        }
    }

    pub fn clamp_selection(&mut self, filter_count: usize) {
        if self.selected_filter >= filter_count {
            self.selected_filter = filter_count.saturating_sub(1);
        }
    }

    pub fn selected_filter_id(&self, app: &App) -> Option<String> {
        app.store
            .filters()
            .get(self.selected_filter)
            .and_then(|f| f.id.clone())
    }

    /// Whether plain keystrokes should go to a text input.
    pub fn is_editing_text(&self, app: &App) -> bool {
        match self.view {
            View::Filters => false,
            View::NewFilter => app.is_authenticated() && self.form.focused.is_text(),
            View::Settings => true,
        }
    }
}

pub fn render(f: &mut Frame, app: &App, state: &mut UIState<'_>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(f.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(24), Constraint::Min(0)])
        .split(rows[0]);

    render_navigation(f, app, state.view, columns[0]);

    match state.view {
        View::Filters => render_filters(f, app, state, columns[1]),
        View::NewFilter => render_new_filter(f, app, state, columns[1]),
        View::Settings => render_settings(f, app, state, columns[1]),
    }

    let hint = match state.view {
        View::Filters => " F1-F3 switch view · j/k move · r refresh · d delete · q quit",
        View::NewFilter => " Tab next field · Space toggle · Ctrl-S create filter · Ctrl-Q quit",
        View::Settings => concat!(
            " Tab next field · Ctrl-S save · Ctrl-O connect",
            " · Ctrl-R check status · Ctrl-T show secret"
        ),
    };
    f.render_widget(
        Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)),
        rows[1],
    );

    if state.pending_delete.is_some() {
        render_delete_confirmation(f);
    }

    render_notification(f, app);
}

fn render_navigation(f: &mut Frame, app: &App, current: View, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Gmail Filters ")
        .border_style(Style::default().fg(Color::Gray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);

    let items: Vec<ListItem> = View::ALL
        .iter()
        .enumerate()
        .map(|(i, view)| {
            let style = if *view == current {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("F{} {}", i + 1, view.title())).style(style)
        })
        .collect();
    f.render_widget(List::new(items), chunks[0]);

    let (text, color) = match app.auth.state() {
        AuthState::Authenticated => ("● Connected", Color::Green),
        AuthState::CredentialsSavedUnauthenticated => ("● Not connected", Color::Yellow),
        AuthState::NoCredentials => ("● No credentials", Color::Red),
    };
    f.render_widget(
        Paragraph::new(text).style(Style::default().fg(color)),
        chunks[1],
    );
}

fn render_signed_out(f: &mut Frame, title: &str, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", title))
        .border_style(Style::default().fg(Color::Gray));
    let msg = Paragraph::new(concat!(
        "Not connected to Gmail.\n\n",
        "Save your OAuth client credentials and connect from Settings (F3)."
    ))
    .block(block)
    .style(Style::default().fg(Color::DarkGray))
    .wrap(Wrap { trim: true });
    f.render_widget(msg, area);
}

fn filter_item(filter_id: &str, rules: &[Rule], app: &App, selected: bool) -> ListItem<'static> {
    let lookup = app.store.label_lookup();
    let indicator = if selected { "█" } else { " " };
    let mut lines = vec![Line::from(Span::styled(
        format!("{} Filter {}", indicator, filter_id),
        Style::default().add_modifier(Modifier::BOLD),
    ))];

    let (criteria, actions): (Vec<&Rule>, Vec<&Rule>) =
        rules.iter().partition(|r| r.is_criterion());
    for (heading, group) in [("Matches", criteria), ("Actions", actions)] {
        if group.is_empty() {
            continue;
        }
        lines.push(Line::from(format!("{}   {}:", indicator, heading)));
        for rule in group {
            lines.push(Line::from(format!(
                "{}     {}",
                indicator,
                rule.describe(&lookup)
            )));
        }
    }

    let style = if selected {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    ListItem::new(Text::from(lines)).style(style)
}

fn render_filters(f: &mut Frame, app: &App, state: &mut UIState<'_>, area: Rect) {
    if !app.is_authenticated() {
        render_signed_out(f, "Filters", area);
        return;
    }

    let filters = app.store.filters();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Filters ({}) ", filters.len()))
        .border_style(focus_style(state.pending_delete.is_none()));

    if filters.is_empty() {
        let msg = Paragraph::new("No filters yet. Press F2 to create one.")
            .block(block)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(msg, area);
        return;
    }

    let separator = "─".repeat(area.width.saturating_sub(4) as usize);
    let mut items: Vec<ListItem> = Vec::new();
    for (i, filter) in filters.iter().enumerate() {
        let rules = codec::decode(filter);
        let id = filter.id.as_deref().unwrap_or("(unsaved)");
        items.push(filter_item(id, &rules, app, i == state.selected_filter));
        if i + 1 < filters.len() {
            items.push(
                ListItem::new(separator.clone()).style(Style::default().fg(Color::DarkGray)),
            );
        }
    }

    // Every filter but the last is followed by a separator item.
    state
        .filters_list_state
        .select(Some(state.selected_filter * 2));
    f.render_stateful_widget(List::new(items).block(block), area, &mut state.filters_list_state);
}

fn checkbox(draft: &FilterDraft, field: FormField, focused: FormField) -> Paragraph<'static> {
    let checked = draft_flag(draft, field).unwrap_or(false);
    let marker = if focused == field { "›" } else { " " };
    Paragraph::new(format!(
        "{} [{}] {}",
        marker,
        if checked { "x" } else { " " },
        field.title()
    ))
    .style(focus_style(focused == field))
}

fn render_label_picker(
    f: &mut Frame,
    app: &App,
    form: &FilterForm<'_>,
    field: FormField,
    area: Rect,
) {
    let focused = form.focused == field;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", field.title()))
        .border_style(focus_style(focused));

    let chosen = draft_label_ids(&app.draft, field).map(Vec::as_slice).unwrap_or(&[]);
    let items: Vec<ListItem> = app
        .store
        .assignable_labels()
        .map(|label| {
            let checked = chosen.contains(&label.id);
            ListItem::new(format!(
                "[{}] {}",
                if checked { "x" } else { " " },
                label.display_name()
            ))
        })
        .collect();

    if items.is_empty() {
        let msg = Paragraph::new("No user labels")
            .block(block)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(msg, area);
        return;
    }

    let mut list_state = ListState::default();
    if focused {
        list_state.select(Some(form.label_cursor));
    }
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_stateful_widget(list, area, &mut list_state);
}

fn render_new_filter(f: &mut Frame, app: &App, state: &mut UIState<'_>, area: Rect) {
    if !app.is_authenticated() {
        render_signed_out(f, "New Filter", area);
        return;
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" New Filter ")
        .border_style(Style::default().fg(Color::Gray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // From
            Constraint::Length(3), // To
            Constraint::Length(3), // Subject
            Constraint::Length(3), // Query
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(halves[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(4),
            Constraint::Min(4),
            Constraint::Length(3), // Forward
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(halves[1]);

    let focused = state.form.focused;
    let form = &mut state.form;
    for (field, rect) in [
        (FormField::From, left[0]),
        (FormField::To, left[1]),
        (FormField::Subject, left[2]),
        (FormField::Query, left[3]),
        (FormField::Forward, right[2]),
    ] {
        if let Some(textarea) = form.text_field_mut(field) {
            style_field(textarea, field.title(), focused == field);
            f.render_widget(&*textarea, rect);
        }
    }

    f.render_widget(checkbox(&app.draft, FormField::HasAttachment, focused), left[4]);
    f.render_widget(checkbox(&app.draft, FormField::ExcludeChats, focused), left[5]);

    render_label_picker(f, app, form, FormField::AddLabels, right[0]);
    render_label_picker(f, app, form, FormField::RemoveLabels, right[1]);

    for (field, rect) in [
        (FormField::MarkAsRead, right[3]),
        (FormField::MarkAsImportant, right[4]),
        (FormField::Delete, right[5]),
        (FormField::NeverSpam, right[6]),
    ] {
        f.render_widget(checkbox(&app.draft, field, focused), rect);
    }
}

fn render_settings(f: &mut Frame, app: &App, state: &mut UIState<'_>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Settings ")
        .border_style(Style::default().fg(Color::Gray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3), // Client ID
            Constraint::Length(3), // Client Secret
            Constraint::Length(3), // Redirect URI
            Constraint::Min(0),
        ])
        .split(inner);

    let (status, color) = match app.auth.state() {
        AuthState::NoCredentials => (
            "Enter the OAuth client credentials from your Google Cloud project.",
            Color::Gray,
        ),
        AuthState::CredentialsSavedUnauthenticated => (
            "Credentials saved. Press Ctrl-O to connect your Gmail account.",
            Color::Yellow,
        ),
        AuthState::Authenticated => ("Connected to Gmail.", Color::Green),
    };
    f.render_widget(
        Paragraph::new(status)
            .style(Style::default().fg(color))
            .wrap(Wrap { trim: true }),
        chunks[0],
    );

    let settings = &mut state.settings;
    let focused = settings.focused;
    let secret_title = if settings.reveal_secret {
        "Client Secret"
    } else {
        "Client Secret (hidden)"
    };
    style_field(&mut settings.client_id, "Client ID", focused == SettingsField::ClientId);
    style_field(
        &mut settings.client_secret,
        secret_title,
        focused == SettingsField::ClientSecret,
    );
    style_field(
        &mut settings.redirect_uri,
        "Redirect URI",
        focused == SettingsField::RedirectUri,
    );
    f.render_widget(&settings.client_id, chunks[1]);
    f.render_widget(&settings.client_secret, chunks[2]);
    f.render_widget(&settings.redirect_uri, chunks[3]);

    if let (Some(url), false) = (&app.auth_url, app.is_authenticated()) {
        render_authorization_url(f, url, chunks[4]);
    }
}

fn render_authorization_url(f: &mut Frame, url: &str, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(6),
            Constraint::Min(0),
        ])
        .split(area);

    let msg = Paragraph::new(
        "Authorize the application by visiting the following URL in your browser:",
    )
    .wrap(Wrap { trim: true });
    f.render_widget(msg, chunks[0]);

    let url_p = Paragraph::new(url)
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::UNDERLINED),
        )
        .block(Block::default().borders(Borders::ALL).title(" URL "))
        .wrap(Wrap { trim: false });
    f.render_widget(url_p, chunks[1]);

    let footer = Paragraph::new(concat!(
        "Your default browser should have opened automatically. If not, copy the URL above ",
        "(hold Shift to select in most terminals). Press Ctrl-R once sign-in completes."
    ))
    .style(Style::default().fg(Color::Gray))
    .wrap(Wrap { trim: true });
    f.render_widget(footer, chunks[2]);
}

fn render_delete_confirmation(f: &mut Frame) {
    let area = centered_rect(40, 20, f.area());
    f.render_widget(Clear, area);

    let popup = Paragraph::new(
        "Are you sure you want to delete this filter?\n\n[y] Delete   [n] Cancel",
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Delete Filter ")
            .border_style(Style::default().fg(Color::Red)),
    )
    .wrap(Wrap { trim: true });
    f.render_widget(popup, area);
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Cyan,
        Severity::Success => Color::Green,
        Severity::Error => Color::Red,
    }
}

fn render_notification(f: &mut Frame, app: &App) {
    let Some(notification) = app.notifications.current() else {
        return;
    };

    let screen = f.area();
    let width = screen.width.min(60);
    let area = Rect {
        x: screen.x + screen.width.saturating_sub(width + 1),
        y: screen.y + 1,
        width,
        height: 3.min(screen.height),
    };
    let color = severity_color(notification.severity);

    f.render_widget(Clear, area);
    let popup = Paragraph::new(notification.message.as_str())
        .style(Style::default().fg(color))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", notification.posted_local.format("%H:%M:%S")))
                .border_style(Style::default().fg(color)),
        )
        .wrap(Wrap { trim: true });
    f.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn type_text(textarea: &mut TextArea<'_>, text: &str) {
        for c in text.chars() {
            textarea.input(KeyEvent::new(KeyCode::Char(c), KeyModifiers::empty()));
        }
    }

    #[test]
    fn test_form_field_order_wraps() {
        assert_eq!(FormField::From.prev(), FormField::NeverSpam);
        assert_eq!(FormField::NeverSpam.next(), FormField::From);
        assert_eq!(FormField::ExcludeChats.next(), FormField::AddLabels);
    }

    #[test]
    fn test_typed_text_lands_in_draft() {
        let mut draft = FilterDraft::default();
        let mut form = FilterForm::from_draft(&draft);
        form.focus(FormField::Subject);

        if let Some(textarea) = form.text_field_mut(FormField::Subject) {
            type_text(textarea, "invoice");
        }
        form.sync_focused(&mut draft);

        assert_eq!(draft.criteria.subject, "invoice");
        assert_eq!(draft.criteria.from, "");
    }

    #[test]
    fn test_toggle_checkbox_and_labels() {
        let mut draft = FilterDraft::default();
        let mut form = FilterForm::from_draft(&draft);

        form.focus(FormField::ExcludeChats);
        form.toggle_focused(&mut draft, &[]);
        assert!(!draft.criteria.exclude_chats);

        let labels = ["Label_1", "Label_2"];
        form.focus(FormField::AddLabels);
        form.move_label_cursor(true, labels.len());
        form.toggle_focused(&mut draft, &labels);
        assert_eq!(draft.action.add_label_ids, vec!["Label_2".to_string()]);

        form.toggle_focused(&mut draft, &labels);
        assert!(draft.action.add_label_ids.is_empty());
        assert!(draft.action.remove_label_ids.is_empty());
    }

    #[test]
    fn test_label_cursor_stays_in_range() {
        let mut form = FilterForm::from_draft(&FilterDraft::default());
        form.move_label_cursor(false, 2);
        assert_eq!(form.label_cursor, 0);
        form.move_label_cursor(true, 2);
        form.move_label_cursor(true, 2);
        assert_eq!(form.label_cursor, 1);
    }

    #[test]
    fn test_settings_form_round_trips_credentials() {
        let credentials = CredentialSet {
            client_id: "id.apps.googleusercontent.com".to_string(),
            client_secret: "s3cret".to_string(),
            redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        };
        let mut form = SettingsForm::from_credentials(&credentials);
        assert!(!form.reveal_secret);
        assert_eq!(form.to_credentials(), credentials);

        form.focused = SettingsField::ClientSecret;
        type_text(form.focused_textarea(), "!");
        form.toggle_reveal();
        assert!(form.reveal_secret);
        assert_eq!(form.to_credentials().client_secret, "s3cret!");
    }
}
