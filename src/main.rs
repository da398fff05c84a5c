mod app;
mod auth;
mod codec;
mod config;
mod error;
mod filters;
mod gateway;
mod gmail;
mod models;
mod notify;
mod secrets;
mod ui;

use crate::app::App;
use crate::config::{Config, is_text_input, matches_key};
use crate::gateway::SystemBrowser;
use crate::gmail::GmailGateway;
use crate::secrets::Secrets;
use crate::ui::{FilterForm, UIState, View};
use crossterm::{
    event::{self, Event, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEBUG_LOG: &str = "gfilter_debug.log";

enum Flow {
    Continue,
    Quit,
}

fn init_logging() -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(DEBUG_LOG)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gfilter=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    if std::env::args().any(|arg| arg == "--debug") {
        init_logging()?;
    }

    // Handle token reset
    if std::env::args().any(|arg| arg == "--reset-token") {
        Secrets::clear_token()?;
        println!("Token cleared. Restart without --reset-token and connect again from Settings.");
        return Ok(());
    }

    let mut app = App::new(
        Arc::new(GmailGateway::new()),
        Box::new(SystemBrowser),
        config.default_redirect_uri.clone(),
    );
    app.start().await;
    info!("Started in state {:?}", app.auth.state());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &config, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    config: &Config,
    app: &mut App,
) -> anyhow::Result<()> {
    let mut ui_state = UIState::new(app);

    loop {
        app.notifications.prune_at(Instant::now());
        terminal.draw(|f| ui::render(f, app, &mut ui_state))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if let Flow::Quit = handle_key(key, config, app, &mut ui_state).await {
                break;
            }
        }
    }

    Ok(())
}

async fn handle_key(
    key: KeyEvent,
    config: &Config,
    app: &mut App,
    ui_state: &mut UIState<'_>,
) -> Flow {
    let kb = &config.keybindings;

    if let Some(filter_id) = ui_state.pending_delete.clone() {
        if matches_key(key, &kb.confirm) {
            ui_state.pending_delete = None;
            app.delete_filter(&filter_id).await;
            ui_state.clamp_selection(app.store.filters().len());
        } else if matches_key(key, &kb.cancel) {
            ui_state.pending_delete = None;
        }
        return Flow::Continue;
    }

    if matches_key(key, &kb.show_filters) {
        ui_state.view = View::Filters;
        return Flow::Continue;
    }
    if matches_key(key, &kb.show_new_filter) {
        ui_state.view = View::NewFilter;
        return Flow::Continue;
    }
    if matches_key(key, &kb.show_settings) {
        ui_state.view = View::Settings;
        return Flow::Continue;
    }

    let typing = ui_state.is_editing_text(app) && is_text_input(key);
    if !typing && matches_key(key, &kb.quit) {
        return Flow::Quit;
    }

    match ui_state.view {
        View::Filters => handle_filters_key(key, config, app, ui_state).await,
        View::NewFilter => handle_new_filter_key(key, config, app, ui_state).await,
        View::Settings => handle_settings_key(key, config, app, ui_state).await,
    }
    Flow::Continue
}

async fn handle_filters_key(
    key: KeyEvent,
    config: &Config,
    app: &mut App,
    ui_state: &mut UIState<'_>,
) {
    let kb = &config.keybindings;
    if !app.is_authenticated() {
        return;
    }

    if matches_key(key, &kb.move_up) {
        ui_state.selected_filter = ui_state.selected_filter.saturating_sub(1);
    } else if matches_key(key, &kb.move_down) {
        ui_state.selected_filter += 1;
        ui_state.clamp_selection(app.store.filters().len());
    } else if matches_key(key, &kb.refresh) {
        app.reload_filters().await;
        app.reload_labels().await;
        ui_state.clamp_selection(app.store.filters().len());
    } else if matches_key(key, &kb.delete) {
        ui_state.pending_delete = ui_state.selected_filter_id(app);
    }
}

async fn handle_new_filter_key(
    key: KeyEvent,
    config: &Config,
    app: &mut App,
    ui_state: &mut UIState<'_>,
) {
    let kb = &config.keybindings;
    if !app.is_authenticated() {
        return;
    }
    let form = &mut ui_state.form;

    if matches_key(key, &kb.submit) {
        if app.submit_draft().await {
            debug!("Draft submitted, resetting form");
            ui_state.form = FilterForm::from_draft(&app.draft);
        }
    } else if matches_key(key, &kb.next_field) {
        form.focus(form.focused.next());
    } else if matches_key(key, &kb.prev_field) {
        form.focus(form.focused.prev());
    } else if form.focused.is_text() {
        if let Some(textarea) = form.text_field_mut(form.focused) {
            textarea.input(key);
        }
        form.sync_focused(&mut app.draft);
    } else if form.focused.is_label_picker() {
        let label_ids: Vec<&str> = app
            .store
            .assignable_labels()
            .map(|l| l.id.as_str())
            .collect();
        if matches_key(key, &kb.move_up) {
            form.move_label_cursor(false, label_ids.len());
        } else if matches_key(key, &kb.move_down) {
            form.move_label_cursor(true, label_ids.len());
        } else if matches_key(key, &kb.toggle) {
            form.toggle_focused(&mut app.draft, &label_ids);
        }
    } else if matches_key(key, &kb.toggle) {
        form.toggle_focused(&mut app.draft, &[]);
    }
}

async fn handle_settings_key(
    key: KeyEvent,
    config: &Config,
    app: &mut App,
    ui_state: &mut UIState<'_>,
) {
    let kb = &config.keybindings;
    let settings = &mut ui_state.settings;

    if matches_key(key, &kb.submit) {
        app.save_credentials(settings.to_credentials()).await;
    } else if matches_key(key, &kb.connect) {
        app.connect().await;
    } else if matches_key(key, &kb.check_status) {
        app.check_status().await;
    } else if matches_key(key, &kb.reveal_secret) {
        settings.toggle_reveal();
    } else if matches_key(key, &kb.next_field) {
        settings.focused = settings.focused.next();
    } else if matches_key(key, &kb.prev_field) {
        settings.focused = settings.focused.prev();
    } else {
        settings.focused_textarea().input(key);
    }
}
