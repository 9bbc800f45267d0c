use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mistral_chat::app::App;
use mistral_chat::config::Config;
use mistral_chat::dispatcher::Dispatcher;
use mistral_chat::{handler, tui, ui};

const LOG_ENV: &str = "MISTRAL_CHAT_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    if let Some(path) = Config::load_dotenv() {
        info!(path = %path.display(), "loaded .env");
    }
    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not read config, using defaults");
        Config::new()
    });
    let dispatcher = Dispatcher::from_config(&config)?;
    if !dispatcher.client().has_api_key() {
        warn!("no API key found in API_KEY, MISTRAL_API_KEY or config");
    }
    info!(endpoint = dispatcher.client().endpoint(), "starting chat window");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, App::new(dispatcher)).await;
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "chat window exited with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, mut app: App) -> Result<()> {
    let mut events = tui::EventHandler::new(tui::TICK_RATE);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => app.quit(),
        }
        app.poll_pending();
    }

    info!("chat window closed");
    Ok(())
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging() {
    let Some(path) = log_path() else {
        return;
    };
    let Ok(file) = File::options().create(true).append(true).open(&path) else {
        return;
    };

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new("mistral_chat=info"));

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_env_filter(filter)
        .with_ansi(false)
        .init();
}

fn log_path() -> Option<PathBuf> {
    let dir = dirs::data_local_dir()
        .map(|d| d.join("mistral-chat"))
        .unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&dir).ok()?;
    Some(dir.join("mistral-chat.log"))
}
