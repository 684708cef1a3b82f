use anyhow::{bail, Context, Result};
use restyle::api::ApiClient;
use restyle::config::Config;
use restyle::logging::init_logging;
use restyle::pipeline::{TabState, TabView};
use restyle::session::{SessionDeps, SessionManager, TabObserver};
use restyle::source::read_source;
use restyle::store::FileSessionStore;
use restyle::styles::{DirStyleLoader, StyleLoader};
use std::io::Write;
use std::sync::Arc;

/// Progress on stderr, finished rewrites on stdout.
struct ConsoleObserver;

impl TabObserver for ConsoleObserver {
    fn on_state_changed(&mut self, _index: usize, view: &TabView) {
        match view.state {
            TabState::Error => eprintln!(
                "[{}] failed: {}",
                view.name,
                view.error.as_deref().unwrap_or("unknown error")
            ),
            TabState::Cached => {}
            state => eprintln!("[{}] {}", view.name, state.label()),
        }
    }

    fn on_result_ready(&mut self, _index: usize, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{text}");
        let _ = stdout.flush();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::load()?;
    config.validate()?;

    let styles = DirStyleLoader::new(&config.styles_dir).load()?;
    let source = read_source(std::io::stdin().lock()).context("reading text from stdin")?;
    let client = ApiClient::new(&config)?;
    tracing::info!(
        model = client.model(),
        styles = styles.len(),
        two_pass = config.pipeline.two_pass,
        "starting"
    );

    let deps = SessionDeps {
        transport: Arc::new(client),
        settings: config.pipeline,
        store: Box::new(FileSessionStore::new(&config.session_file)),
        observer: Box::new(ConsoleObserver),
    };
    let mut session = SessionManager::initialize(deps, styles, source)?;

    for name in std::env::args().skip(1) {
        if session.select_style(&name).is_none() {
            session.shutdown();
            bail!("unknown style '{name}'");
        }
    }

    let interrupted = tokio::select! {
        _ = session.run_until_settled() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    session.shutdown();
    if interrupted {
        bail!("interrupted");
    }

    let failed: Vec<&str> = session
        .tabs()
        .iter()
        .filter(|tab| tab.state() == TabState::Error)
        .map(|tab| tab.name())
        .collect();
    if !failed.is_empty() {
        bail!("{} style(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
