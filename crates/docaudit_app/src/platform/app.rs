use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use client_logging::{client_debug, client_info, client_warn};
use docaudit_core::{
    update, AppState, ContextStore, FileCandidate, Identity, Msg, RequestContext,
};
use docaudit_engine::{
    ensure_state_dir, remaining_lifetime, utc_clock, ApiError, BackendApi, Clock,
    IdentitySessionManager, Navigation, OidcClient, SessionListeners, SharedStorage,
    UploadPipeline,
};

use super::cli::{Cli, Command};
use super::config::AppConfig;
use super::effects::{self, EffectRunner};
use super::signin::{self, LANDING};
use super::{logging, render};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub fn run_app() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.log, cli.verbose);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(api_base) = cli.api_base.clone() {
        config.api_base = api_base;
    }
    if let Some(state_dir) = cli.state_dir.clone() {
        config.state_dir = state_dir;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    runtime.block_on(async move {
        let mut app = App::open(&config)?;
        app.run(cli.command).await
    })
}

struct App {
    state: AppState,
    context: ContextStore,
    session: Arc<IdentitySessionManager>,
    uploads: UploadPipeline,
    api: Arc<BackendApi>,
    runner: EffectRunner,
    clock: Clock,
    printed: usize,
    _listeners: Option<SessionListeners>,
}

impl App {
    fn open(config: &AppConfig) -> anyhow::Result<Self> {
        ensure_state_dir(&config.state_dir)
            .with_context(|| format!("preparing {}", config.state_dir.display()))?;
        let storage = SharedStorage::open(config.storage_path())?;
        let tab = storage.tab();
        client_logging::set_context_label(format!("tab-{}", tab.id()));

        let oidc = Arc::new(OidcClient::new(config.oidc_settings()?, tab.clone())?);
        let context = ContextStore::new();
        let session = IdentitySessionManager::new(
            Arc::clone(&oidc),
            tab,
            context.clone(),
            config.home_location(),
        );
        let clock = utc_clock();
        let api = Arc::new(
            BackendApi::new(config.client_settings(), clock.clone())?.with_tokens(oidc),
        );
        let uploads = UploadPipeline::new(Arc::clone(&api), context.files.clone());
        let runner = EffectRunner::new(Arc::clone(&api), PathBuf::from("."));

        Ok(Self {
            state: AppState::new(),
            context,
            session,
            uploads,
            api,
            runner,
            clock,
            printed: 0,
            _listeners: None,
        })
    }

    async fn run(&mut self, command: Command) -> anyhow::Result<()> {
        self._listeners = Some(self.session.startup().await);

        match command {
            Command::Login => {
                println!("{}", signin::begin_sign_in(&self.session).await.describe());
            }
            Command::Callback { url } => {
                println!(
                    "{}",
                    signin::complete_sign_in(&self.session, url).await.describe()
                );
            }
            Command::Logout => {
                let result = self.session.logout().await;
                println!("Signed out.");
                match result {
                    Ok(Navigation::Redirect(url)) => {
                        println!("To end the provider session too, open:\n{url}");
                    }
                    Err(err) => client_warn!("provider sign-out unavailable: {}", err),
                }
            }
            Command::Whoami => {
                let Some(identity) = self.signed_in() else {
                    return Ok(());
                };
                println!("{} ({})", identity.label(), identity.subject);
                if let Some(left) = self
                    .session
                    .oidc()
                    .get_user()
                    .as_ref()
                    .and_then(remaining_lifetime)
                {
                    println!("Session valid for another {}s", left.as_secs());
                }
            }
            Command::Renew => {
                if self.signed_in().is_none() {
                    return Ok(());
                }
                let identity = self.session.renew_silently().await?;
                println!("Session renewed for {}", identity.label());
            }
            Command::Files => {
                let Some(identity) = self.signed_in() else {
                    return Ok(());
                };
                let listed = self.uploads.list_remote_files(&identity.subject).await;
                self.check_auth(listed)?;
                println!("{}", render::render_files(&self.context.files.get()));
            }
            Command::Upload { paths } => {
                let Some(identity) = self.signed_in() else {
                    return Ok(());
                };
                self.refresh_files(&identity).await;
                let candidates = paths.into_iter().map(FileCandidate::from_path).collect();
                let batch = self.uploads.select_files(&identity.subject, candidates);
                if let Some(rejection) = &batch.rejection {
                    println!("! {rejection}");
                }
                for (id, result) in batch.finished().await {
                    if let Err(err) = self.check_auth(result) {
                        client_debug!("upload {} ended with {}", id, err);
                    }
                }
                println!("{}", render::render_files(&self.context.files.get()));
            }
            Command::Delete { position } => {
                let Some(identity) = self.signed_in() else {
                    return Ok(());
                };
                self.refresh_files(&identity).await;
                let deleted = self.uploads.delete_file(&identity.subject, position).await;
                match self.check_auth(deleted) {
                    Ok(Some(record)) => println!("Deleted {}", record.display_name),
                    Ok(None) => println!("No file at position {position}."),
                    Err(err) => println!("! Delete failed: {}", err.message),
                }
                println!("{}", render::render_files(&self.context.files.get()));
            }
            Command::Ask { text, alternate } => {
                let Some(identity) = self.signed_in() else {
                    return Ok(());
                };
                self.refresh_files(&identity).await;
                self.dispatch(Msg::InputChanged(text));
                let context = self.request_context(&identity);
                self.dispatch(Msg::QuerySubmitted {
                    context,
                    modifier_held: alternate,
                });
                self.pump_until(|state| !state.query_pending()).await;
                self.print_banner();
            }
            Command::Audit {
                document,
                sections,
                alternate,
                save,
            } => {
                let Some(identity) = self.signed_in() else {
                    return Ok(());
                };
                self.refresh_files(&identity).await;
                if !self.context.stored_file_names().contains(&document) {
                    println!("! {document} is not among your uploaded files.");
                    return Ok(());
                }
                self.dispatch(Msg::DocumentSelected(Some(document)));
                self.dispatch(Msg::SectionsSelected(sections));
                let context = self.request_context(&identity);
                self.dispatch(Msg::StartAuditClicked {
                    context,
                    modifier_held: alternate,
                });
                self.pump_until(|state| !state.audit().phase().is_active())
                    .await;
                println!("{}", render::render_audit_status(&self.state.view()));
                self.print_banner();
                if let Some(dir) = save {
                    self.runner.set_download_dir(dir);
                    self.dispatch(Msg::DownloadClicked);
                }
            }
            Command::Feedback {
                category,
                text,
                email,
            } => {
                let sent = self.api.send_feedback(&category, &text, &email).await;
                let ack = self.check_auth(sent)?;
                println!("Feedback sent ({}). {}", ack.status, ack.message);
            }
        }
        Ok(())
    }

    /// Protected commands only run for a signed-in user.
    fn signed_in(&self) -> Option<Identity> {
        let identity = self.session.current_identity();
        if identity.is_none() {
            println!("{LANDING}");
        }
        identity
    }

    fn check_auth<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(err) = &result {
            if err.is_auth() {
                client_warn!("backend rejected the session: {}", err);
                self.session.expire_session();
            }
        }
        result
    }

    async fn refresh_files(&self, identity: &Identity) {
        let listed = self.uploads.list_remote_files(&identity.subject).await;
        if let Err(err) = self.check_auth(listed) {
            client_warn!("could not refresh the file list: {}", err);
        }
    }

    fn request_context(&self, identity: &Identity) -> RequestContext {
        RequestContext {
            identity_subject: identity.subject.clone(),
            file_names: self.context.stored_file_names(),
            now: (self.clock)(),
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        let mut state = state;
        let was_dirty = state.consume_dirty();
        self.state = state;
        self.runner.enqueue(effects);
        if was_dirty {
            self.print_new_messages();
        }
    }

    async fn pump_until(&mut self, done: impl Fn(&AppState) -> bool) {
        while !done(&self.state) {
            match self.runner.try_recv() {
                Some(event) => {
                    if effects::auth_failure(&event).is_some() {
                        self.session.expire_session();
                    }
                    self.dispatch(effects::to_msg(event));
                }
                None => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    fn print_new_messages(&mut self) {
        let view = self.state.view();
        if view.messages.len() < self.printed {
            client_info!("conversation restarted");
            self.printed = 0;
        }
        let fresh = &view.messages[self.printed..];
        if !fresh.is_empty() {
            println!("{}", render::render_messages(fresh));
        }
        self.printed = view.messages.len();
    }

    fn print_banner(&self) {
        if let Some(banner) = render::render_banner(&self.state.view()) {
            println!("{banner}");
        }
    }
}
