use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::{self, Config};
use crate::prelude::*;

/// Inputs of the startup sequence
pub struct BootstrapRequirements {
    pub logger: Logger,
    pub config: Config,
    /// Where credentials are read from
    pub source: Box<dyn ConfigSource>,
    pub gateway: Arc<dyn Gateway>,
    pub database: Arc<DbHandler>,
    pub definitions: Vec<CommandDefinition>,
}

impl BootstrapRequirements {
    /// Production wiring: Telegram gateway, file-backed store, built-in commands
    pub fn from_config(logger: Logger, config: Config) -> UResult<Self> {
        let gateway = TelegramGateway::new()
            .logger(named(&logger, "Gateway"))
            .api_base(&config.api_base)
            .sync_chats(&config.sync_chats)
            .build()?;
        Ok(BootstrapRequirements {
            source: Box::new(config.credential_source()?),
            database: Arc::new(DbHandler::open(&config.database_path)?),
            gateway: Arc::new(gateway),
            definitions: builtins::definitions(),
            logger,
            config,
        })
    }
}

/// Singletons living as long as the process
pub struct Services {
    pub commands: Arc<CommandRegistry>,
    pub localization: Arc<dyn Localization>,
    pub google: Arc<dyn GoogleApi>,
    pub stats: Arc<StatsService>,
    pub dispatcher: Arc<CommandDispatcher>,
}

/// What a successful startup leaves behind
pub struct AppState {
    pub logger: Logger,
    pub credentials: Arc<Credentials>,
    pub gateway: Arc<dyn Gateway>,
    pub database: Arc<DbHandler>,
    pub services: Services,
    /// The line printed once everything is up
    pub summary: String,
    dispatch_task: Option<JoinHandle<()>>,
}

impl AppState {
    pub async fn shutdown(mut self) {
        self.gateway.disconnect().await;
        if let Some(task) = self.dispatch_task.take() {
            task.abort();
        }
        let db = self.database.context();
        info!(self.logger, "Shut down";
            "status" => self.services.stats.print(),
            "owners" => self.credentials.owner_ids().len(),
            "responses" => db.tables().eight_ball.len(),
        );
    }
}

fn introduce_self(logger: &Logger) {
    info!(logger, "Starting Kestrel telegram bot";
        "version" => config::PACKAGE_VERSION,
    );
}

fn construct_services(
    ctx: &BootstrapRequirements,
    credentials: &Credentials,
) -> Result<Services, BootError> {
    let commands = Arc::new(CommandRegistry::new());
    let localization: Arc<dyn Localization> = Arc::new(
        Localizer::new(&ctx.config.default_locale).map_err(|why| BootError::Service {
            service: "localization",
            reason: why.to_string(),
        })?,
    );
    let google = GoogleApiClient::new(credentials.api_key("google")).map_err(|why| BootError::Service {
        service: "google api",
        reason: why.to_string(),
    })?;
    if !google.has_key() {
        warn!(ctx.logger, "No google API key configured, searches will fail");
    }
    let google: Arc<dyn GoogleApi> = Arc::new(google);
    let stats = Arc::new(StatsService::new(ctx.gateway.clone(), commands.clone()));
    let dispatcher = CommandDispatcher::new()
        .gateway(ctx.gateway.clone())
        .commands(commands.clone())
        .stats(stats.clone())
        .localization(localization.clone())
        .prefix(&ctx.config.command_prefix)
        .logger(named(&ctx.logger, "Commands"))
        .build()
        .map_err(|why| BootError::Service {
            service: "command dispatcher",
            reason: why.to_string(),
        })?;

    Ok(Services {
        commands,
        localization,
        google,
        stats,
        dispatcher: Arc::new(dispatcher),
    })
}

/// Makes sure the baseline rows exist. The context is released before
/// this returns, whatever the outcome.
fn bootstrap_persistence(database: &DbHandler, logger: &Logger) -> Result<(), BootError> {
    let mut db = database.context();
    let inserted = db.ensure_seed_data();
    db.save_changes()?;
    debug!(logger, "Seed data ensured";
        "inserted" => inserted,
        "responses" => db.tables().eight_ball.len(),
    );
    Ok(())
}

fn populate_registry(
    ctx: &BootstrapRequirements,
    credentials: &Arc<Credentials>,
    services: &Services,
) -> Result<DependencyRegistry, BootError> {
    let mut registry = DependencyRegistry::new();
    registry.register::<dyn Localization>(services.localization.clone())?;
    registry.register::<dyn Gateway>(ctx.gateway.clone())?;
    registry.register(services.commands.clone())?;
    registry.register::<dyn GoogleApi>(services.google.clone())?;
    registry.register(services.stats.clone())?;
    registry.register(credentials.clone())?;
    Ok(registry)
}

/// Runs one network stage under a deadline
async fn bounded<T, F>(stage: BootStage, limit: Duration, operation: F) -> Result<T, BootError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| BootError::Timeout {
            stage,
            after: limit,
        })?
        .map_err(|source| BootError::Gateway { stage, source })
}

async fn authenticate_gateway(
    ctx: &BootstrapRequirements,
    credentials: &Credentials,
    stages: &mut StageTracker,
) -> Result<(), BootError> {
    bounded(
        BootStage::GatewayAuthenticated,
        ctx.config.stage_timeout(),
        ctx.gateway.authenticate(credentials.token()),
    )
    .await?;
    stages.complete(BootStage::GatewayAuthenticated)
}

/// Everything from connecting on. The gateway may be polling by the time
/// any of this fails.
async fn go_online(
    ctx: &BootstrapRequirements,
    services: &Services,
    registry: DependencyRegistry,
    definitions: Vec<CommandDefinition>,
    stages: &mut StageTracker,
) -> Result<String, BootError> {
    let gateway = &ctx.gateway;

    bounded(BootStage::GatewayConnected, ctx.config.stage_timeout(), gateway.connect()).await?;
    stages.complete(BootStage::GatewayConnected)?;
    info!(ctx.logger, "Connected");

    let report = bounded(
        BootStage::MembersSynced,
        ctx.config.sync_timeout(),
        gateway.sync_all_members(),
    )
    .await?;
    stages.complete(BootStage::MembersSynced)?;
    services.stats.record_sync(report);

    let loaded = services
        .commands
        .load_definitions(definitions, registry.as_lookup())?;
    services.stats.record_load(loaded);
    if services.commands.is_empty() {
        warn!(ctx.logger, "No commands were defined, the bot will not answer anything");
    }
    stages.complete(BootStage::CommandsLoaded)?;
    drop(registry);

    let summary = format!(
        "Ready: {} commands in {} modules loaded in {:.2?}",
        loaded.commands,
        loaded.modules,
        stages.elapsed()
    );
    stages.complete(BootStage::Idle)?;
    Ok(summary)
}

/// Drives the whole startup sequence. Every failure is fatal; once the
/// gateway has been asked to connect, a failure disconnects it again so
/// nothing is left polling.
pub async fn bootstrap(mut ctx: BootstrapRequirements) -> Result<AppState, BootError> {
    let logger = named(&ctx.logger, "Bootstrap");
    let mut stages = StageTracker::new(logger.clone());
    introduce_self(&logger);

    let credentials = Arc::new(Credentials::load(ctx.source.as_ref())?);
    debug!(logger, "Credentials loaded"; "owners" => credentials.owner_ids().len());
    stages.complete(BootStage::CredentialsLoaded)?;

    let services = construct_services(&ctx, &credentials)?;
    debug!(logger, "Services constructed"; "locale" => services.localization.default_locale());
    stages.complete(BootStage::ServicesConstructed)?;

    bootstrap_persistence(&ctx.database, &logger)?;

    let registry = populate_registry(&ctx, &credentials, &services)?;
    debug!(logger, "Dependency registry populated";
        "count" => registry.len(),
        "capabilities" => registry.capabilities().collect::<Vec<_>>().join(", "),
    );
    stages.complete(BootStage::RegistryPopulated)?;

    authenticate_gateway(&ctx, &credentials, &mut stages).await?;

    let definitions = std::mem::take(&mut ctx.definitions);
    let summary = match go_online(&ctx, &services, registry, definitions, &mut stages).await {
        Ok(summary) => summary,
        Err(why) => {
            warn!(logger, "Startup failed after connecting, disconnecting";
                "reached" => stages.current().to_string(),
                "pending" => stages.pending().map(|s| s.to_string()),
            );
            ctx.gateway.disconnect().await;
            return Err(why);
        }
    };

    let dispatch_task = match ctx.gateway.incoming() {
        Some(incoming) => Some(services.dispatcher.clone().start(incoming)),
        None => {
            warn!(logger, "Incoming messages were already taken, commands will not be dispatched");
            None
        }
    };

    println!("{}", summary);
    info!(logger, "{}", services.stats.print());

    Ok(AppState {
        logger,
        credentials,
        gateway: ctx.gateway,
        database: ctx.database,
        services,
        summary,
        dispatch_task,
    })
}

/// Parks until `shutdown` resolves, then takes the bot down
pub async fn idle<F>(state: AppState, shutdown: F)
where
    F: Future<Output = ()>,
{
    info!(state.logger, "Idling until shutdown is requested"; "ready" => &state.summary);
    shutdown.await;
    state.shutdown().await;
}

/// Resolves on Ctrl+C. If the handler cannot be installed it never resolves.
pub async fn shutdown_signal(logger: Logger) {
    if let Err(why) = tokio::signal::ctrl_c().await {
        error!(logger, "Could not listen for the shutdown signal"; "reason" => why.to_string());
        std::future::pending::<()>().await;
    }
    info!(logger, "Shutdown requested");
}
