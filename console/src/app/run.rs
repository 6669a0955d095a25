//! Command runner

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use colored::{ColoredString, Colorize};
use tracing::{info, warn};

use crate::app::command::Command;
use crate::app::options::AppOptions;
use crate::authn::session::SessionStore;
use crate::deploy::controller::DeploymentController;
use crate::errors::ConsoleError;
use crate::http::auth;
use crate::http::gateway::Gateway;
use crate::http::transport::HttpTransport;
use crate::models::deployment::{Deployment, DeploymentId, DeploymentStatus};
use crate::models::progress::{ProgressPhase, ProgressRecord};
use crate::utils::version_info;
use crate::workers::progress::WsProgressChannel;

/// How often `watch` re-checks whether background work has finished
const WATCH_RECHECK: Duration = Duration::from_millis(250);

/// Wired-up console components
pub struct App {
    pub store: Arc<SessionStore>,
    pub gateway: Arc<Gateway>,
    pub controller: Arc<DeploymentController>,
}

/// Build the console components from options
pub async fn init(options: AppOptions) -> Result<App, ConsoleError> {
    options.storage.setup().await?;

    let store = Arc::new(SessionStore::load(Arc::new(options.storage.session_file())).await?);
    let transport = Arc::new(HttpTransport::new(
        &options.backend_base_url,
        options.request_timeout,
    )?);
    let gateway = Arc::new(Gateway::new(transport, store.clone(), options.fallback));
    let channel = Arc::new(WsProgressChannel::new(
        &options.backend_base_url,
        &options.progress_path,
    )?);
    let controller = Arc::new(DeploymentController::new(
        gateway.clone(),
        channel,
        options.controller,
    ));

    Ok(App {
        store,
        gateway,
        controller,
    })
}

/// Run one command. Every observed deployment is torn down before returning.
pub async fn run(
    command: Command,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send,
) -> Result<(), ConsoleError> {
    let app = init(options).await?;
    let result = execute(&app, command, shutdown_signal).await;
    app.controller.shutdown();
    result
}

pub async fn execute(
    app: &App,
    command: Command,
    shutdown_signal: impl Future<Output = ()> + Send,
) -> Result<(), ConsoleError> {
    match command {
        Command::Version => {
            println!("{}", serde_json::to_string_pretty(&version_info())?);
        }
        Command::Login { username, password } => {
            let session = auth::login(&app.gateway, &app.store, &username, &password).await?;
            println!("Logged in as {}", session.username.bold());
        }
        Command::Logout => {
            auth::logout(&app.store).await?;
            println!("Logged out");
        }
        Command::Status(id) => {
            let deployment = app.controller.load(id).await?;
            print_deployment(&deployment);
            print_actions(&app.controller, id);
        }
        Command::Watch(id) => {
            let deployment = app.controller.load(id).await?;
            print_deployment(&deployment);
            watch(&app.controller, id, shutdown_signal).await;
        }
        Command::Issue {
            deployment_id,
            action,
        } => {
            let deployment = app.controller.load(deployment_id).await?;
            print_deployment(&deployment);
            app.controller.issue(action.clone(), deployment_id).await?;
            println!("{} requested for deployment {}", action, deployment_id);
            watch(&app.controller, deployment_id, shutdown_signal).await;
        }
        Command::Logs(id) => {
            let log = app.controller.logs(id).await?;
            if log.is_empty() {
                println!("{}", "(no logs yet)".dimmed());
            } else {
                println!("{}", log);
            }
        }
    }
    Ok(())
}

/// Print every change of a deployment until it is stable and nothing is
/// running in the background for it, or until the shutdown signal fires
pub async fn watch(
    controller: &DeploymentController,
    deployment_id: DeploymentId,
    shutdown_signal: impl Future<Output = ()> + Send,
) {
    let Some(mut subscription) = controller.subscribe(deployment_id) else {
        return;
    };
    tokio::pin!(shutdown_signal);

    loop {
        if is_settled(controller, deployment_id) {
            break;
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received, stopping watch...");
                break;
            }
            changed = subscription.deployment.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = subscription.deployment.borrow_and_update().clone();
                if let Some(deployment) = current {
                    print_deployment(&deployment);
                }
            }
            changed = subscription.progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let record = subscription.progress.borrow_and_update().clone();
                print_progress(&record);
            }
            _ = tokio::time::sleep(WATCH_RECHECK) => {}
        }
    }

    if let Some(deployment) = controller.current(deployment_id) {
        if deployment.status.is_failure() {
            warn!("Deployment {} ended as {}", deployment_id, deployment.status);
        }
    }
}

fn is_settled(controller: &DeploymentController, deployment_id: DeploymentId) -> bool {
    let stable = controller
        .current(deployment_id)
        .map_or(true, |d| d.status.is_stable());
    stable && !controller.is_polling(deployment_id) && !controller.is_streaming(deployment_id)
}

fn status_label(status: DeploymentStatus) -> ColoredString {
    let label = status.label();
    if status.is_failure() {
        label.red().bold()
    } else if status.is_transient() {
        label.yellow()
    } else if matches!(status, DeploymentStatus::Success | DeploymentStatus::Running) {
        label.green()
    } else {
        label.normal()
    }
}

fn print_deployment(deployment: &Deployment) {
    let path = deployment.deploy_path().unwrap_or("-");
    println!(
        "Deployment {} [{}] {} {}",
        deployment.id,
        deployment.environment.as_str(),
        status_label(deployment.status),
        path.dimmed()
    );
}

fn print_progress(record: &ProgressRecord) {
    let message = match record.phase {
        ProgressPhase::Idle => return,
        ProgressPhase::Running => record.message.normal(),
        ProgressPhase::Complete => record.message.green(),
        ProgressPhase::Error => record.message.red(),
    };
    println!("  {:>3}% {}", record.progress, message);
}

fn print_actions(controller: &DeploymentController, deployment_id: DeploymentId) {
    let actions: Vec<&str> = controller
        .enabled_actions(deployment_id)
        .iter()
        .map(|kind| kind.as_str())
        .collect();
    if actions.is_empty() {
        println!("Available actions: {}", "none".dimmed());
    } else {
        println!("Available actions: {}", actions.join(", "));
    }
}
