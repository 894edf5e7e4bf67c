//! Scripted walk through a full session
//!
//! Mirrors what the mobile client does on first launch: the project list
//! view finds nobody signed in, the user signs in, the list shows the
//! placeholder project until the server-side trigger provisions the
//! membership record, then a project view adds tasks and the user signs out.

use anyhow::{anyhow, bail, Context};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tasktracker_model::{
    MembershipRecord, NavigationContext, PartitionKey, Principal, ProjectReference, Task,
    TaskStatus,
};
use tasktracker_session::{
    bind_list, ChannelNavigator, CollectionResolver, ListSink, LocalIdentityProvider,
    NavigationSignal, SessionConfig, SessionError, SessionLifecycleController, SessionView,
    StartOutcome, TaskBoard,
};
use tasktracker_store::{MemoryStore, MemoryStoreConfig, StoreHandle};
use tokio::sync::mpsc;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub(crate) struct DemoOptions {
    pub(crate) user: String,
    pub(crate) store: MemoryStoreConfig,
    pub(crate) provision_after: Duration,
    pub(crate) tasks: Vec<String>,
    pub(crate) config: SessionConfig,
}

/// What the demo observed
#[derive(Debug, Default)]
pub(crate) struct DemoReport {
    pub(crate) placeholder: Vec<ProjectReference>,
    pub(crate) projects: Vec<ProjectReference>,
    pub(crate) tasks: Vec<Task>,
    pub(crate) signals: Vec<NavigationSignal>,
    pub(crate) open_connections: usize,
}

impl fmt::Display for DemoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session Demo Report")?;
        writeln!(f, "===================")?;
        writeln!(f, "Placeholder projects: {}", self.placeholder.len())?;
        writeln!(f, "Provisioned projects: {}", self.projects.len())?;
        for project in &self.projects {
            writeln!(f, "  - {} ({})", project.name, project.partition)?;
        }
        writeln!(f, "Tasks: {}", self.tasks.len())?;
        for task in &self.tasks {
            writeln!(f, "  [{}] {}", task.status, task.name)?;
        }
        writeln!(f, "Navigation: {:?}", self.signals)?;
        write!(f, "Open connections after sign-out: {}", self.open_connections)
    }
}

#[derive(Debug)]
enum ViewUpdate {
    Ready(Arc<StoreHandle>),
    Failed(SessionError),
}

/// View that forwards lifecycle callbacks to the script
struct ScriptedView {
    name: &'static str,
    tx: mpsc::UnboundedSender<ViewUpdate>,
}

impl ScriptedView {
    fn channel(name: &'static str) -> (Arc<Self>, mpsc::UnboundedReceiver<ViewUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { name, tx }), rx)
    }

    fn send(&self, update: ViewUpdate) {
        if self.tx.send(update).is_err() {
            tracing::debug!(view = self.name, "script no longer listening");
        }
    }
}

impl SessionView for ScriptedView {
    fn on_title(&self, label: &str) {
        println!("[{}] title: {label}", self.name);
    }

    fn on_authorized_start(&self, principal: &Principal, partition: &PartitionKey) {
        println!("[{}] opening {partition} for {}", self.name, principal.id);
    }

    fn on_store_ready(&self, store: Arc<StoreHandle>) {
        self.send(ViewUpdate::Ready(store));
    }

    fn on_store_failed(&self, error: &SessionError) {
        println!("[{}] {error}", self.name);
        self.send(ViewUpdate::Failed(error.clone()));
    }
}

/// Prints every rendered snapshot
struct ConsoleList<T> {
    heading: &'static str,
    line: fn(&T) -> String,
}

impl<T: Send + Sync> ListSink<T> for ConsoleList<T> {
    fn render(&self, items: &[T]) {
        println!("{} ({}):", self.heading, items.len());
        for item in items {
            println!("  {}", (self.line)(item));
        }
    }
}

async fn wait_ready(
    rx: &mut mpsc::UnboundedReceiver<ViewUpdate>,
) -> anyhow::Result<Arc<StoreHandle>> {
    let update = tokio::time::timeout(STEP_TIMEOUT, rx.recv())
        .await
        .context("store did not open in time")?
        .ok_or_else(|| anyhow!("view dropped before the store opened"))?;
    match update {
        ViewUpdate::Ready(handle) => Ok(handle),
        ViewUpdate::Failed(e) => Err(e.into()),
    }
}

pub(crate) async fn run(options: DemoOptions) -> anyhow::Result<DemoReport> {
    let store = MemoryStore::new(options.store.clone());
    let identity = Arc::new(LocalIdentityProvider::new());
    let (navigator, mut signals) = ChannelNavigator::channel();
    let navigator = Arc::new(navigator);
    let mut report = DemoReport::default();

    let (projects_view, mut projects_updates) = ScriptedView::channel("projects");
    let mut projects_controller = SessionLifecycleController::new(
        identity.clone(),
        Arc::new(store.clone()),
        navigator.clone(),
        projects_view,
    )
    .with_config(&options.config);

    // Nobody signed in yet.
    if projects_controller.on_start(None) != StartOutcome::LoginRequired {
        bail!("expected a login redirect before sign-in");
    }
    if let Some(signal) = signals.recv().await {
        println!("navigator: {signal:?}");
        report.signals.push(signal);
    }
    projects_controller.on_destroy();

    let principal = Principal::new(options.user.as_str());
    identity.sign_in(principal.clone());

    let outcome = projects_controller.on_start(None);
    tracing::debug!(?outcome, "project list started");
    let root = wait_ready(&mut projects_updates).await?;

    let resolver = CollectionResolver::new(&options.config);
    let projects = resolver.resolve(&root, &principal)?;
    report.placeholder = projects.snapshot();
    let list = bind_list(
        projects.clone(),
        Arc::new(ConsoleList::<ProjectReference> {
            heading: "projects",
            line: |p: &ProjectReference| format!("{} -> {}", p.name, p.partition),
        }),
    );

    // Server-side trigger catches up.
    let provisioning = {
        let store = store.clone();
        let partition = root.partition().clone();
        let record = MembershipRecord::new(principal.id.clone()).with_projects(vec![
            ProjectReference::new(
                options.config.default_project_name.clone(),
                PartitionKey::default_project(&principal.id),
            ),
            ProjectReference::new("Shared Errands", PartitionKey::explicit("project=shared")),
        ]);
        let delay = options.provision_after;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.provision_membership(&partition, record);
        })
    };

    let mut watcher = projects.clone();
    report.projects = tokio::time::timeout(STEP_TIMEOUT, watcher.wait_until(|p| p.len() > 1))
        .await
        .context("membership record was never provisioned")?
        .ok_or_else(|| anyhow!("project list closed early"))?;
    provisioning.await?;

    let chosen = report
        .projects
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("no project to open"))?;

    let (tasks_view, mut tasks_updates) = ScriptedView::channel("tasks");
    let mut tasks_controller = SessionLifecycleController::new(
        identity.clone(),
        Arc::new(store.clone()),
        navigator.clone(),
        tasks_view,
    )
    .with_config(&options.config);
    tasks_controller.on_start(Some(&NavigationContext::new(
        chosen.partition.as_str(),
        chosen.name.as_str(),
    )));
    let project_store = wait_ready(&mut tasks_updates).await?;

    let board = TaskBoard::new(project_store);
    let tasks = board.tasks()?;
    let _task_list = bind_list(
        tasks.clone(),
        Arc::new(ConsoleList::<Task> {
            heading: "tasks",
            line: |t: &Task| format!("[{}] {}", t.status, t.name),
        }),
    );

    for title in &options.tasks {
        let created = board.create_task(title.as_str()).await??;
        tracing::debug!(task = %created.id, "demo task created");
    }
    let mut task_watcher = tasks.clone();
    let expected = options.tasks.len();
    report.tasks = tokio::time::timeout(
        STEP_TIMEOUT,
        task_watcher.wait_until(|t| t.len() == expected),
    )
    .await
    .context("tasks never showed up")?
    .unwrap_or_default();

    if let Some(first) = report.tasks.first().map(|t| t.id) {
        board.set_status(first, TaskStatus::InProgress).await?;
        report.tasks = tokio::time::timeout(
            STEP_TIMEOUT,
            task_watcher.wait_until(|t| t.iter().any(|t| t.status == TaskStatus::InProgress)),
        )
        .await
        .context("status change never showed up")?
        .unwrap_or_default();
    }

    tasks_controller.on_destroy();
    projects_controller.sign_out().await?;
    list.await?;

    while let Ok(signal) = signals.try_recv() {
        println!("navigator: {signal:?}");
        report.signals.push(signal);
    }
    report.open_connections = store.open_connections();
    Ok(report)
}
