//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here stand in for the remote command channel, the cluster API,
//! and the identity API. They are cheap to clone; clones share state so a test
//! can keep a handle for assertions after moving one into an orchestrator.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;

use crate::backend::{BackendFuture, ClusterApi, ClusterApiError, IdentityError, InstanceProfileApi};
use crate::cluster::{ClusterAttributes, ClusterInfo, ClusterRequest, ClusterState};
use crate::command::{CommandError, CommandExecutor};
use crate::credentials::InstanceProfileArn;
use crate::mount::script::{DELETE_SUCCESS, MOUNT_NOT_FOUND};

const NO_RESPONSE: &str = "no scripted response available";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records a single script submitted to a command executor double.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptInvocation {
    /// Cluster the script targeted.
    pub cluster_id: String,
    /// Script text.
    pub script: String,
}

/// Command executor returning pre-seeded results in FIFO order.
#[derive(Clone, Debug, Default)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<ScriptedState>>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    responses: VecDeque<Result<String, CommandError>>,
    invocations: Vec<ScriptInvocation>,
}

impl ScriptedExecutor {
    /// Creates an executor with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful result.
    pub fn push_output(&self, output: impl Into<String>) {
        lock(&self.state).responses.push_back(Ok(output.into()));
    }

    /// Queues a failure carrying `message` verbatim.
    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.state)
            .responses
            .push_back(Err(CommandError::new(message)));
    }

    /// Returns every script executed so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<ScriptInvocation> {
        lock(&self.state).invocations.clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute<'a>(
        &'a self,
        cluster_id: &'a str,
        script: &'a str,
    ) -> BackendFuture<'a, String, CommandError> {
        let response = {
            let mut state = lock(&self.state);
            state.invocations.push(ScriptInvocation {
                cluster_id: cluster_id.to_owned(),
                script: script.to_owned(),
            });
            state
                .responses
                .pop_front()
                .unwrap_or_else(|| Err(CommandError::new(NO_RESPONSE)))
        };
        Box::pin(async move { response })
    }
}

/// Command executor that interprets generated mount scripts against an
/// in-memory mount table per cluster.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMountTable {
    state: Arc<Mutex<MountTableState>>,
}

#[derive(Debug, Default)]
struct MountTableState {
    mounts: HashMap<String, BTreeMap<String, String>>,
    failures: VecDeque<String>,
    invocations: Vec<ScriptInvocation>,
}

impl InMemoryMountTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mount directly, as if created out of band.
    pub fn insert(&self, cluster_id: &str, mount_point: &str, source: &str) {
        lock(&self.state)
            .mounts
            .entry(cluster_id.to_owned())
            .or_default()
            .insert(mount_point.to_owned(), source.to_owned());
    }

    /// Makes the next executed script fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        lock(&self.state).failures.push_back(message.into());
    }

    /// Returns the source mounted at `mount_point`, if any.
    #[must_use]
    pub fn source(&self, cluster_id: &str, mount_point: &str) -> Option<String> {
        lock(&self.state)
            .mounts
            .get(cluster_id)
            .and_then(|table| table.get(mount_point).cloned())
    }

    /// Returns every script executed so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<ScriptInvocation> {
        lock(&self.state).invocations.clone()
    }

    fn run(&self, cluster_id: &str, script: &str) -> Result<String, CommandError> {
        let mut state = lock(&self.state);
        state.invocations.push(ScriptInvocation {
            cluster_id: cluster_id.to_owned(),
            script: script.to_owned(),
        });
        if let Some(message) = state.failures.pop_front() {
            return Err(CommandError::new(message));
        }
        let table = state.mounts.entry(cluster_id.to_owned()).or_default();

        if script.starts_with("def safe_mount") {
            let args = call_arguments(script, "mount_source = safe_mount(")?;
            let (Some(mount_point), Some(source)) = (string_at(&args, 0), string_at(&args, 1))
            else {
                return Err(CommandError::new("TypeError: safe_mount() arguments"));
            };
            let effective = table
                .entry(mount_point)
                .or_insert(source)
                .clone();
            return Ok(effective);
        }

        if let Some(mount_point) = assigned_literal(script, "mount_point = ") {
            table.remove(&mount_point);
            return Ok(DELETE_SUCCESS.to_owned());
        }

        let mount_point = assigned_literal(script, "    if mount.mountPoint == ")
            .ok_or_else(|| CommandError::new("SyntaxError: unrecognised script"))?;
        table
            .get(&mount_point)
            .cloned()
            .ok_or_else(|| CommandError::new(format!("Exception: {MOUNT_NOT_FOUND}")))
    }
}

impl CommandExecutor for InMemoryMountTable {
    fn execute<'a>(
        &'a self,
        cluster_id: &'a str,
        script: &'a str,
    ) -> BackendFuture<'a, String, CommandError> {
        let result = self.run(cluster_id, script);
        Box::pin(async move { result })
    }
}

fn call_arguments(script: &str, prefix: &str) -> Result<Vec<Value>, CommandError> {
    let args = script
        .lines()
        .find_map(|line| line.strip_prefix(prefix))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| CommandError::new("SyntaxError: missing call"))?;
    serde_json::from_str::<Vec<Value>>(&format!("[{args}]"))
        .map_err(|err| CommandError::new(format!("SyntaxError: {err}")))
}

fn string_at(args: &[Value], index: usize) -> Option<String> {
    args.get(index).and_then(Value::as_str).map(str::to_owned)
}

fn assigned_literal(script: &str, prefix: &str) -> Option<String> {
    let literal = script.lines().find_map(|line| line.strip_prefix(prefix))?;
    let value = literal.strip_suffix(':').unwrap_or(literal);
    serde_json::from_str::<String>(value).ok()
}

/// Cluster API double with scripted state transitions and failure injection.
#[derive(Clone, Debug, Default)]
pub struct ScriptedClusterApi {
    state: Arc<Mutex<ClusterTable>>,
}

#[derive(Debug, Default)]
struct ClusterTable {
    clusters: BTreeMap<String, ClusterInfo>,
    transitions: HashMap<String, VecDeque<ClusterState>>,
    provision_states: Vec<ClusterState>,
    created: Vec<ClusterRequest>,
    deleted: Vec<String>,
    started: Vec<String>,
    get_calls: usize,
    create_error: Option<ClusterApiError>,
    delete_error: Option<ClusterApiError>,
    next_id: usize,
}

impl ClusterTable {
    fn create(&mut self, request: &ClusterRequest) -> Result<String, ClusterApiError> {
        self.created.push(request.clone());
        if let Some(err) = self.create_error.clone() {
            return Err(err);
        }
        self.next_id += 1;
        let cluster_id = format!("cluster-{}", self.next_id);
        self.clusters.insert(
            cluster_id.clone(),
            ClusterInfo {
                cluster_id: cluster_id.clone(),
                cluster_name: request.cluster_name.clone(),
                state: ClusterState::Pending,
                state_message: String::new(),
                attributes: request.attributes.clone(),
            },
        );
        let states = self.provision_states.iter().copied().collect();
        self.transitions.insert(cluster_id.clone(), states);
        Ok(cluster_id)
    }

    fn start(&mut self, cluster_id: &str) -> Result<(), ClusterApiError> {
        self.started.push(cluster_id.to_owned());
        let Some(info) = self.clusters.get_mut(cluster_id) else {
            return Err(ClusterApiError::NotFound {
                cluster_id: cluster_id.to_owned(),
            });
        };
        info.state = ClusterState::Pending;
        let states = self.provision_states.iter().copied().collect();
        self.transitions.insert(cluster_id.to_owned(), states);
        Ok(())
    }

    fn permanent_delete(&mut self, cluster_id: &str) -> Result<(), ClusterApiError> {
        self.deleted.push(cluster_id.to_owned());
        if let Some(err) = self.delete_error.clone() {
            return Err(err);
        }
        self.clusters.remove(cluster_id);
        Ok(())
    }
}

impl ScriptedClusterApi {
    /// Creates an API with no clusters. Provisioned clusters start running.
    #[must_use]
    pub fn new() -> Self {
        let api = Self::default();
        lock(&api.state).provision_states = vec![ClusterState::Running];
        api
    }

    /// Adds an existing cluster.
    pub fn insert_cluster(
        &self,
        cluster_id: &str,
        state: ClusterState,
        instance_profile: Option<&InstanceProfileArn>,
    ) {
        let attributes = instance_profile.map_or_else(
            ClusterAttributes::default,
            ClusterAttributes::with_instance_profile,
        );
        lock(&self.state).clusters.insert(
            cluster_id.to_owned(),
            ClusterInfo {
                cluster_id: cluster_id.to_owned(),
                cluster_name: cluster_id.to_owned(),
                state,
                state_message: String::new(),
                attributes,
            },
        );
    }

    /// States reported by successive `get` calls for newly created or
    /// restarted clusters.
    /// The last state repeats once the sequence is exhausted.
    pub fn set_provision_states(&self, states: impl IntoIterator<Item = ClusterState>) {
        lock(&self.state).provision_states = states.into_iter().collect();
    }

    /// Makes `create` fail with `error`.
    pub fn fail_create(&self, error: ClusterApiError) {
        lock(&self.state).create_error = Some(error);
    }

    /// Makes `permanent_delete` fail with `error`.
    pub fn fail_delete(&self, error: ClusterApiError) {
        lock(&self.state).delete_error = Some(error);
    }

    /// Requests passed to `create`.
    #[must_use]
    pub fn created(&self) -> Vec<ClusterRequest> {
        lock(&self.state).created.clone()
    }

    /// Identifiers passed to `permanent_delete`.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.state).deleted.clone()
    }

    /// Identifiers passed to `start`.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        lock(&self.state).started.clone()
    }

    /// Number of `get` calls observed.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        lock(&self.state).get_calls
    }
}

impl ClusterApi for ScriptedClusterApi {
    fn get<'a>(&'a self, cluster_id: &'a str) -> BackendFuture<'a, ClusterInfo, ClusterApiError> {
        let result = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            state.get_calls += 1;
            let next = state.transitions.get_mut(cluster_id).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().copied()
                }
            });
            state
                .clusters
                .get_mut(cluster_id)
                .map(|info| {
                    if let Some(observed) = next {
                        info.state = observed;
                    }
                    info.clone()
                })
                .ok_or_else(|| ClusterApiError::NotFound {
                    cluster_id: cluster_id.to_owned(),
                })
        };
        Box::pin(async move { result })
    }

    fn list(&self) -> BackendFuture<'_, Vec<ClusterInfo>, ClusterApiError> {
        let clusters = lock(&self.state).clusters.values().cloned().collect();
        Box::pin(async move { Ok(clusters) })
    }

    fn create<'a>(
        &'a self,
        request: &'a ClusterRequest,
    ) -> BackendFuture<'a, String, ClusterApiError> {
        let result = lock(&self.state).create(request);
        Box::pin(async move { result })
    }

    fn start<'a>(&'a self, cluster_id: &'a str) -> BackendFuture<'a, (), ClusterApiError> {
        let result = lock(&self.state).start(cluster_id);
        Box::pin(async move { result })
    }

    fn permanent_delete<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BackendFuture<'a, (), ClusterApiError> {
        let result = lock(&self.state).permanent_delete(cluster_id);
        Box::pin(async move { result })
    }
}

/// Identity API double counting registrations.
#[derive(Clone, Debug, Default)]
pub struct RecordingInstanceProfiles {
    inner: Arc<ProfilesState>,
}

#[derive(Debug, Default)]
struct ProfilesState {
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    delay: Mutex<Duration>,
    failure: Mutex<Option<String>>,
}

impl RecordingInstanceProfiles {
    /// Creates a double that registers instantly and succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every registration, widening race windows in tests.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.inner.delay) = delay;
    }

    /// Makes registrations fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.inner.failure) = Some(message.into());
    }

    /// Number of `create` calls observed.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls observed.
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.inner.delete_calls.load(Ordering::SeqCst)
    }
}

impl InstanceProfileApi for RecordingInstanceProfiles {
    fn create<'a>(&'a self, arn: &'a InstanceProfileArn) -> BackendFuture<'a, (), IdentityError> {
        Box::pin(async move {
            self.inner.create_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *lock(&self.inner.delay);
            if !delay.is_zero() {
                sleep(delay).await;
            }
            let failure = lock(&self.inner.failure).clone();
            failure.map_or(Ok(()), |message| {
                Err(IdentityError {
                    arn: arn.as_str().to_owned(),
                    message,
                })
            })
        })
    }

    fn delete<'a>(&'a self, _arn: &'a InstanceProfileArn) -> BackendFuture<'a, (), IdentityError> {
        self.inner.delete_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}
