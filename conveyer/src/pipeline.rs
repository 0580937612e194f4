use std::future::Future;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use conveyer_config::shared::{ConveyerConfig, ErrorPolicy};
use futures::FutureExt;
use metrics::{counter, gauge};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::bail;
use crate::channel::Channel;
use crate::concurrency::shutdown::{ShutdownRx, create_shutdown_channel};
use crate::conveyer_error;
use crate::error::{ConveyerError, ConveyerResult, ErrorKind};
use crate::metrics::{
    CONVEYER_ACTIVE_STAGES, CONVEYER_ID_LABEL, CONVEYER_RUNS_TOTAL, CONVEYER_STAGE_FAILURES_TOTAL,
    ERROR_KIND_LABEL, STAGE_KIND_LABEL,
};
use crate::registry::ChannelRegistry;
use crate::stage::{Stage, StageKind};

/// Value returned by [`Conveyer::recv`] once a channel is closed and drained.
pub const UNDEFINED: &str = "undefined";

pub type ConveyerId = u64;

static NEXT_CONVEYER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
enum StagesState {
    Registering(Vec<Stage>),
    Consumed,
}

#[derive(Debug)]
struct ConveyerInner {
    id: ConveyerId,
    error_policy: ErrorPolicy,
    registry: ChannelRegistry,
    stages: Mutex<StagesState>,
}

/// In-process pipeline of text-transforming stages connected by named channels.
///
/// A [`Conveyer`] is constructed, has stages registered against channel names, and is then run
/// exactly once. While [`Conveyer::run`] is in progress other clones of the handle can inject and
/// extract values with [`Conveyer::send`] and [`Conveyer::recv`]. When the run ends every
/// channel is closed.
#[derive(Debug, Clone)]
pub struct Conveyer {
    inner: Arc<ConveyerInner>,
}

impl Conveyer {
    /// Creates a conveyer whose channels buffer up to `buffer_size` values.
    ///
    /// A zero buffer size is raised to one, the smallest capacity a bounded channel supports.
    pub fn new(buffer_size: usize) -> Self {
        Self::with_config(ConveyerConfig {
            buffer_size,
            ..ConveyerConfig::default()
        })
    }

    /// Creates a conveyer from a [`ConveyerConfig`].
    pub fn with_config(config: ConveyerConfig) -> Self {
        let id = NEXT_CONVEYER_ID.fetch_add(1, Ordering::Relaxed);

        let buffer_size = if config.buffer_size == 0 {
            warn!(conveyer_id = id, "buffer size of zero is not supported, using 1");
            1
        } else {
            config.buffer_size
        };

        Self {
            inner: Arc::new(ConveyerInner {
                id,
                error_policy: config.error_policy,
                registry: ChannelRegistry::new(buffer_size),
                stages: Mutex::new(StagesState::Registering(Vec::new())),
            }),
        }
    }

    /// Creates a conveyer from a [`ConveyerConfig`], rejecting invalid settings instead of
    /// normalizing them.
    pub fn try_with_config(config: ConveyerConfig) -> ConveyerResult<Self> {
        config.validate()?;

        Ok(Self::with_config(config))
    }

    pub fn id(&self) -> ConveyerId {
        self.inner.id
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.registry.capacity()
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.inner.error_policy
    }

    /// Returns the channel registered under `name`, if any stage referenced it.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.inner.registry.get(name)
    }

    /// Returns the number of stages waiting to be run.
    pub fn stage_count(&self) -> usize {
        match &*self.lock_stages() {
            StagesState::Registering(stages) => stages.len(),
            StagesState::Consumed => 0,
        }
    }

    /// Registers a single-input, single-output stage.
    pub fn register_decorator<F, Fut>(&self, worker: F, input: &str, output: &str)
    where
        F: FnOnce(ShutdownRx, Channel, Channel) -> Fut + Send + 'static,
        Fut: Future<Output = ConveyerResult<()>> + Send + 'static,
    {
        let input = self.inner.registry.resolve(input);
        let output = self.inner.registry.resolve(output);

        self.push_stage(Stage::Decorator {
            worker: Box::new(
                move |shutdown_rx: ShutdownRx, input: Channel, output: Channel| {
                    worker(shutdown_rx, input, output).boxed()
                },
            ),
            input,
            output,
        });
    }

    /// Registers a many-inputs, single-output stage.
    pub fn register_multiplexer<F, Fut, S>(&self, worker: F, inputs: &[S], output: &str)
    where
        F: FnOnce(ShutdownRx, Vec<Channel>, Channel) -> Fut + Send + 'static,
        Fut: Future<Output = ConveyerResult<()>> + Send + 'static,
        S: AsRef<str>,
    {
        let inputs = inputs
            .iter()
            .map(|name| self.inner.registry.resolve(name.as_ref()))
            .collect();
        let output = self.inner.registry.resolve(output);

        self.push_stage(Stage::Multiplexer {
            worker: Box::new(
                move |shutdown_rx: ShutdownRx, inputs: Vec<Channel>, output: Channel| {
                    worker(shutdown_rx, inputs, output).boxed()
                },
            ),
            inputs,
            output,
        });
    }

    /// Registers a single-input, many-outputs stage.
    pub fn register_separator<F, Fut, S>(&self, worker: F, input: &str, outputs: &[S])
    where
        F: FnOnce(ShutdownRx, Channel, Vec<Channel>) -> Fut + Send + 'static,
        Fut: Future<Output = ConveyerResult<()>> + Send + 'static,
        S: AsRef<str>,
    {
        let input = self.inner.registry.resolve(input);
        let outputs = outputs
            .iter()
            .map(|name| self.inner.registry.resolve(name.as_ref()))
            .collect();

        self.push_stage(Stage::Separator {
            worker: Box::new(
                move |shutdown_rx: ShutdownRx, input: Channel, outputs: Vec<Channel>| {
                    worker(shutdown_rx, input, outputs).boxed()
                },
            ),
            input,
            outputs,
        });
    }

    /// Runs every registered stage until they all finish, one fails, or `shutdown_rx` fires.
    ///
    /// A stage failure requests shutdown of all the other stages. The run returns only after every
    /// stage task has finished, and closes every registered channel before returning. Dropping the
    /// returned future aborts the stage tasks and closes every channel as well. With
    /// [`ErrorPolicy::FirstError`] the first observed stage error is returned and later ones are
    /// logged and dropped; with [`ErrorPolicy::Aggregate`] all of them are returned together.
    ///
    /// Shutdown through `shutdown_rx` is not an error. A conveyer can only be run once, further
    /// calls fail with [`ErrorKind::AlreadyRun`].
    pub async fn run(&self, mut shutdown_rx: ShutdownRx) -> ConveyerResult<()> {
        let stages = self.take_stages()?;
        let conveyer_id = self.inner.id;

        info!(
            conveyer_id,
            stages = stages.len(),
            channels = self.inner.registry.len(),
            "starting conveyer"
        );
        debug!(conveyer_id, channels = ?self.inner.registry.names(), "registered channels");
        counter!(CONVEYER_RUNS_TOTAL, CONVEYER_ID_LABEL => conveyer_id.to_string()).increment(1);

        // Stages observe a child signal so that a failing stage can stop its siblings without
        // touching the caller's signal.
        let (stages_shutdown_tx, stages_shutdown_rx) = create_shutdown_channel();

        let active_stages = gauge!(
            CONVEYER_ACTIVE_STAGES,
            CONVEYER_ID_LABEL => conveyer_id.to_string()
        );

        // Declared before the tasks so that it drops after them, also when this future is dropped
        // before completion.
        let _close_channels = CloseChannelsOnDrop {
            conveyer_id,
            registry: &self.inner.registry,
        };

        let mut tasks = JoinSet::new();
        for (index, stage) in stages.into_iter().enumerate() {
            let kind = stage.kind();
            let future = stage.start(stages_shutdown_rx.clone());
            tasks.spawn(async move { (index, kind, future.await) });
        }
        active_stages.set(tasks.len() as f64);

        let mut errors: Vec<ConveyerError> = Vec::new();
        let mut caller_shutdown_seen = false;
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.cancelled(), if !caller_shutdown_seen => {
                    caller_shutdown_seen = true;
                    info!(conveyer_id, "shutdown requested, stopping stages");
                    stages_shutdown_tx.shutdown();
                }

                result = tasks.join_next() => {
                    let Some(result) = result else {
                        break;
                    };
                    active_stages.set(tasks.len() as f64);

                    let (index, kind, error): (Option<usize>, Option<StageKind>, ConveyerError) =
                        match result {
                            Ok((index, kind, Ok(()))) => {
                                debug!(conveyer_id, stage = index, %kind, "stage completed");
                                continue;
                            }
                            Ok((index, kind, Err(err))) => (Some(index), Some(kind), err),
                            // A panicking task loses its index and kind along with its output.
                            Err(join_err) => (None, None, join_err.into()),
                        };

                    error!(conveyer_id, stage = ?index, kind = ?kind, error = %error, "stage failed");
                    counter!(
                        CONVEYER_STAGE_FAILURES_TOTAL,
                        CONVEYER_ID_LABEL => conveyer_id.to_string(),
                        STAGE_KIND_LABEL => kind.map(|kind| kind.as_str()).unwrap_or("unknown"),
                        ERROR_KIND_LABEL => format!("{:?}", error.kind())
                    )
                    .increment(1);

                    if stages_shutdown_tx.shutdown() {
                        info!(conveyer_id, "stage failure, stopping remaining stages");
                    }

                    match self.inner.error_policy {
                        ErrorPolicy::FirstError if !errors.is_empty() => {
                            debug!(conveyer_id, "dropping error observed after the first one");
                        }
                        _ => errors.push(error),
                    }
                }
            }
        }

        if errors.is_empty() {
            return Ok(());
        }

        Err(errors.into())
    }

    /// Sends `value` on the channel registered under `name`.
    ///
    /// Waits for buffer space if the channel is full. Fails with [`ErrorKind::ChannelNotFound`] if
    /// no stage registered `name` and with [`ErrorKind::ChannelClosed`] if the run already ended.
    pub async fn send(&self, name: &str, value: impl Into<String>) -> ConveyerResult<()> {
        let Some(channel) = self.inner.registry.get(name) else {
            bail!(ErrorKind::ChannelNotFound, "Channel not found", name);
        };

        channel.send(value.into()).await
    }

    /// Receives the next value from the channel registered under `name`.
    ///
    /// Waits until a value is available. Returns [`UNDEFINED`] once the channel is closed and
    /// drained. Fails with [`ErrorKind::ChannelNotFound`] if no stage registered `name`.
    pub async fn recv(&self, name: &str) -> ConveyerResult<String> {
        let Some(channel) = self.inner.registry.get(name) else {
            bail!(ErrorKind::ChannelNotFound, "Channel not found", name);
        };

        Ok(channel.recv().await.unwrap_or_else(|| UNDEFINED.to_owned()))
    }

    fn push_stage(&self, stage: Stage) {
        match &mut *self.lock_stages() {
            StagesState::Registering(stages) => {
                debug!(conveyer_id = self.inner.id, ?stage, "registered stage");
                stages.push(stage);
            }
            StagesState::Consumed => {
                warn!(
                    conveyer_id = self.inner.id,
                    ?stage,
                    "conveyer was already run, ignoring stage registration"
                );
            }
        }
    }

    fn take_stages(&self) -> ConveyerResult<Vec<Stage>> {
        match mem::replace(&mut *self.lock_stages(), StagesState::Consumed) {
            StagesState::Registering(stages) => Ok(stages),
            StagesState::Consumed => Err(conveyer_error!(
                ErrorKind::AlreadyRun,
                "Conveyer was already run",
                self.inner.id
            )),
        }
    }

    fn lock_stages(&self) -> MutexGuard<'_, StagesState> {
        self.inner
            .stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Closes every channel of a run once the run ends, whether it completed or its future was
/// dropped.
struct CloseChannelsOnDrop<'a> {
    conveyer_id: ConveyerId,
    registry: &'a ChannelRegistry,
}

impl Drop for CloseChannelsOnDrop<'_> {
    fn drop(&mut self) {
        let closed = self.registry.close_all();
        info!(
            conveyer_id = self.conveyer_id,
            closed_channels = closed,
            "conveyer stopped"
        );
    }
}
