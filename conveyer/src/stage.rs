use std::fmt;

use futures::future::BoxFuture;

use crate::channel::Channel;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::ConveyerResult;

/// Boxed single-input, single-output worker.
pub type DecoratorWorker =
    Box<dyn FnOnce(ShutdownRx, Channel, Channel) -> BoxFuture<'static, ConveyerResult<()>> + Send>;

/// Boxed many-inputs, single-output worker.
pub type MultiplexerWorker = Box<
    dyn FnOnce(ShutdownRx, Vec<Channel>, Channel) -> BoxFuture<'static, ConveyerResult<()>> + Send,
>;

/// Boxed single-input, many-outputs worker.
pub type SeparatorWorker = Box<
    dyn FnOnce(ShutdownRx, Channel, Vec<Channel>) -> BoxFuture<'static, ConveyerResult<()>> + Send,
>;

/// Shape of a [`Stage`], used for logging and metrics.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StageKind {
    Decorator,
    Multiplexer,
    Separator,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Decorator => "decorator",
            StageKind::Multiplexer => "multiplexer",
            StageKind::Separator => "separator",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered unit of work together with the channels it was resolved against.
///
/// Stages are created by the conveyer's `register_*` methods and consumed by a single run.
pub enum Stage {
    Decorator {
        worker: DecoratorWorker,
        input: Channel,
        output: Channel,
    },
    Multiplexer {
        worker: MultiplexerWorker,
        inputs: Vec<Channel>,
        output: Channel,
    },
    Separator {
        worker: SeparatorWorker,
        input: Channel,
        outputs: Vec<Channel>,
    },
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Decorator { .. } => StageKind::Decorator,
            Stage::Multiplexer { .. } => StageKind::Multiplexer,
            Stage::Separator { .. } => StageKind::Separator,
        }
    }

    /// Invokes the worker with its channels, returning the future that drives it.
    pub fn start(self, shutdown_rx: ShutdownRx) -> BoxFuture<'static, ConveyerResult<()>> {
        match self {
            Stage::Decorator {
                worker,
                input,
                output,
            } => worker(shutdown_rx, input, output),
            Stage::Multiplexer {
                worker,
                inputs,
                output,
            } => worker(shutdown_rx, inputs, output),
            Stage::Separator {
                worker,
                input,
                outputs,
            } => worker(shutdown_rx, input, outputs),
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Decorator { input, output, .. } => f
                .debug_struct("Decorator")
                .field("input", input.name())
                .field("output", output.name())
                .finish_non_exhaustive(),
            Stage::Multiplexer { inputs, output, .. } => f
                .debug_struct("Multiplexer")
                .field("inputs", &inputs.iter().map(Channel::name).collect::<Vec<_>>())
                .field("output", output.name())
                .finish_non_exhaustive(),
            Stage::Separator { input, outputs, .. } => f
                .debug_struct("Separator")
                .field("input", input.name())
                .field(
                    "outputs",
                    &outputs.iter().map(Channel::name).collect::<Vec<_>>(),
                )
                .finish_non_exhaustive(),
        }
    }
}
