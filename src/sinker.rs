//! Lifecycle owner: options, construction, `Run` loop, shutdown
//! orchestration, cursor threading between sessions, handler dispatch
//! (spec §4.G).
//!
//! Grounded in the teacher's `start_stream`/`start_stream_channel`
//! (`src/lib.rs`) and `StreamConfig`, generalized into a builder + `Run`
//! loop, including the stats ticker, termination hooks, and
//! `HandleBlockRangeCompletion` semantics. Cancellation is modeled with a
//! `tokio::sync::watch` channel rather than `tokio_util::sync::
//! CancellationToken`, keeping the dependency list aligned with what the
//! teacher already pulls in via `tokio`'s `sync` feature (see DESIGN.md).

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::auth::CredentialKind;
use crate::backoff::BackoffPolicy;
use crate::block_range::BlockRange;
use crate::config::{ClientConfig, EndpointConfig, SinkerOptions, IGNORE_OUTPUT_MODULE_TYPE};
use crate::cursor::Cursor;
use crate::error::SinkError;
use crate::handler::{BlockDataHandler, CompletionHandler};
use crate::metrics::{Metrics, SinkerMetrics};
use crate::pb;
use crate::request::RequestBuilder;
use crate::session::{Mode, StreamSession, Termination};
use crate::transport::{GrpcTransport, Transport};
use crate::undo_buffer::UndoBuffer;

/// A cloneable handle to request shutdown from any task (spec §5 "the user
/// ... may invoke `Shutdown` from any task").
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
    err: Arc<Mutex<Option<SinkError>>>,
}

impl ShutdownHandle {
    /// Requests the run loop stop. If `err` is set, it becomes the error
    /// `Run` ultimately returns instead of whatever the loop was doing.
    pub fn shutdown(&self, err: Option<SinkError>) {
        if let Some(err) = err {
            *self.err.lock().unwrap() = Some(err);
        }
        let _ = self.tx.send(true);
    }
}

type TerminationHook = Box<dyn FnOnce(Option<&SinkError>) + Send>;

/// Top-level lifecycle owner (spec §4.G).
pub struct Sinker {
    mode: Mode,
    package: pb::Package,
    output_module: String,
    output_module_hash: String,
    output_module_type: String,
    client_config: ClientConfig,
    options: SinkerOptions,
    metrics: Arc<dyn Metrics>,
    termination_hooks: Vec<TerminationHook>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_err: Arc<Mutex<Option<SinkError>>>,
}

impl Sinker {
    pub fn new(
        mode: Mode,
        package: pb::Package,
        output_module: impl Into<String>,
        output_module_hash: impl Into<String>,
        client_config: ClientConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Sinker {
            mode,
            package,
            output_module: output_module.into(),
            output_module_hash: output_module_hash.into(),
            output_module_type: IGNORE_OUTPUT_MODULE_TYPE.to_string(),
            client_config,
            options: SinkerOptions::default(),
            metrics: Arc::new(SinkerMetrics::new()),
            termination_hooks: Vec::new(),
            shutdown_tx,
            shutdown_err: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_output_module_type(mut self, type_url: impl Into<String>) -> Self {
        self.output_module_type = type_url.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    // --- spec §6 option surface, mirrored from `SinkerOptions` -----------

    pub fn with_block_range(mut self, range: BlockRange) -> Self {
        self.options = self.options.with_block_range(range);
        self
    }

    pub fn with_block_data_buffer(mut self, n: u64) -> Self {
        self.options = self.options.with_block_data_buffer(n);
        self
    }

    pub fn with_final_blocks_only(mut self) -> Self {
        self.options = self.options.with_final_blocks_only();
        self
    }

    pub fn with_infinite_retry(mut self) -> Self {
        self.options = self.options.with_infinite_retry();
        self
    }

    pub fn with_retry_backoff(mut self, backoff: tokio_retry::strategy::ExponentialBackoff) -> Self {
        self.options = self.options.with_retry_backoff(backoff);
        self
    }

    pub fn with_liveness_checker(mut self, checker: Box<dyn crate::liveness::LivenessChecker>) -> Self {
        self.options = self.options.with_liveness_checker(checker);
        self
    }

    // --- accessors (spec §4.G "Public surface") --------------------------

    pub fn block_range(&self) -> BlockRange {
        self.options.block_range
    }

    pub fn package(&self) -> &pb::Package {
        &self.package
    }

    pub fn output_module(&self) -> &str {
        &self.output_module
    }

    pub fn output_module_hash(&self) -> &str {
        &self.output_module_hash
    }

    pub fn output_module_name(&self) -> &str {
        &self.output_module
    }

    pub fn output_module_type_prefixed(&self) -> String {
        format!("proto:{}", self.output_module_type)
    }

    pub fn output_module_type_unprefixed(&self) -> &str {
        &self.output_module_type
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn endpoint_config(&self) -> &EndpointConfig {
        &self.client_config.endpoint
    }

    /// Resolves and returns the currently-configured API token, if any. Note
    /// this re-resolves on every call (spec §4.I: the authenticator never
    /// caches the resolved value).
    pub fn api_token(&self) -> Option<String> {
        let cred = self.client_config.authenticator.resolve();
        match cred.kind {
            CredentialKind::None => None,
            _ => Some(cred.value),
        }
    }

    // --- lifecycle ---------------------------------------------------------

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: self.shutdown_tx.clone(), err: self.shutdown_err.clone() }
    }

    /// Registers a callback invoked once, after the run loop exits, with the
    /// error (if any) `Run` is about to return.
    pub fn on_terminating(&mut self, hook: impl FnOnce(Option<&SinkError>) + Send + 'static) {
        self.termination_hooks.push(Box::new(hook));
    }

    /// Blocks until the stop block is reached, the shutdown handle fires, a
    /// fatal error occurs, or backoff is exhausted (spec §4.G "Run loop").
    pub async fn run<H>(
        &mut self,
        mut cursor: Cursor,
        mut handler: H,
        mut completion: Option<Box<dyn CompletionHandler>>,
    ) -> Result<(), SinkError>
    where
        H: BlockDataHandler,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let stats_task = spawn_stats_ticker(self.metrics.clone(), self.shutdown_tx.subscribe());

        let transport_result = GrpcTransport::connect(self.client_config.clone()).await;
        let result = match transport_result {
            Ok(transport) => {
                self.drive(&transport, &mut cursor, &mut handler, &mut completion, &mut shutdown_rx)
                    .await
            }
            Err(e) => Err(e),
        };

        // A `Shutdown(err)` call races with the loop's own outcome; an
        // explicitly supplied shutdown error takes precedence.
        let result = match self.shutdown_err.lock().unwrap().take() {
            Some(forced) => Err(forced),
            None => result,
        };

        stats_task.abort();
        tracing::info!(
            outcome = ?result.as_ref().map(|_| "ok").map_err(|e| e.to_string()),
            summary = ?self.metrics.stats_summary(),
            "sink run terminated"
        );

        for hook in self.termination_hooks.drain(..) {
            hook(result.as_ref().err());
        }

        result
    }

    async fn drive<H>(
        &mut self,
        transport: &dyn Transport,
        cursor: &mut Cursor,
        handler: &mut H,
        completion: &mut Option<Box<dyn CompletionHandler>>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), SinkError>
    where
        H: BlockDataHandler,
    {
        let mut backoff = match self.options.backoff.clone() {
            Some(strategy) => BackoffPolicy::with_strategy(strategy, self.options.infinite_retry),
            None => BackoffPolicy::new(self.options.infinite_retry),
        };
        let mut request_active_start_block: u64 = 0;

        loop {
            if *shutdown_rx.borrow() {
                return Ok(());
            }

            let undo_buffer_capacity =
                if self.options.final_blocks_only { 0 } else { self.options.block_data_buffer };
            let mut undo_buffer = (undo_buffer_capacity > 0)
                .then(|| UndoBuffer::new(undo_buffer_capacity as usize));

            let request_builder = RequestBuilder {
                modules: self.package.modules.as_ref(),
                output_module: &self.output_module,
                production_mode: self.mode == Mode::Production,
                final_blocks_only: self.options.final_blocks_only,
            };
            let request =
                request_builder.build(&self.options.block_range, cursor, undo_buffer_capacity);

            let stream = match transport.open(request).await {
                Ok(stream) => stream,
                Err(e) if e.is_retryable() => {
                    match backoff.next_backoff(e) {
                        Ok(delay) => {
                            if sleep_or_shutdown(delay, shutdown_rx).await {
                                return Ok(());
                            }
                            continue;
                        }
                        Err(expired) => return Err(expired),
                    }
                }
                Err(e) => return Err(e),
            };

            let mut session = StreamSession {
                handler: &mut *handler,
                undo_buffer: undo_buffer.as_mut(),
                liveness: self.options.liveness_checker.as_deref(),
                metrics: self.metrics.as_ref(),
                mode: self.mode,
            };

            let outcome = session
                .run(stream, &mut *cursor, &mut request_active_start_block, &mut *shutdown_rx)
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) if e.is_retryable() => {
                    match backoff.next_backoff(e) {
                        Ok(delay) => {
                            if sleep_or_shutdown(delay, shutdown_rx).await {
                                return Ok(());
                            }
                            continue;
                        }
                        Err(expired) => return Err(expired),
                    }
                }
                Err(e) => return Err(e),
            };

            if outcome.received_message {
                backoff.reset();
            }

            match outcome.termination {
                Termination::Cancelled => return Ok(()),
                Termination::Eof => {
                    if self.options.block_range.is_bounded() {
                        if let Some(completion_handler) = completion.as_mut() {
                            completion_handler.handle_block_range_completion(cursor).await.map_err(
                                |e| SinkError::Handler { cursor: cursor.as_str().to_string(), source: e },
                            )?;
                        }
                        return Ok(());
                    }
                    // Infinite range closed the stream early (e.g. a
                    // load-balancer idle timeout); reconnect with the cursor
                    // where we left off rather than treating it as fatal.
                    continue;
                }
            }
        }
    }
}

/// Sleeps for `delay`, or returns early if shutdown is requested in the
/// meantime. Returns `true` if shutdown won the race (spec §5 "Backoff sleep
/// is also context-aware."). Mirrors the same `tokio::select!` pattern
/// `StreamSession::run` uses against its own shutdown receiver.
async fn sleep_or_shutdown(delay: std::time::Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
        _ = tokio::time::sleep(delay) => false,
    }
}

fn spawn_stats_ticker(
    metrics: Arc<dyn Metrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let interval_duration = SinkerOptions::stats_interval(tracing::enabled!(tracing::Level::DEBUG));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval_duration);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(summary) = metrics.stats_summary() {
                        tracing::info!(%summary, "sink stats");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
