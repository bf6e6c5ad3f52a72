//! Async driver for a [`Session`].
//!
//! The dispatcher owns the session inside a single tokio task and feeds it
//! from one unbounded inbox. User commands, scanner callbacks (delivered
//! through the [`GatewayEventSink`] returned by
//! [`DispatcherHandle::gateway_sink`]) and stop-capture ticks all arrive
//! there, so the session sees one event at a time no matter which thread
//! produced it.
//!
//! Directives returned by the session are carried out here:
//!
//! - stop-capture ticks are delayed with `tokio::time::sleep`
//! - settle delays pause the inbox before the session resumes
//! - quality scoring and export run on the blocking pool
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use fingerscan_core::SessionConfig;
//! use fingerscan_hardware::mock::{MockDevice, MockGateway};
//! use fingerscan_session::{AppState, SessionDispatcher};
//!
//! #[tokio::main]
//! async fn main() -> fingerscan_core::Result<()> {
//!     let (gateway, mock) = MockGateway::new();
//!     let (handle, _effects) = SessionDispatcher::new(Arc::new(gateway), SessionConfig::default()).start();
//!     mock.connect(handle.gateway_sink());
//!     mock.attach(MockDevice::new("KOJAK", "0001"));
//!
//!     let mut snapshots = handle.subscribe();
//!     snapshots
//!         .wait_for(|s| s.state == AppState::ScannerAttached)
//!         .await
//!         .ok();
//!
//!     handle.open()?;
//!     handle.shutdown().await
//! }
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use fingerscan_core::{Error, Result, SessionConfig};
use fingerscan_hardware::{GatewayEventSink, ScanGateway};

use crate::capability::CaptureMode;
use crate::effects::SessionEffect;
use crate::event::{Directive, SessionEvent, UserCommand};
use crate::export::{ImageExporter, PngExporter};
use crate::session::{Session, SessionSnapshot};

/// Configures and starts the task that owns a [`Session`].
pub struct SessionDispatcher<G> {
    gateway: Arc<G>,
    config: SessionConfig,
    exporter: Arc<dyn ImageExporter>,
}

impl<G: ScanGateway + 'static> SessionDispatcher<G> {
    /// Dispatcher exporting into the working directory.
    pub fn new(gateway: Arc<G>, config: SessionConfig) -> Self {
        Self {
            gateway,
            config,
            exporter: Arc::new(PngExporter::new(PathBuf::from("."))),
        }
    }

    /// Replace the image exporter.
    pub fn with_exporter(mut self, exporter: Arc<dyn ImageExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    /// Spawn the dispatcher task.
    ///
    /// Must be called from within a tokio runtime. The returned effects
    /// receiver is unbounded; see [`Session::new`](crate::Session::new) for
    /// what that means for a consumer that stops reading.
    pub fn start(self) -> (DispatcherHandle, mpsc::UnboundedReceiver<SessionEffect>) {
        let (session, effects) = Session::new(self.gateway, self.config);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = DispatchLoop {
            session,
            inbox_tx: inbox_tx.clone(),
            snapshot_tx,
            exporter: self.exporter,
            workers: JoinSet::new(),
        };
        let task = tokio::spawn(worker.run(inbox_rx, shutdown_rx));

        let handle = DispatcherHandle {
            inbox: inbox_tx,
            snapshot: snapshot_rx,
            shutdown: shutdown_tx,
            task,
        };
        (handle, effects)
    }
}

/// Handle for talking to a running dispatcher.
pub struct DispatcherHandle {
    inbox: mpsc::UnboundedSender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Sink that routes scanner callbacks into the session inbox.
    ///
    /// Hand this to the gateway so callbacks from any thread are serialized
    /// with user commands.
    pub fn gateway_sink(&self) -> GatewayEventSink {
        GatewayEventSink::from_sender(self.inbox.clone())
    }

    /// Queue an event for the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatcherStopped`] once the dispatcher task has ended.
    pub fn send(&self, event: impl Into<SessionEvent>) -> Result<()> {
        self.inbox
            .send(event.into())
            .map_err(|_| Error::DispatcherStopped)
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(UserCommand::Refresh)
    }

    pub fn open(&self) -> Result<()> {
        self.send(UserCommand::Open)
    }

    pub fn start_capture(&self, mode: Option<CaptureMode>) -> Result<()> {
        self.send(UserCommand::StartCapture(mode))
    }

    pub fn stop_capture(&self) -> Result<()> {
        self.send(UserCommand::StopCapture)
    }

    pub fn close(&self) -> Result<()> {
        self.send(UserCommand::Close)
    }

    pub fn select_capture_mode(&self, index: usize) -> Result<()> {
        self.send(UserCommand::SelectCaptureMode(index))
    }

    pub fn export_last_image(&self, file_name: Option<String>) -> Result<()> {
        self.send(UserCommand::ExportLastImage(file_name))
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified after every processed event.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Whether the dispatcher task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the dispatcher.
    ///
    /// Pending ticks and background work are aborted, then the session
    /// releases its device. Individual task failures are logged and do not
    /// fail shutdown.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => {
                error!("Session dispatcher panicked: {}", e);
                Err(Error::DispatcherStopped)
            }
        }
    }
}

/// State owned by the dispatcher task.
struct DispatchLoop<G> {
    session: Session<G>,
    inbox_tx: mpsc::UnboundedSender<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    exporter: Arc<dyn ImageExporter>,
    workers: JoinSet<Result<()>>,
}

impl<G: ScanGateway + 'static> DispatchLoop<G> {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<SessionEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!("Session dispatcher started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = inbox.recv() => match event {
                    Some(event) => {
                        let directives = self.session.handle(event);
                        self.execute(directives).await;
                        self.publish();
                    }
                    None => break,
                },
                Some(result) = self.workers.join_next(), if !self.workers.is_empty() => {
                    log_termination(classify_task_result(result));
                }
            }
        }

        self.stop().await;
    }

    async fn execute(&mut self, directives: Vec<Directive>) {
        let mut queue = VecDeque::from(directives);

        while let Some(directive) = queue.pop_front() {
            match directive {
                Directive::ScheduleStopTick { delay, tick } => {
                    let inbox = self.inbox_tx.clone();
                    self.workers.spawn(async move {
                        tokio::time::sleep(delay).await;
                        inbox
                            .send(SessionEvent::StopCaptureTick(tick))
                            .map_err(|_| Error::DispatcherStopped)
                    });
                }
                Directive::Settle(delay) => {
                    debug!("Settling for {:?}", delay);
                    self.publish();
                    tokio::time::sleep(delay).await;
                    queue.extend(self.session.resume());
                }
                Directive::ComputeQuality { device, image } => {
                    let gateway = Arc::clone(self.session.gateway());
                    let effects = self.session.effect_sender();
                    self.workers.spawn_blocking(move || {
                        let effect = match gateway.compute_quality_score(device, &image) {
                            Ok(score) => {
                                debug!("Quality score {} for {}", score, device);
                                SessionEffect::QualityScore(score)
                            }
                            Err(e) => {
                                warn!("Could not compute quality score: {}", e);
                                SessionEffect::Notice(format!(
                                    "Could not compute quality score with error {}",
                                    e
                                ))
                            }
                        };
                        let _ = effects.send(effect);
                        Ok(())
                    });
                }
                Directive::Export { image, file_name } => {
                    let exporter = Arc::clone(&self.exporter);
                    let effects = self.session.effect_sender();
                    self.workers.spawn_blocking(move || {
                        let result = exporter.export(&image, &file_name);
                        let _ = effects.send(SessionEffect::ExportFinished {
                            file_name,
                            result: match &result {
                                Ok(path) => Ok(path.clone()),
                                Err(e) => Err(e.to_string()),
                            },
                        });
                        result.map(|_| ())
                    });
                }
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }

    async fn stop(mut self) {
        self.workers.abort_all();

        let mut error_count = 0;
        let mut panic_count = 0;
        while let Some(result) = self.workers.join_next().await {
            match classify_task_result(result) {
                TaskTermination::Error(_) => error_count += 1,
                TaskTermination::Panic => panic_count += 1,
                TaskTermination::Success | TaskTermination::Cancelled => {}
            }
        }
        if error_count + panic_count > 0 {
            warn!(
                "Dispatcher workers ended with {} errors and {} panics",
                error_count, panic_count
            );
        }

        self.session.shutdown();
        self.publish();
        info!("Session dispatcher stopped");
    }
}

/// Task termination classification.
#[derive(Debug)]
enum TaskTermination {
    Success,
    Error(Error),
    /// Aborted, which is expected during shutdown.
    Cancelled,
    Panic,
}

fn classify_task_result(result: std::result::Result<Result<()>, JoinError>) -> TaskTermination {
    match result {
        Ok(Ok(())) => TaskTermination::Success,
        Ok(Err(e)) => TaskTermination::Error(e),
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}

fn log_termination(termination: TaskTermination) {
    match termination {
        TaskTermination::Success | TaskTermination::Cancelled => {}
        TaskTermination::Error(e) => warn!("Dispatcher worker failed: {}", e),
        TaskTermination::Panic => error!("Dispatcher worker panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fingerscan_hardware::mock::{MockDevice, MockGateway, MockGatewayHandle};

    use crate::state_machine::AppState;

    fn start() -> (
        DispatcherHandle,
        mpsc::UnboundedReceiver<SessionEffect>,
        MockGatewayHandle,
    ) {
        let (gateway, mock) = MockGateway::new();
        let (handle, effects) =
            SessionDispatcher::new(Arc::new(gateway), SessionConfig::default()).start();
        mock.connect(handle.gateway_sink());
        (handle, effects, mock)
    }

    #[test]
    fn test_classify_task_result() {
        assert!(matches!(
            classify_task_result(Ok(Ok(()))),
            TaskTermination::Success
        ));
        assert!(matches!(
            classify_task_result(Ok(Err(Error::NoCapturedImage))),
            TaskTermination::Error(Error::NoCapturedImage)
        ));
    }

    #[tokio::test]
    async fn test_attach_reaches_scanner_attached() {
        let (handle, _effects, mock) = start();
        let mut snapshots = handle.subscribe();

        mock.attach(MockDevice::new("KOJAK", "0001"));

        let snapshot = snapshots
            .wait_for(|s| s.state == AppState::ScannerAttached)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.description, "KOJAK - 0001");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let (handle, _effects, _mock) = start();
        let sender = handle.inbox.clone();
        handle.shutdown().await.unwrap();

        assert!(sender.send(UserCommand::Refresh.into()).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_device() {
        let (handle, _effects, mock) = start();
        mock.attach_silently(MockDevice::new("WATSON MINI", "1"));
        let mut snapshots = handle.subscribe();

        handle.refresh().unwrap();
        handle.open().unwrap();
        snapshots
            .wait_for(|s| s.state == AppState::Initialized)
            .await
            .unwrap();
        assert!(mock.open_handle().is_some());

        handle.shutdown().await.unwrap();
        assert!(mock.open_handle().is_none());
    }
}
