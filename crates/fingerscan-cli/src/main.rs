//! Demo driver for the fingerprint capture session.
//!
//! Runs a scripted scenario against the mock gateway through the real
//! dispatcher and prints every session effect as it is published.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use fingerscan_core::SessionConfig;
use fingerscan_hardware::mock::{MockDevice, MockGateway, MockGatewayHandle};
use fingerscan_hardware::{
    FingerCountState, FingerQualityState, GatewayEvent, ImageData, ImageType,
};
use fingerscan_session::{
    AppState, DispatcherHandle, PngExporter, SessionDispatcher, SessionEffect,
};

/// How long any single scenario step may take.
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Fingerscan - fingerprint capture session demo
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    scenario: Option<Scenario>,

    /// JSON session configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Product id reported by the simulated scanner
    #[arg(long, default_value = "KOJAK", global = true)]
    product: String,

    /// Serial number reported by the simulated scanner
    #[arg(long, default_value = "0001", global = true)]
    serial: String,

    /// Capture mode index to select after opening
    #[arg(long, global = true)]
    mode: Option<usize>,

    /// Override the stop-capture retry interval in milliseconds
    #[arg(long, global = true)]
    stop_interval_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Scenario {
    /// Capture one image and export it
    Capture {
        /// Directory the image is written to
        #[arg(long, default_value = ".")]
        export_dir: PathBuf,

        /// Export file name, without extension
        #[arg(long)]
        file_name: Option<String>,
    },

    /// Start a capture and stop it while the scanner is slow to cancel
    Stop {
        /// Liveness polls that still report an active capture
        #[arg(long, default_value = "2")]
        busy_polls: usize,
    },

    /// Unplug the scanner while it is open
    Unplug,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(interval) = cli.stop_interval_ms {
        config.stop_retry_interval_ms = interval;
        config.validate().context("Invalid --stop-interval-ms")?;
    }

    let scenario = cli.scenario.unwrap_or(Scenario::Capture {
        export_dir: PathBuf::from("."),
        file_name: None,
    });
    let export_dir = match &scenario {
        Scenario::Capture { export_dir, .. } => export_dir.clone(),
        _ => PathBuf::from("."),
    };

    let (gateway, mock) = MockGateway::new();
    let (handle, effects) = SessionDispatcher::new(Arc::new(gateway), config)
        .with_exporter(Arc::new(PngExporter::new(export_dir)))
        .start();
    mock.connect(handle.gateway_sink());

    let mut demo = Demo {
        handle,
        effects,
        mock,
    };
    let outcome = demo.run(&cli.product, &cli.serial, cli.mode, scenario).await;
    if let Err(e) = &outcome {
        error!("Scenario failed: {:#}", e);
    }

    let snapshot = demo.handle.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    demo.handle.shutdown().await?;
    outcome
}

struct Demo {
    handle: DispatcherHandle,
    effects: mpsc::UnboundedReceiver<SessionEffect>,
    mock: MockGatewayHandle,
}

impl Demo {
    async fn run(
        &mut self,
        product: &str,
        serial: &str,
        mode: Option<usize>,
        scenario: Scenario,
    ) -> Result<()> {
        info!("Running {:?} against {} - {}", scenario, product, serial);
        self.mock.attach(MockDevice::new(product, serial).with_leds());
        self.wait_for_state(AppState::ScannerAttached).await?;

        self.handle.open()?;
        self.wait_for_state(AppState::Initialized).await?;
        if let Some(index) = mode {
            self.handle.select_capture_mode(index)?;
        }

        match scenario {
            Scenario::Capture { file_name, .. } => self.capture(file_name).await,
            Scenario::Stop { busy_polls } => self.stop(busy_polls).await,
            Scenario::Unplug => {
                info!("Unplugging the open scanner");
                self.mock.detach(0);
                self.wait_for_state(AppState::NoScannerAttached).await
            }
        }
    }

    async fn capture(&mut self, file_name: Option<String>) -> Result<()> {
        self.handle.start_capture(None)?;
        self.wait_for_state(AppState::Capturing).await?;

        let image_type = self
            .handle
            .snapshot()
            .active_capture
            .map_or(ImageType::FlatSingleFinger, |mode| mode.image_type());

        self.mock.report_finger_count(FingerCountState::Ok);
        self.mock.report_finger_quality(vec![
            FingerQualityState::Good,
            FingerQualityState::Good,
            FingerQualityState::Fair,
            FingerQualityState::InvalidAreaRight,
        ]);
        if let Some(device) = self.mock.open_handle() {
            self.mock.emit(GatewayEvent::PreviewAvailable {
                device,
                image: ImageData::blank(400, 375).with_frame_time(0.042),
            });
        }
        self.mock
            .complete_capture(ImageData::blank(800, 750), image_type, None);

        self.wait_for_state(AppState::Initialized).await?;
        self.wait_for(|effect| matches!(effect, SessionEffect::QualityScore(_)))
            .await?;

        info!("Exporting the captured image");
        self.handle.export_last_image(file_name)?;
        let outcome = self
            .wait_for(|effect| matches!(effect, SessionEffect::ExportFinished { .. }))
            .await?;
        match outcome {
            SessionEffect::ExportFinished { result: Err(e), .. } => bail!("Export failed: {}", e),
            _ => Ok(()),
        }
    }

    async fn stop(&mut self, busy_polls: usize) -> Result<()> {
        self.handle.start_capture(None)?;
        self.wait_for_state(AppState::Capturing).await?;

        self.mock.script_capture_active(
            std::iter::repeat_n(Ok(true), busy_polls).chain(std::iter::once(Ok(false))),
        );
        info!("Stopping capture, scanner stays busy for {} polls", busy_polls);
        self.handle.stop_capture()?;
        self.wait_for_state(AppState::Initialized).await
    }

    async fn wait_for_state(&mut self, state: AppState) -> Result<()> {
        debug!("Waiting for {}", state);
        self.wait_for(|effect| matches!(effect, SessionEffect::StateChanged { to, .. } if *to == state))
            .await
            .with_context(|| format!("Session never reached {}", state))?;
        Ok(())
    }

    /// Print effects until one matches, returning it.
    async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&SessionEffect) -> bool,
    ) -> Result<SessionEffect> {
        let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
        loop {
            let effect = tokio::time::timeout_at(deadline, self.effects.recv())
                .await
                .context("Timed out waiting for the session")?
                .context("Session dispatcher stopped")?;
            print_effect(&effect);
            if predicate(&effect) {
                return Ok(effect);
            }
        }
    }
}

fn print_effect(effect: &SessionEffect) {
    match effect {
        SessionEffect::StateChanged { from, to } => println!("state        {} -> {}", from, to),
        SessionEffect::Status(status) => println!("status       {}", status),
        SessionEffect::Notice(text) => println!("notice       {}", text),
        SessionEffect::Description(text) => println!("scanner      {}", text),
        SessionEffect::DeviceCount(count) => println!("devices      {}", count),
        SessionEffect::FingerQualities(indicators) => {
            let colors: Vec<String> = indicators
                .iter()
                .map(|i| match i.marker {
                    Some(marker) => format!("{:?}({:?})", i.color, marker),
                    None => format!("{:?}", i.color),
                })
                .collect();
            println!("qualities    {}", colors.join(" "));
        }
        SessionEffect::FrameTime(frame_time) => println!("frame time   {}", frame_time),
        SessionEffect::CaptureModes { modes, selected } => {
            for (index, mode) in modes.iter().enumerate() {
                let marker = if Some(index) == *selected { '*' } else { ' ' };
                println!("mode        {}{} {}", marker, index, mode);
            }
        }
        SessionEffect::ImageAvailable { image, image_type } => {
            println!("image        {} {}x{}", image_type, image.width(), image.height())
        }
        SessionEffect::Preview(image) => {
            println!("preview      {}x{}", image.width(), image.height())
        }
        SessionEffect::Beep => println!("beep"),
        SessionEffect::QualityScore(score) => println!("nfiq         {}", score),
        SessionEffect::ExportFinished { file_name, result } => match result {
            Ok(path) => println!("export       {} -> {}", file_name, path.display()),
            Err(e) => println!("export       {} failed: {}", file_name, e),
        },
        SessionEffect::Rejected { from, to } => println!("rejected     {} -> {}", from, to),
    }
}
