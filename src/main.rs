use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use vitals_capture::{
    init_logging, CaptureSettings, ChannelSink, DeviceId, HttpBackend, SessionOutcome,
    SessionRegistry, SettingsStore, SubjectId,
};

#[derive(Parser)]
#[command(name = "vitals-capture")]
#[command(about = "Run one device measurement session against the clinic backend")]
struct Cli {
    /// Patient to measure
    #[arg(long)]
    patient: String,
    /// Kiosk device id
    #[arg(long, default_value = "1")]
    device: String,
    /// Backend base URL
    #[arg(long, env = "VITALS_API_URL", default_value = "http://localhost:8000")]
    api_url: String,
    /// JSON capture settings file
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Override the poll interval (milliseconds)
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    /// Override the session timeout (seconds)
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Print the final notice as JSON
    #[arg(long)]
    json: bool,
}

fn resolve_settings(cli: &Cli) -> Result<CaptureSettings> {
    let mut settings = match &cli.settings {
        Some(path) => SettingsStore::new(path.clone())?.capture(),
        None => CaptureSettings::default().with_env_overrides()?,
    };
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        settings.poll_interval_ms = poll_interval_ms;
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        settings.session_timeout_ms = timeout_secs.saturating_mul(1_000);
    }
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    let backend = Arc::new(HttpBackend::new(&cli.api_url));
    let (sink, mut notices) = ChannelSink::new();
    let registry = SessionRegistry::new(backend.clone(), backend, Arc::new(sink), settings)?;

    let handle = registry
        .open(SubjectId::new(cli.patient.clone()), DeviceId::new(cli.device.clone()))
        .await
        .with_context(|| format!("could not start measurement for patient {}", cli.patient))?;

    println!(
        "Measurement started (session {}). Waiting up to {}s for device {}...",
        handle.id(),
        registry.settings().session_timeout().as_secs(),
        handle.device_id()
    );

    let notice = tokio::select! {
        notice = notices.recv() => notice,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, cancelling session {}", handle.id());
            if let Err(err) = registry.cancel(handle.id()) {
                warn!("cancel after interrupt: {err}");
            }
            notices.recv().await
        }
    };
    let notice = notice.context("session ended without a notice")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&notice)?);
    }

    match notice.outcome {
        SessionOutcome::Completed(reading) => {
            println!("Device measurement completed at {}", reading.captured_at);
            let values = &reading.values;
            if let Some(bp) = &values.blood_pressure {
                println!("  blood pressure: {bp}");
            }
            if let Some(temperature) = values.temperature {
                println!("  temperature:    {temperature:.1} C");
            }
            if let Some(spo2) = values.spo2 {
                println!("  SpO2:           {spo2:.0}%");
            }
            if let Some(heart_rate) = values.heart_rate {
                println!("  heart rate:     {heart_rate:.0} bpm");
            }
            Ok(())
        }
        SessionOutcome::TimedOut => {
            bail!("device measurement timed out, please check the device connection")
        }
        SessionOutcome::Cancelled => bail!("device measurement cancelled"),
        SessionOutcome::Failed(reason) => bail!("device measurement failed: {reason}"),
    }
}
