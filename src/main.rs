use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sitecloner::cdp::CdpCapturer;
use sitecloner::{
    CaptureConfig, Error, GenerationClient, GenerationConfig, Pipeline, PipelineConfig, Viewport,
};
use thiserror::Error as ThisError;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sitecloner")]
#[command(about = "Capture a page in headless Chrome and generate a static replica of it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a page and print its extracted context as JSON
    Scrape {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Also write the screenshot PNG to this path
        #[arg(long)]
        screenshot_out: Option<PathBuf>,
    },
    /// Capture a page and generate a static replica of it
    Clone {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Generation model name
        #[arg(long)]
        model: Option<String>,

        /// Generation request timeout in seconds
        #[arg(long, default_value_t = 60)]
        generation_timeout: u64,

        /// Write the generated HTML here instead of printing JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Page to capture (http or https)
    url: String,

    /// Seconds the browser may take to reach DOM-ready
    #[arg(long, default_value_t = 15)]
    navigation_timeout: u64,

    /// Outer capture deadline in seconds; must exceed the navigation timeout
    #[arg(long, default_value_t = 18)]
    capture_deadline: u64,

    /// Viewport width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Path to the Chrome/Chromium binary
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Run Chrome without its sandbox (needed in some containers)
    #[arg(long)]
    no_sandbox: bool,

    /// Override the browser user agent
    #[arg(long)]
    user_agent: Option<String>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

impl CaptureArgs {
    fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            navigation_timeout: Duration::from_secs(self.navigation_timeout),
            viewport: Viewport {
                width: self.width,
                height: self.height,
            },
            user_agent: self.user_agent.clone(),
            chrome_path: self.chrome_path.clone(),
            sandbox: !self.no_sandbox,
            ..Default::default()
        }
    }

    fn pipeline_config(&self, generation_timeout: Duration) -> PipelineConfig {
        let capture_deadline = Duration::from_secs(self.capture_deadline);
        let generation_deadline = generation_timeout + Duration::from_secs(5);
        PipelineConfig {
            capture_deadline,
            generation_deadline,
            clone_deadline: capture_deadline + generation_deadline + Duration::from_secs(5),
        }
    }
}

/// Failures of the command line tool
///
/// Pipeline errors keep their own stage and status. Writing results out is
/// not a pipeline stage, so those failures carry neither.
#[derive(ThisError, Debug)]
enum CliError {
    #[error(transparent)]
    Pipeline(#[from] Error),

    #[error("Failed to write output: {0}")]
    Output(String),
}

impl CliError {
    fn kind(&self) -> &'static str {
        match self {
            CliError::Pipeline(e) => e.kind(),
            CliError::Output(_) => "output_error",
        }
    }

    fn stage(&self) -> Option<&'static str> {
        match self {
            CliError::Pipeline(e) => Some(e.stage().as_str()),
            CliError::Output(_) => None,
        }
    }

    fn status_code(&self) -> Option<u16> {
        match self {
            CliError::Pipeline(e) => Some(e.status_code()),
            CliError::Output(_) => None,
        }
    }

    fn exit_code(&self) -> i32 {
        match self {
            CliError::Pipeline(e) => e.exit_code(),
            CliError::Output(_) => 30,
        }
    }

    fn report(&self) -> ErrorReport {
        ErrorReport {
            status: "error",
            error: self.kind(),
            stage: self.stage(),
            status_code: self.status_code(),
            detail: self.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReport {
    status: &'static str,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    detail: String,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let out = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    let out = out.map_err(|e| CliError::Output(format!("cannot serialize result: {}", e)))?;
    println!("{}", out);
    Ok(())
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, data).map_err(|e| CliError::Output(format!("{}: {}", path.display(), e)))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Scrape {
            capture,
            screenshot_out,
        } => {
            let capturer = CdpCapturer::new(capture.capture_config());
            let pipeline =
                Pipeline::scrape_only(capturer, capture.pipeline_config(Duration::from_secs(60)))?;

            let report = pipeline.scrape(&capture.url).await?;

            if let (Some(path), Some(encoded)) = (&screenshot_out, &report.screenshot) {
                use base64::Engine as _;
                let png = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| CliError::Output(format!("screenshot is not base64: {}", e)))?;
                write_file(path, &png)?;
                log::info!("Screenshot saved as {}", path.display());
            }

            print_json(&report, capture.pretty)
        }
        Command::Clone {
            capture,
            model,
            generation_timeout,
            output,
        } => {
            let mut generation = GenerationConfig::from_env();
            if let Some(model) = model {
                generation.model = model;
            }
            generation.timeout = Duration::from_secs(generation_timeout);

            // Fail on a missing credential before launching a browser
            if !generation.has_credential() {
                return Err(Error::ConfigError(format!(
                    "{} environment variable is not set",
                    sitecloner::API_KEY_ENV
                ))
                .into());
            }

            let capturer = CdpCapturer::new(capture.capture_config());
            let generator = GenerationClient::new(generation)?;
            let pipeline = Pipeline::new(
                capturer,
                generator,
                capture.pipeline_config(Duration::from_secs(generation_timeout)),
            )?;

            let report = pipeline.clone_page(&capture.url).await?;

            match output {
                Some(path) => {
                    write_file(&path, report.cloned_html.as_bytes())?;
                    log::info!("Cloned HTML written to {}", path.display());
                    Ok(())
                }
                None => print_json(&report, capture.pretty),
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match serde_json::to_string(&e.report()) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("{}", e),
        }
        std::process::exit(e.exit_code());
    }
}
