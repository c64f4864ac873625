use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{queue, style::Print, style::PrintStyledContent, style::Stylize};
use humanoid_physics::{RapierSim, SimOptions};

use humanoid_deploy::command::{CommandShaper, Mode, SharedCommand};
use humanoid_deploy::config::{
    config_root, project_root, resolve_config_path, DeployConfig, InputChoice,
};
use humanoid_deploy::display::{write_banner, StatusDisplay};
use humanoid_deploy::input::{
    gamepad, keyboard, GamepadInput, GamepadSettings, GamepadSetup, InputSource, KeyboardInput,
    KeyboardSettings,
};
use humanoid_deploy::policy::OnnxBackend;
use humanoid_deploy::Deployment;

/// Runs a recurrent locomotion policy on a simulated humanoid.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file under configs/, e.g. `e3.yaml`, or a path to one
    config: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config_path = resolve_config_path(&project_root(), &args.config);
    if !config_path.is_file() && Path::new(&args.config).is_file() {
        config_path = PathBuf::from(&args.config);
    }
    let mut config = DeployConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let root = config_root(&config_path);
    config.resolve_paths(&root);
    log::info!("Loaded config {}", config_path.display());

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl+C handler")?;

    let sim = RapierSim::from_file(
        &config.xml_path,
        &SimOptions {
            dt: config.simulation_dt,
            base_height: config.base_height,
            joint_names: config.joint_names.clone(),
        },
    )
    .with_context(|| format!("Failed to build robot from {}", config.xml_path.display()))?;
    log::info!(
        "Robot joints: {}",
        sim.joint_names().collect::<Vec<_>>().join(", ")
    );

    let backend = OnnxBackend::load(
        &config.policy_path,
        config.observation_len(),
        config.encoder_hidden_size,
        config.actor_hidden_size,
    )
    .with_context(|| format!("Failed to load policy from {}", config.policy_path.display()))?;

    let command = SharedCommand::new(config.cmd_init, Mode::Walk);
    let input = open_input(&config, &root, &command, &interrupt)?;
    print_controls(&input).context("Failed to write to the terminal")?;

    let viewer = open_viewer()?;
    let mut deployment = Deployment::new(
        &config,
        sim,
        backend,
        viewer,
        input,
        command,
        StatusDisplay::stdout(),
    )
    .context("Failed to start deployment")?;

    deployment.run(&interrupt).context("Control loop failed")?;
    Ok(())
}

/// Keyboard wins over gamepad; a missing pad degrades to no input.
fn open_input(
    config: &DeployConfig,
    root: &Path,
    command: &SharedCommand,
    interrupt: &Arc<AtomicBool>,
) -> Result<InputSource> {
    match config.input_choice() {
        InputChoice::Keyboard => {
            let keys = KeyboardInput::spawn(
                command.clone(),
                KeyboardSettings::from_config(config),
                interrupt.clone(),
            )
            .context("Failed to start keyboard input")?;
            Ok(InputSource::Keyboard(keys))
        }
        InputChoice::Gamepad => {
            let setup = GamepadSetup::resolve(config, root);
            let settings = GamepadSettings::from_config(config)?;
            let shaper = CommandShaper::new(config.mode_limits, config.run_filter_alpha);
            match GamepadInput::connect(setup, settings, shaper) {
                Ok(Some(pad)) => Ok(InputSource::Gamepad(Box::new(pad))),
                Ok(None) => Ok(InputSource::Disabled),
                Err(e) => {
                    log::warn!("{}, running without operator input", e);
                    Ok(InputSource::Disabled)
                }
            }
        }
        InputChoice::None => {
            log::info!("Operator input disabled, holding cmd_init");
            Ok(InputSource::Disabled)
        }
    }
}

fn print_controls(input: &InputSource) -> io::Result<()> {
    let controls = match input {
        InputSource::Keyboard(_) => keyboard::CONTROLS,
        InputSource::Gamepad(_) => gamepad::CONTROLS,
        InputSource::Disabled => return Ok(()),
    };
    let mut out = io::stdout();
    write_banner(&mut out, &format!("{} controls", input.name()))?;
    for (key, action) in controls {
        queue!(
            out,
            PrintStyledContent(format!("  {:<14}", key).cyan()),
            Print(action),
            Print("\r\n")
        )?;
    }
    out.flush()
}

#[cfg(feature = "rerun")]
fn open_viewer() -> Result<humanoid_deploy::viewer::RerunViewer> {
    humanoid_deploy::viewer::RerunViewer::spawn().context("Failed to spawn the Rerun viewer")
}

#[cfg(not(feature = "rerun"))]
fn open_viewer() -> Result<humanoid_deploy::viewer::HeadlessViewer> {
    log::info!("Built without the `rerun` feature, running headless");
    Ok(humanoid_deploy::viewer::HeadlessViewer::new())
}
