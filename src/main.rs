use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use landmark_relay::{
    Config, Relay, RetryPolicy, TrackingMode,
    pipeline::{FrameSource, HeadlessPreview, Preview, ReplaySource, build_detector},
    sender::UdpSender,
};
use log::LevelFilter;

const USAGE: &str = "usage: landmark-relay [hand|pose|cameras] [--config PATH] [--headless] \
[--replay DIR [--loop]] [--frames N]

Logs at info by default; set RUST_LOG=debug to see every datagram.";

enum Command {
    Track(TrackingMode),
    ListCameras,
}

struct Args {
    command: Command,
    config: Option<PathBuf>,
    headless: bool,
    replay: Option<PathBuf>,
    looping: bool,
    frames: Option<u64>,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut parsed = Args {
        command: Command::Track(TrackingMode::Hand),
        config: None,
        headless: false,
        replay: None,
        looping: false,
        frames: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                parsed.config = Some(args.next().map(PathBuf::from).context(USAGE)?);
            }
            "--headless" => parsed.headless = true,
            "--replay" => {
                parsed.replay = Some(args.next().map(PathBuf::from).context(USAGE)?);
            }
            "--loop" => parsed.looping = true,
            "--frames" => {
                let value = args.next().context(USAGE)?;
                parsed.frames = Some(
                    value
                        .parse()
                        .with_context(|| format!("--frames expects a number, got {value}"))?,
                );
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            "cameras" => parsed.command = Command::ListCameras,
            other => {
                let mode = other
                    .parse::<TrackingMode>()
                    .map_err(|err| anyhow!("{err}\n{USAGE}"))?;
                parsed.command = Command::Track(mode);
            }
        }
    }

    if parsed.looping && parsed.replay.is_none() {
        return Err(anyhow!("--loop only applies to --replay\n{USAGE}"));
    }

    Ok(parsed)
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter(Some("landmark_relay"), LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    match &args.command {
        Command::ListCameras => list_cameras(),
        Command::Track(mode) => track(*mode, &args),
    }
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = landmark_relay::pipeline::available_cameras()?;
    if cameras.is_empty() {
        println!("no cameras found");
    }
    for camera in cameras {
        println!("{}: {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    Err(anyhow!("built without camera support"))
}

fn track(mode: TrackingMode, args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    let source = open_source(&config, args)?;
    let detector = build_detector(mode, &config)?;
    let sender = UdpSender::new(config.destination, config.wire_format)?;
    let preview = open_preview(mode, config.preview && !args.headless);

    let relay = Relay::new(
        mode,
        config.convention_for(mode),
        source,
        detector,
        sender,
        preview,
        RetryPolicy::from_config(&config.capture),
    )
    .with_max_frames(args.frames);

    let summary = relay.run()?;
    log::info!(
        "{} frames, {} detections, {} datagrams, {} read failures",
        summary.frames,
        summary.detections,
        summary.datagrams,
        summary.read_failures
    );
    Ok(())
}

fn open_source(config: &Config, args: &Args) -> Result<Box<dyn FrameSource>> {
    if let Some(dir) = &args.replay {
        let replay = ReplaySource::from_dir(dir, args.looping, config.camera.mirror)?;
        log::info!(
            "replaying {} images from {}{}",
            replay.len(),
            dir.display(),
            if args.looping { " on a loop" } else { "" }
        );
        return Ok(Box::new(replay));
    }
    open_camera(config)
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(config: &Config) -> Result<Box<dyn FrameSource>> {
    let camera =
        landmark_relay::pipeline::CameraSource::open(config.camera.index, config.camera.mirror)?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(_config: &Config) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!("built without camera support; use --replay DIR"))
}

#[cfg(feature = "preview")]
fn open_preview(mode: TrackingMode, enabled: bool) -> Box<dyn Preview> {
    if enabled {
        Box::new(landmark_relay::pipeline::WindowPreview::new(mode))
    } else {
        Box::new(HeadlessPreview)
    }
}

#[cfg(not(feature = "preview"))]
fn open_preview(_mode: TrackingMode, _enabled: bool) -> Box<dyn Preview> {
    Box::new(HeadlessPreview)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        parse_args(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn defaults_to_hand_tracking() {
        let args = parse(&[]).unwrap();
        assert!(matches!(args.command, Command::Track(TrackingMode::Hand)));
        assert!(!args.headless);
        assert!(!args.looping);
        assert!(args.frames.is_none());
    }

    #[test]
    fn looping_replay_is_parsed() {
        let args = parse(&["pose", "--replay", "frames", "--loop", "--frames", "30", "--headless"])
            .unwrap();
        assert!(matches!(args.command, Command::Track(TrackingMode::Pose)));
        assert_eq!(args.replay, Some(PathBuf::from("frames")));
        assert!(args.looping);
        assert!(args.headless);
        assert_eq!(args.frames, Some(30));
    }

    #[test]
    fn loop_without_replay_is_rejected() {
        assert!(parse(&["--loop"]).is_err());
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse(&["--frames", "many"]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["juggle"]).is_err());
    }

    #[test]
    fn usage_points_at_rust_log() {
        assert!(USAGE.contains("--loop"));
        assert!(USAGE.contains("RUST_LOG"));
    }
}
