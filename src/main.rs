use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use video_sync::config;
use video_sync::video_player::{FfmpegBackend, MasterSync, VideoDecoder};

const HELP: &str = "\
video_sync - decode a media file and pull frames against a wall clock

USAGE:
  video_sync [OPTIONS] FILE

OPTIONS:
  --seconds N        Play for N seconds (default: 10)
  --sync MODE        Master clock: video, audio or external (default: config)
  --loop             Restart at end of stream
  --no-audio         Do not decode audio
  -h, --help         Print this help
";

struct Args {
    file: String,
    seconds: f64,
    sync: Option<MasterSync>,
    looping: bool,
    no_audio: bool,
}

fn parse_sync(value: &str) -> Result<MasterSync, String> {
    match value {
        "video" => Ok(MasterSync::Video),
        "audio" => Ok(MasterSync::Audio),
        "external" => Ok(MasterSync::External),
        other => Err(format!("unknown sync mode '{other}'")),
    }
}

fn parse_args() -> Result<Option<Args>, pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        return Ok(None);
    }
    let parsed = Args {
        seconds: args.opt_value_from_str("--seconds")?.unwrap_or(10.0),
        sync: args.opt_value_from_fn("--sync", parse_sync)?,
        looping: args.contains("--loop"),
        no_audio: args.contains("--no-audio"),
        file: args.free_from_str()?,
    };
    Ok(Some(parsed))
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            print!("{HELP}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("Error: {err}\n\n{HELP}");
            return ExitCode::FAILURE;
        }
    };

    let mut pipeline_config = config::load().unwrap_or_else(|err| {
        log::warn!("Using default pipeline config: {err}");
        config::PipelineConfig::default()
    });
    if let Some(mode) = args.sync {
        pipeline_config.master_sync = Some(mode);
    }
    if args.looping {
        pipeline_config.loop_playback = Some(true);
    }

    let backend = match FfmpegBackend::new() {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut decoder = VideoDecoder::new(backend, pipeline_config);
    decoder.enable_audio(!args.no_audio);

    if let Err(err) = decoder.load(&args.file) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }
    if let Err(err) = decoder.start() {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }
    println!(
        "{}: {}x{} @ {:.2} fps, audio {} Hz x{}",
        args.file,
        decoder.width(),
        decoder.height(),
        decoder.fps(),
        decoder.audio_sample_rate(),
        decoder.audio_channel_count()
    );

    let frame_interval = Duration::from_secs_f64(1.0 / decoder.fps());
    let started = Instant::now();
    let (mut video_frames, mut audio_frames, mut empty_pulls) = (0u64, 0u64, 0u64);

    while started.elapsed().as_secs_f64() < args.seconds {
        let clock = started.elapsed().as_secs_f64();

        while decoder.get_audio_frame(clock).is_some() {
            decoder.got_audio_frame();
            audio_frames += 1;
        }

        let delivered = decoder.get_video_frame(clock).is_some();
        if delivered {
            decoder.got_video_frame();
            video_frames += 1;
        } else {
            empty_pulls += 1;
        }

        if decoder.is_finished() && !decoder.is_looping() {
            break;
        }
        thread::sleep(frame_interval);
    }

    println!(
        "{video_frames} video frames, {audio_frames} audio frames, {empty_pulls} empty pulls in {:.2}s (last pts {:.3}s)",
        started.elapsed().as_secs_f64(),
        decoder.last_frame_pts()
    );
    decoder.stop();
    ExitCode::SUCCESS
}
