use anyhow::Context;

use mkv_stream::{ControllerConfig, FileByteSource, StreamError, StreamingController, TrackKind};

mod cli;

use cli::*;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Mkvprobe::from_env_or_exit();

    if let Err(e) = run(args).await {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

async fn run(args: Mkvprobe) -> anyhow::Result<()> {
    match args.subcommand {
        MkvprobeCmd::Info(args) => info(args).await,
        MkvprobeCmd::Packets(args) => packets(args).await,
    }
}

async fn open_controller(
    path: &std::path::Path,
) -> anyhow::Result<StreamingController<FileByteSource>> {
    let source = FileByteSource::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut controller = StreamingController::new(source, ControllerConfig::default());
    controller
        .open()
        .await
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(controller)
}

async fn info(args: Info) -> anyhow::Result<()> {
    let controller = open_controller(&args.path).await?;
    let master = controller.master_data();

    if let Some(info) = &master.info {
        println!("Segment:");
        println!("\ttimecode_scale_ns: {}", info.timecode_scale_ns);
        if let Some(duration) = info.duration_ticks {
            println!("\tduration_ticks: {duration}");
        }
        if !info.muxing_app.is_empty() {
            println!("\tmuxing_app: {}", info.muxing_app);
        }
        if !info.writing_app.is_empty() {
            println!("\twriting_app: {}", info.writing_app);
        }
    }

    println!("Tracks:");
    for track in &master.tracks {
        let kind = match track.kind {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Subtitle => "subtitle",
        };
        println!(
            "\t#{} ({kind}) codec={} enabled={}",
            track.track_number, track.codec_id, track.enabled
        );
        if let Some(video) = &track.video {
            println!("\t\t{}x{}", video.pixel_width, video.pixel_height);
        }
        if let Some(audio) = &track.audio {
            println!(
                "\t\tsampling_frequency={} channels={}",
                audio.sampling_frequency, audio.channels
            );
        }
    }

    println!("Cues: {}", master.cues.len());

    Ok(())
}

async fn packets(args: Packets) -> anyhow::Result<()> {
    let mut controller = open_controller(&args.path).await?;
    controller.start().await?;

    println!("idx\ttrack\ttime\tsize\tkey");
    let limit = args.limit.unwrap_or(usize::MAX);
    for i in 0..limit {
        let frame = match controller.next_frame().await {
            Ok(frame) => frame,
            Err(StreamError::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        };

        println!(
            "{i}\t{}\t{}\t{}\t{}",
            frame.track_number,
            frame.timecode_ticks,
            frame.payload.len(),
            frame.keyframe,
        );
    }

    Ok(())
}
