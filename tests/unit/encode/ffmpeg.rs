use super::*;
use crate::compile::fingerprint::Fingerprint;
use crate::compile::plan::{Caption, ComposeStep, RegionFinish, TrackMix};
use crate::foundation::core::{Color, PixelFormat, Sar};
use crate::layout::cascade::Sweep;
use crate::layout::fit::fit;
use crate::scene::model::{PanDirection, RegionId};

fn strings(args: &[OsString]) -> Vec<String> {
    args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
}

fn value_after(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn job(transform: FitTransform, include_audio: bool) -> TranscodeJob {
    TranscodeJob {
        fingerprint: Fingerprint { hi: 1, lo: 2 },
        source: PathBuf::from("/media/in.mp4"),
        start: 1.5,
        end: 5.5,
        transform,
        pixel_format: PixelFormat::default(),
        include_audio,
    }
}

fn step(base: BaseInput, layers: Vec<Layer>, audio: Option<u16>) -> ComposeStep {
    ComposeStep {
        region: RegionId(0),
        batch: 0,
        width: 1280,
        height: 720,
        duration: 10.0,
        sar: Sar::SQUARE,
        pixel_format: PixelFormat::default(),
        audio_channels: audio,
        base,
        layers,
        finish: Some(RegionFinish::default()),
    }
}

fn fixed(input: LayerInput, start: f64, duration: f64) -> Layer {
    Layer {
        input,
        start,
        duration,
        position: LayerPosition::Fixed { x: 0, y: 0 },
        fade_in: None,
        fade_out: None,
        audio: false,
    }
}

fn black() -> BaseInput {
    BaseInput::Background {
        color: Color::black(),
        image: None,
    }
}

#[test]
fn pad_scales_then_pads_centered() {
    let green = Color::new("green").unwrap();
    let t = fit(640, 480, 1280, 720, DisplayStyle::Pad, Some(&green), None).unwrap();
    assert_eq!(
        transcode_filter(&t, 4.0).unwrap(),
        "scale=width=960:height=720,pad=width=1280:height=720:x=160:y=0:color=green"
    );
}

#[test]
fn crop_without_resampling_only_crops() {
    let t = fit(1280, 720, 1280, 720, DisplayStyle::Crop, None, None).unwrap();
    assert_eq!(transcode_filter(&t, 4.0).unwrap(), "crop=w=1280:h=720:x=0:y=0");
}

#[test]
fn pan_scrolls_the_crop_window() {
    let fwd = fit(1280, 720, 640, 720, DisplayStyle::Pan, None, Some(PanDirection::Right)).unwrap();
    assert_eq!(
        transcode_filter(&fwd, 4.0).unwrap(),
        "crop=w=640:h=720:x='min(t*160,640)':y=0"
    );
    let rev = fit(1280, 720, 640, 720, DisplayStyle::Pan, None, Some(PanDirection::Left)).unwrap();
    assert_eq!(
        transcode_filter(&rev, 4.0).unwrap(),
        "crop=w=640:h=720:x='max(640-t*160,0)':y=0"
    );
}

#[test]
fn cascade_sources_pass_through() {
    let t = fit(1920, 1080, 640, 360, DisplayStyle::OverlayCascade, None, None).unwrap();
    assert_eq!(transcode_filter(&t, 4.0), None);
}

#[test]
fn transcode_args_cut_and_encode() {
    let t = fit(1280, 720, 1280, 720, DisplayStyle::Crop, None, None).unwrap();
    let args = strings(&transcode_args(&FfmpegOpts::default(), &job(t, false), Path::new("/c/out.mp4")));
    assert_eq!(value_after(&args, "-ss").as_deref(), Some("1.5"));
    assert_eq!(value_after(&args, "-i").as_deref(), Some("/media/in.mp4"));
    assert_eq!(value_after(&args, "-t").as_deref(), Some("4"));
    assert_eq!(value_after(&args, "-r").as_deref(), Some("30000/1001"));
    assert_eq!(value_after(&args, "-crf").as_deref(), Some("16"));
    assert_eq!(value_after(&args, "-c:v").as_deref(), Some("libx264"));
    assert_eq!(value_after(&args, "-pix_fmt").as_deref(), Some("yuv420p"));
    assert!(args.contains(&"-an".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("/c/out.mp4"));
    let ss = args.iter().position(|a| a == "-ss").unwrap();
    let i = args.iter().position(|a| a == "-i").unwrap();
    assert!(ss < i);
}

#[test]
fn transcode_keeps_audio_when_asked() {
    let t = fit(1280, 720, 1280, 720, DisplayStyle::Crop, None, None).unwrap();
    let args = strings(&transcode_args(&FfmpegOpts::default(), &job(t, true), Path::new("o.mp4")));
    assert_eq!(value_after(&args, "-c:a").as_deref(), Some("aac"));
    assert!(!args.contains(&"-an".to_string()));
}

#[test]
fn silent_background_compose() {
    let s = step(black(), vec![], None);
    let job = ComposeJob {
        step: &s,
        previous: None,
        inputs: vec![],
    };
    let cmd = compose_command(&FfmpegOpts::default(), &job).unwrap();
    assert_eq!(cmd.inputs.len(), 1);
    assert_eq!(
        strings(&cmd.inputs[0]),
        vec!["-f", "lavfi", "-i", "color=c=black:s=1280x720:r=30000/1001:d=10"]
    );
    assert!(!cmd.has_audio);
    assert!(cmd.filter.ends_with("[base]setsar=1/1[vout]"));

    let args = strings(&compose_args(&FfmpegOpts::default(), &job, Path::new("r.mp4")).unwrap());
    assert!(args.contains(&"-an".to_string()));
    assert_eq!(value_after(&args, "-t").as_deref(), Some("10"));
}

#[test]
fn layers_overlay_in_order_with_time_offsets() {
    let layers = vec![
        fixed(LayerInput::Excerpt(Fingerprint { hi: 0, lo: 1 }), 0.0, 4.0),
        fixed(LayerInput::Excerpt(Fingerprint { hi: 0, lo: 2 }), 4.0, 3.0),
        fixed(
            LayerInput::Solid {
                color: Color::white(),
                width: 20,
                height: 10,
            },
            0.0,
            10.0,
        ),
    ];
    let s = step(black(), layers, None);
    let job = ComposeJob {
        step: &s,
        previous: None,
        inputs: vec![Some(PathBuf::from("a.mp4")), Some(PathBuf::from("b.mp4")), None],
    };
    let cmd = compose_command(&FfmpegOpts::default(), &job).unwrap();
    assert_eq!(cmd.inputs.len(), 4);
    assert!(cmd.filter.contains("[2:v]setpts=PTS-STARTPTS+4/TB[l1]"));
    assert!(cmd.filter.contains("[v0][l1]overlay=x=0:y=0:eof_action=pass:enable='between(t,4,7)'[v1]"));
    assert!(cmd.filter.contains("[v1][l2]overlay="));
    assert!(cmd.filter.ends_with("[v2]setsar=1/1[vout]"));
    assert_eq!(
        strings(&cmd.inputs[3])[3],
        "color=c=white:s=20x10:r=30000/1001:d=10"
    );
}

#[test]
fn missing_layer_file_is_a_render_error() {
    let s = step(
        black(),
        vec![fixed(LayerInput::Region(RegionId(3)), 0.0, 2.0)],
        None,
    );
    let job = ComposeJob {
        step: &s,
        previous: None,
        inputs: vec![None],
    };
    let err = compose_command(&FfmpegOpts::default(), &job).unwrap_err();
    assert!(matches!(err, VeditError::Render(_)));
}

#[test]
fn sweep_layers_are_scaled_and_moved() {
    let layer = Layer {
        position: LayerPosition::Sweep {
            sweep: Sweep {
                axis: Axis::Vertical,
                from: -200.0,
                to: 720.0,
            },
            cross_offset: 300,
            tile_width: 356,
            tile_height: 200,
        },
        ..fixed(LayerInput::Excerpt(Fingerprint { hi: 0, lo: 9 }), 2.0, 4.0)
    };
    let s = step(black(), vec![layer], None);
    let job = ComposeJob {
        step: &s,
        previous: None,
        inputs: vec![Some(PathBuf::from("tile.mp4"))],
    };
    let cmd = compose_command(&FfmpegOpts::default(), &job).unwrap();
    assert!(cmd.filter.contains("[1:v]scale=width=356:height=200,setpts=PTS-STARTPTS+2/TB[l0]"));
    assert!(cmd.filter.contains("overlay=x=300:y='-200+(t-2)*230'"));
}

#[test]
fn watermark_fades_use_alpha() {
    let layer = Layer {
        fade_in: Some(FadeWindow {
            start: 1.0,
            duration: 2.0,
        }),
        fade_out: Some(FadeWindow {
            start: 8.0,
            duration: 2.0,
        }),
        ..fixed(LayerInput::Image(PathBuf::from("logo.png")), 0.0, 10.0)
    };
    let s = step(black(), vec![layer], None);
    let job = ComposeJob {
        step: &s,
        previous: None,
        inputs: vec![None],
    };
    let cmd = compose_command(&FfmpegOpts::default(), &job).unwrap();
    assert_eq!(strings(&cmd.inputs[1])[..2], ["-loop", "1"]);
    assert!(cmd.filter.contains(
        "format=yuva420p,fade=t=in:st=1:d=2:alpha=1,fade=t=out:st=8:d=2:alpha=1[l0]"
    ));
}

#[test]
fn audio_is_mixed_with_silence_and_track() {
    let mut layer = fixed(LayerInput::Excerpt(Fingerprint { hi: 0, lo: 3 }), 2.5, 4.0);
    layer.audio = true;
    let mut s = step(black(), vec![layer], Some(2));
    s.finish = Some(RegionFinish {
        audio_track: Some(TrackMix {
            path: PathBuf::from("song.mp3"),
            fade_out: Some(FadeWindow {
                start: 5.0,
                duration: 5.0,
            }),
        }),
        caption: None,
        normalize_audio: true,
    });
    let job = ComposeJob {
        step: &s,
        previous: None,
        inputs: vec![Some(PathBuf::from("clip.mp4"))],
    };
    let cmd = compose_command(&FfmpegOpts::default(), &job).unwrap();
    assert!(cmd.has_audio);
    assert_eq!(
        strings(&cmd.inputs[1])[3],
        "anullsrc=channel_layout=stereo:sample_rate=48000:d=10"
    );
    assert!(cmd.filter.contains("[2:a]asetpts=PTS-STARTPTS,adelay=delays=2500:all=1[la0]"));
    assert!(cmd.filter.contains("[3:a]asetpts=PTS-STARTPTS,afade=t=out:st=5:d=5[trk]"));
    assert!(cmd.filter.ends_with(
        "[1:a][la0][trk]amix=inputs=3:duration=longest:dropout_transition=0,aformat=channel_layouts=stereo,dynaudnorm[aout]"
    ));

    let args = strings(&compose_args(&FfmpegOpts::default(), &job, Path::new("o.mp4")).unwrap());
    assert_eq!(value_after(&args, "-ac").as_deref(), Some("2"));
    assert!(args.contains(&"[aout]".to_string()));
}

#[test]
fn later_batches_continue_from_previous_output() {
    let mut s = step(BaseInput::Previous, vec![], Some(1));
    s.batch = 1;
    let prev = PathBuf::from("/scratch/r0-b0.mp4");
    let job = ComposeJob {
        step: &s,
        previous: Some(prev.as_path()),
        inputs: vec![],
    };
    let cmd = compose_command(&FfmpegOpts::default(), &job).unwrap();
    assert_eq!(strings(&cmd.inputs[0]), vec!["-i", "/scratch/r0-b0.mp4"]);
    assert!(cmd.filter.contains("[0:v]setpts=PTS-STARTPTS[base]"));
    assert!(cmd.filter.ends_with("[0:a]aformat=channel_layouts=mono[aout]"));

    let orphan = ComposeJob {
        step: &s,
        previous: None,
        inputs: vec![],
    };
    assert!(compose_command(&FfmpegOpts::default(), &orphan).is_err());
}

#[test]
fn caption_is_escaped_and_delayed() {
    let mut s = step(black(), vec![], None);
    s.sar = Sar::new(4, 3).unwrap();
    s.finish = Some(RegionFinish {
        audio_track: None,
        caption: Some(Caption {
            text: "Song: It's, fine".to_string(),
            start: 5.0,
        }),
        normalize_audio: false,
    });
    let job = ComposeJob {
        step: &s,
        previous: None,
        inputs: vec![],
    };
    let cmd = compose_command(&FfmpegOpts::default(), &job).unwrap();
    assert!(cmd.filter.contains(r"text=Song\\: It\\\'s\, fine:x=10:y=h-th-10:enable='gt(t,5)'"));
    assert!(cmd.filter.ends_with(",setsar=4/3[vout]"));
}

#[test]
fn probe_json_takes_first_streams() {
    let json = br#"{
        "streams": [
            {"codec_type": "video", "width": 300, "height": 300, "disposition": {"attached_pic": 1}},
            {"codec_type": "audio", "channels": 6},
            {"codec_type": "video", "width": 1920, "height": 1080,
             "sample_aspect_ratio": "4:3", "r_frame_rate": "30000/1001"},
            {"codec_type": "audio", "channels": 2}
        ],
        "format": {"duration": "12.480000"}
    }"#;
    let r = parse_probe_json(json).unwrap();
    assert_eq!((r.width, r.height), (1920, 1080));
    assert_eq!((r.sar_num, r.sar_den), (4, 3));
    assert_eq!(r.frame_rate, Some(FrameRate::NTSC_30));
    assert_eq!(r.audio_channels, Some(6));
    assert_eq!(r.duration, 12.48);
}

#[test]
fn probe_json_audio_only_and_fallback_duration() {
    let json = br#"{"streams": [{"codec_type": "audio", "channels": 1, "duration": "3.5"}]}"#;
    let r = parse_probe_json(json).unwrap();
    assert_eq!((r.width, r.height), (0, 0));
    assert_eq!((r.sar_num, r.sar_den), (1, 1));
    assert_eq!(r.audio_channels, Some(1));
    assert_eq!(r.duration, 3.5);
}

#[test]
fn probe_json_garbage_is_a_probe_error() {
    assert!(matches!(parse_probe_json(b"not json"), Err(VeditError::Probe(_))));
}

#[test]
fn seconds_are_compact() {
    assert_eq!(secs(5.0), "5");
    assert_eq!(secs(2.5), "2.5");
    assert_eq!(secs(0.0), "0");
    assert_eq!(secs(-0.0), "0");
    assert_eq!(secs(1.0 / 3.0), "0.333333");
}
