use std::ffi::{OsStr, OsString};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::compile::plan::{
    BaseInput, ComposeJob, FadeWindow, Layer, LayerInput, LayerPosition, TranscodeJob,
};
use crate::foundation::core::FrameRate;
use crate::foundation::error::{VeditError, VeditResult};
use crate::layout::fit::{Axis, FitTransform};
use crate::media::backend::MediaBackend;
use crate::media::probe::ProbeReport;
use crate::scene::model::DisplayStyle;

/// Sample rate of generated silence.
pub const SILENCE_SAMPLE_RATE: u32 = 48_000;

/// How the ffmpeg tools are invoked.
#[derive(Clone, Debug, PartialEq)]
pub struct FfmpegOpts {
    /// `ffmpeg` binary name or path.
    pub ffmpeg: PathBuf,
    /// `ffprobe` binary name or path.
    pub ffprobe: PathBuf,
    /// x264 constant rate factor.
    pub crf: u8,
    /// Output frame rate of every transcode and composition.
    pub frame_rate: FrameRate,
    pub video_codec: String,
    pub audio_codec: String,
    /// Passed to `-loglevel`.
    pub log_level: String,
}

impl Default for FfmpegOpts {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            crf: 16,
            frame_rate: FrameRate::NTSC_30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            log_level: "error".to_string(),
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    is_tool_available(Path::new("ffmpeg"))
}

fn is_tool_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// [`MediaBackend`] that shells out to the system `ffprobe`/`ffmpeg` binaries.
#[derive(Clone, Debug, Default)]
pub struct FfmpegBackend {
    opts: FfmpegOpts,
}

impl FfmpegBackend {
    pub fn new(opts: FfmpegOpts) -> Self {
        Self { opts }
    }

    pub fn opts(&self) -> &FfmpegOpts {
        &self.opts
    }

    /// `true` when both binaries answer `-version`.
    pub fn is_available(&self) -> bool {
        is_tool_available(&self.opts.ffmpeg) && is_tool_available(&self.opts.ffprobe)
    }
}

impl MediaBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> VeditResult<ProbeReport> {
        let stdout = run(&self.opts.ffprobe, &probe_args(path)).map_err(|e| {
            VeditError::probe(format!("cannot probe '{}': {e}", path.display()))
        })?;
        parse_probe_json(&stdout)
            .map_err(|e| VeditError::probe(format!("'{}': {e}", path.display())))
    }

    fn transcode(&self, job: &TranscodeJob, out: &Path) -> VeditResult<()> {
        run(&self.opts.ffmpeg, &transcode_args(&self.opts, job, out)).map_err(|e| {
            VeditError::render(format!(
                "transcode of '{}' [{}..{}] failed: {e}",
                job.source.display(),
                job.start,
                job.end
            ))
        })?;
        Ok(())
    }

    fn compose(&self, job: &ComposeJob<'_>, out: &Path) -> VeditResult<()> {
        let args = compose_args(&self.opts, job, out)?;
        run(&self.opts.ffmpeg, &args).map_err(|e| {
            VeditError::render(format!(
                "compose of region {} batch {} failed: {e}",
                job.step.region.0, job.step.batch
            ))
        })?;
        Ok(())
    }
}

fn run(program: &Path, args: &[OsString]) -> Result<Vec<u8>, String> {
    tracing::debug!(
        program = %program.display(),
        args = %args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" "),
        "running"
    );
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("failed to spawn '{}': {e}", program.display()))?;
    if !output.status.success() {
        return Err(format!(
            "'{}' exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(output.stdout)
}

#[derive(Default)]
struct Argv(Vec<OsString>);

impl Argv {
    fn push(&mut self, a: impl AsRef<OsStr>) -> &mut Self {
        self.0.push(a.as_ref().to_os_string());
        self
    }

    fn opt(&mut self, flag: &str, value: impl AsRef<OsStr>) -> &mut Self {
        self.push(flag).push(value)
    }

    fn extend<I, S>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for a in items {
            self.push(a);
        }
        self
    }
}

pub fn probe_args(path: &Path) -> Vec<OsString> {
    let mut a = Argv::default();
    a.extend([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ])
    .push(path);
    a.0
}

#[derive(serde::Deserialize)]
struct ProbeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_aspect_ratio: Option<String>,
    r_frame_rate: Option<String>,
    channels: Option<u16>,
    duration: Option<String>,
    disposition: Option<ProbeDisposition>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Interpret `ffprobe -print_format json -show_format -show_streams` output.
///
/// Only the first video stream (ignoring cover art) and the first audio stream are used.
pub fn parse_probe_json(bytes: &[u8]) -> VeditResult<ProbeReport> {
    let parsed: ProbeOut = serde_json::from_slice(bytes)
        .map_err(|e| VeditError::probe(format!("ffprobe json parse failed: {e}")))?;

    let mut report = ProbeReport {
        sar_num: 1,
        sar_den: 1,
        ..ProbeReport::default()
    };

    let video = parsed.streams.iter().find(|s| {
        s.codec_type.as_deref() == Some("video")
            && s.disposition.as_ref().is_none_or(|d| d.attached_pic == 0)
    });
    if let Some(v) = video {
        report.width = v.width.unwrap_or(0);
        report.height = v.height.unwrap_or(0);
        if let Some((num, den)) = v
            .sample_aspect_ratio
            .as_deref()
            .and_then(|s| parse_ratio(s, ':'))
        {
            report.sar_num = num;
            report.sar_den = den;
        }
        report.frame_rate = v
            .r_frame_rate
            .as_deref()
            .and_then(|s| parse_ratio(s, '/'))
            .and_then(|(n, d)| FrameRate::new(n, d).ok());
    }

    report.audio_channels = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|a| a.channels);

    let container = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok());
    report.duration = match container {
        Some(d) => d,
        None => parsed
            .streams
            .iter()
            .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
            .fold(0.0, f64::max),
    };
    Ok(report)
}

fn parse_ratio(s: &str, sep: char) -> Option<(u32, u32)> {
    let (a, b) = s.split_once(sep)?;
    let a = a.trim().parse::<u32>().ok()?;
    let b = b.trim().parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}

/// Seconds with at most microsecond precision and no trailing zeros.
pub(crate) fn secs(v: f64) -> String {
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn channel_layout(channels: u16) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        n => format!("{n}c"),
    }
}

/// Video filter chain that maps a source frame into its region, or `None` for passthrough.
pub fn transcode_filter(transform: &FitTransform, duration: f64) -> Option<String> {
    let mut chain = Vec::new();
    if transform.style != DisplayStyle::OverlayCascade && transform.needs_scale() {
        chain.push(format!(
            "scale=width={}:height={}",
            transform.scaled_width, transform.scaled_height
        ));
    }
    let (w, h) = (transform.target_width, transform.target_height);
    match transform.style {
        DisplayStyle::OverlayCascade => {}
        DisplayStyle::Pad => {
            let color = transform
                .pad_color
                .as_ref()
                .map(|c| c.as_str())
                .unwrap_or("black");
            chain.push(format!(
                "pad=width={w}:height={h}:x={}:y={}:color={color}",
                transform.offset_x.max(0),
                transform.offset_y.max(0)
            ));
        }
        DisplayStyle::Crop => {
            chain.push(format!(
                "crop=w={w}:h={h}:x={}:y={}",
                (-transform.offset_x).max(0),
                (-transform.offset_y).max(0)
            ));
        }
        DisplayStyle::Pan => {
            let mut x = (-transform.offset_x).max(0).to_string();
            let mut y = (-transform.offset_y).max(0).to_string();
            if let Some(pan) = transform.pan {
                let speed = pan.speed(duration);
                let expr = if pan.reverse {
                    format!("'max({}-t*{},0)'", pan.travel, speed)
                } else {
                    format!("'min(t*{},{})'", speed, pan.travel)
                };
                match pan.axis {
                    Axis::Horizontal => x = expr,
                    Axis::Vertical => y = expr,
                }
            }
            chain.push(format!("crop=w={w}:h={h}:x={x}:y={y}"));
        }
    }
    if chain.is_empty() {
        None
    } else {
        Some(chain.join(","))
    }
}

pub fn transcode_args(opts: &FfmpegOpts, job: &TranscodeJob, out: &Path) -> Vec<OsString> {
    let mut a = Argv::default();
    a.push("-hide_banner")
        .opt("-loglevel", opts.log_level.as_str())
        .push("-y")
        .opt("-ss", secs(job.start))
        .push("-i")
        .push(&job.source)
        .opt("-t", secs(job.duration()));
    if let Some(filter) = transcode_filter(&job.transform, job.duration()) {
        a.opt("-vf", filter.as_str());
    }
    a.opt("-r", opts.frame_rate.to_string())
        .opt("-c:v", opts.video_codec.as_str())
        .opt("-crf", opts.crf.to_string())
        .opt("-pix_fmt", job.pixel_format.as_str());
    if job.include_audio {
        a.opt("-c:a", opts.audio_codec.as_str());
    } else {
        a.push("-an");
    }
    a.opt("-f", "mp4").push(out);
    a.0
}

/// Inputs and filtergraph of one compose invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct ComposeCommand {
    /// Argument group per input, in input-index order.
    pub inputs: Vec<Vec<OsString>>,
    /// `-filter_complex` value.
    pub filter: String,
    /// `true` when the graph produces `[aout]`.
    pub has_audio: bool,
}

struct GraphBuilder<'o> {
    opts: &'o FfmpegOpts,
    inputs: Vec<Vec<OsString>>,
    chains: Vec<String>,
}

impl GraphBuilder<'_> {
    fn file(&mut self, path: &Path) -> usize {
        let mut a = Argv::default();
        a.push("-i").push(path);
        self.inputs.push(a.0);
        self.inputs.len() - 1
    }

    fn still(&mut self, path: &Path, duration: f64) -> usize {
        let mut a = Argv::default();
        a.opt("-loop", "1")
            .opt("-framerate", self.opts.frame_rate.to_string())
            .opt("-t", secs(duration))
            .push("-i")
            .push(path);
        self.inputs.push(a.0);
        self.inputs.len() - 1
    }

    fn lavfi(&mut self, source: String) -> usize {
        let mut a = Argv::default();
        a.opt("-f", "lavfi").opt("-i", source);
        self.inputs.push(a.0);
        self.inputs.len() - 1
    }

    fn color(&mut self, color: &str, width: u32, height: u32, duration: f64) -> usize {
        let src = format!(
            "color=c={color}:s={width}x{height}:r={}:d={}",
            self.opts.frame_rate,
            secs(duration)
        );
        self.lavfi(src)
    }

    fn chain(&mut self, c: String) {
        self.chains.push(c);
    }
}

/// Build the inputs and filtergraph for `job`.
///
/// Video: the base (generated background or previous batch) is overlaid with every layer in
/// order, then the region finish (caption) and `setsar` are applied. Audio, when the output
/// has any: generated silence or the previous batch, mixed with delayed layer audio and the
/// region's track, then forced to the output channel layout and optionally normalised.
pub fn compose_command(opts: &FfmpegOpts, job: &ComposeJob<'_>) -> VeditResult<ComposeCommand> {
    let step = job.step;
    let mut g = GraphBuilder {
        opts,
        inputs: Vec::new(),
        chains: Vec::new(),
    };

    let base_audio = match &step.base {
        BaseInput::Background { color, image } => {
            let idx = g.color(color.as_str(), step.width, step.height, step.duration);
            g.chain(format!("[{idx}:v]setpts=PTS-STARTPTS[bg]"));
            if let Some(image) = image {
                let img = g.still(image, step.duration);
                g.chain(format!("[{img}:v]setpts=PTS-STARTPTS[bgimg]"));
                g.chain("[bg][bgimg]overlay=x=0:y=0:eof_action=pass[base]".to_string());
            } else {
                g.chain("[bg]null[base]".to_string());
            }
            step.audio_channels.map(|n| {
                let a = g.lavfi(format!(
                    "anullsrc=channel_layout={}:sample_rate={SILENCE_SAMPLE_RATE}:d={}",
                    channel_layout(n),
                    secs(step.duration)
                ));
                format!("{a}:a")
            })
        }
        BaseInput::Previous => {
            let prev = job.previous.ok_or_else(|| {
                VeditError::render(format!(
                    "region {} batch {} has no previous output",
                    step.region.0, step.batch
                ))
            })?;
            let idx = g.file(prev);
            g.chain(format!("[{idx}:v]setpts=PTS-STARTPTS[base]"));
            step.audio_channels.map(|_| format!("{idx}:a"))
        }
    };

    let mut current = "base".to_string();
    let mut mix = Vec::new();
    if let Some(a) = base_audio {
        mix.push(a);
    }

    for (i, layer) in step.layers.iter().enumerate() {
        let idx = match &layer.input {
            LayerInput::Excerpt(_) | LayerInput::Region(_) => {
                let path = job.input(i).ok_or_else(|| {
                    VeditError::render(format!(
                        "layer {i} of region {} has no input file",
                        step.region.0
                    ))
                })?;
                g.file(path)
            }
            LayerInput::Image(path) => g.still(job.input(i).unwrap_or(path.as_path()), layer.duration),
            LayerInput::Solid {
                color,
                width,
                height,
            } => g.color(color.as_str(), *width, *height, layer.duration),
        };

        let mut prep = format!("[{idx}:v]");
        if let LayerPosition::Sweep {
            tile_width,
            tile_height,
            ..
        } = &layer.position
        {
            let _ = write!(prep, "scale=width={tile_width}:height={tile_height},");
        }
        let _ = write!(prep, "setpts=PTS-STARTPTS+{}/TB", secs(layer.start));
        if layer.fade_in.is_some() || layer.fade_out.is_some() {
            prep.push_str(",format=yuva420p");
            if let Some(f) = layer.fade_in {
                prep.push_str(&fade_clause("in", f));
            }
            if let Some(f) = layer.fade_out {
                prep.push_str(&fade_clause("out", f));
            }
        }
        let _ = write!(prep, "[l{i}]");
        g.chain(prep);

        let (x, y) = overlay_position(layer);
        g.chain(format!(
            "[{current}][l{i}]overlay=x={x}:y={y}:eof_action=pass:enable='between(t,{},{})'[v{i}]",
            secs(layer.start),
            secs(layer.end())
        ));
        current = format!("v{i}");

        if layer.audio && step.audio_channels.is_some() {
            let ms = (layer.start * 1000.0).round().max(0.0) as u64;
            g.chain(format!(
                "[{idx}:a]asetpts=PTS-STARTPTS,adelay=delays={ms}:all=1[la{i}]"
            ));
            mix.push(format!("la{i}"));
        }
    }

    let finish = step.finish.as_ref();
    let mut tail = Vec::new();
    if let Some(caption) = finish.and_then(|f| f.caption.as_ref()) {
        tail.push(format!(
            "drawtext=fontcolor=white:borderw=1:expansion=none:text={}:x=10:y=h-th-10:enable='gt(t,{})'",
            escape_graph(&escape_value(&caption.text)),
            secs(caption.start)
        ));
    }
    tail.push(format!("setsar={}/{}", step.sar.num, step.sar.den));
    g.chain(format!("[{current}]{}[vout]", tail.join(",")));

    let has_audio = match step.audio_channels {
        Some(n) => {
            if let Some(track) = finish.and_then(|f| f.audio_track.as_ref()) {
                let idx = g.file(&track.path);
                let shaping = match track.fade_out {
                    Some(f) => format!(
                        "afade=t=out:st={}:d={}",
                        secs(f.start),
                        secs(f.duration)
                    ),
                    None => "anull".to_string(),
                };
                g.chain(format!("[{idx}:a]asetpts=PTS-STARTPTS,{shaping}[trk]"));
                mix.push("trk".to_string());
            }
            let labels: String = mix.iter().map(|m| format!("[{m}]")).collect();
            let mut post = format!("aformat=channel_layouts={}", channel_layout(n));
            if finish.is_some_and(|f| f.normalize_audio) {
                post.push_str(",dynaudnorm");
            }
            if mix.len() > 1 {
                g.chain(format!(
                    "{labels}amix=inputs={}:duration=longest:dropout_transition=0,{post}[aout]",
                    mix.len()
                ));
            } else {
                g.chain(format!("{labels}{post}[aout]"));
            }
            true
        }
        None => false,
    };

    Ok(ComposeCommand {
        inputs: g.inputs,
        filter: g.chains.join(";"),
        has_audio,
    })
}

pub fn compose_args(opts: &FfmpegOpts, job: &ComposeJob<'_>, out: &Path) -> VeditResult<Vec<OsString>> {
    let cmd = compose_command(opts, job)?;
    let step = job.step;
    let mut a = Argv::default();
    a.push("-hide_banner")
        .opt("-loglevel", opts.log_level.as_str())
        .push("-y");
    for input in &cmd.inputs {
        a.extend(input);
    }
    a.opt("-filter_complex", cmd.filter.as_str())
        .opt("-map", "[vout]");
    if cmd.has_audio {
        a.opt("-map", "[aout]")
            .opt("-c:a", opts.audio_codec.as_str());
        if let Some(n) = step.audio_channels {
            a.opt("-ac", n.to_string());
        }
    } else {
        a.push("-an");
    }
    a.opt("-t", secs(step.duration))
        .opt("-r", opts.frame_rate.to_string())
        .opt("-c:v", opts.video_codec.as_str())
        .opt("-crf", opts.crf.to_string())
        .opt("-pix_fmt", step.pixel_format.as_str())
        .opt("-f", "mp4")
        .push(out);
    Ok(a.0)
}

fn overlay_position(layer: &Layer) -> (String, String) {
    match &layer.position {
        LayerPosition::Fixed { x, y } => (x.to_string(), y.to_string()),
        LayerPosition::Sweep {
            sweep,
            cross_offset,
            ..
        } => {
            let along = format!(
                "'{}+(t-{})*{}'",
                sweep.from,
                secs(layer.start),
                sweep.velocity(layer.duration)
            );
            match sweep.axis {
                Axis::Horizontal => (along, cross_offset.to_string()),
                Axis::Vertical => (cross_offset.to_string(), along),
            }
        }
    }
}

fn fade_clause(kind: &str, f: FadeWindow) -> String {
    format!(
        ",fade=t={kind}:st={}:d={}:alpha=1",
        secs(f.start),
        secs(f.duration)
    )
}

/// Escape a filter option value.
fn escape_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a string embedded in a filtergraph description.
fn escape_graph(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
