#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use vedit::{
    ComposeJob, ComposeStep, MediaBackend, ProbeReport, TranscodeJob, VeditError, VeditResult,
};

/// In-process backend: probe answers come from a table keyed by file name, transcode and
/// compose record the job and write a small placeholder file.
#[derive(Default)]
pub struct FakeBackend {
    reports: HashMap<String, ProbeReport>,
    pub transcodes: Mutex<Vec<TranscodeJob>>,
    pub composes: Mutex<Vec<ComposeStep>>,
    pub fail_transcodes: AtomicBool,
    pub fail_composes: AtomicBool,
}

impl FakeBackend {
    pub fn with(mut self, name: &str, report: ProbeReport) -> Self {
        self.reports.insert(name.to_string(), report);
        self
    }

    pub fn transcode_count(&self) -> usize {
        self.transcodes.lock().unwrap().len()
    }

    pub fn compose_count(&self) -> usize {
        self.composes.lock().unwrap().len()
    }
}

impl MediaBackend for FakeBackend {
    fn probe(&self, path: &Path) -> VeditResult<ProbeReport> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.reports
            .get(&name)
            .cloned()
            .ok_or_else(|| VeditError::probe(format!("cannot read '{name}'")))
    }

    fn transcode(&self, job: &TranscodeJob, out: &Path) -> VeditResult<()> {
        if self.fail_transcodes.load(Ordering::SeqCst) {
            return Err(VeditError::render("transcode exploded"));
        }
        self.transcodes.lock().unwrap().push(job.clone());
        std::fs::write(out, format!("transcode {}", job.fingerprint))
            .map_err(|e| VeditError::render(e.to_string()))
    }

    fn compose(&self, job: &ComposeJob<'_>, out: &Path) -> VeditResult<()> {
        if self.fail_composes.load(Ordering::SeqCst) {
            return Err(VeditError::render("compose exploded"));
        }
        for i in 0..job.step.layers.len() {
            if let Some(p) = job.input(i) {
                assert!(p.is_file(), "layer {i} input {} missing", p.display());
            }
        }
        if let Some(prev) = job.previous {
            assert!(prev.is_file(), "previous batch {} missing", prev.display());
        }
        self.composes.lock().unwrap().push(job.step.clone());
        std::fs::write(
            out,
            format!("compose region {} batch {}", job.step.region.0, job.step.batch),
        )
        .map_err(|e| VeditError::render(e.to_string()))
    }
}

pub fn video(width: u32, height: u32, duration: f64) -> ProbeReport {
    ProbeReport {
        width,
        height,
        duration,
        sar_num: 1,
        sar_den: 1,
        frame_rate: None,
        audio_channels: None,
    }
}

pub fn with_audio(mut report: ProbeReport, channels: u16) -> ProbeReport {
    report.audio_channels = Some(channels);
    report
}
