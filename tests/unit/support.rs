use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::compile::plan::{ComposeJob, ComposeStep, TranscodeJob};
use crate::foundation::error::{VeditError, VeditResult};
use crate::media::backend::MediaBackend;
use crate::media::probe::ProbeReport;

/// Probe answers keyed by file name; transcode/compose write a small placeholder file.
#[derive(Default)]
pub struct FakeBackend {
    pub reports: HashMap<String, ProbeReport>,
    pub probes: AtomicUsize,
    pub transcodes: Mutex<Vec<TranscodeJob>>,
    pub composes: Mutex<Vec<ComposeStep>>,
    pub fail_transcodes: bool,
    pub fail_composes: bool,
}

impl FakeBackend {
    pub fn with(mut self, name: &str, report: ProbeReport) -> Self {
        self.reports.insert(name.to_string(), report);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
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

pub fn with_sar(mut report: ProbeReport, num: u32, den: u32) -> ProbeReport {
    report.sar_num = num;
    report.sar_den = den;
    report
}

pub fn audio_only(duration: f64, channels: u16) -> ProbeReport {
    ProbeReport {
        duration,
        audio_channels: Some(channels),
        ..ProbeReport::default()
    }
}

impl MediaBackend for FakeBackend {
    fn probe(&self, path: &Path) -> VeditResult<ProbeReport> {
        self.probes.fetch_add(1, Ordering::SeqCst);
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
        if self.fail_transcodes {
            return Err(VeditError::render("transcode exploded"));
        }
        self.transcodes.lock().unwrap().push(job.clone());
        std::fs::write(out, format!("transcode {}", job.fingerprint))
            .map_err(|e| VeditError::render(e.to_string()))
    }

    fn compose(&self, job: &ComposeJob<'_>, out: &Path) -> VeditResult<()> {
        if self.fail_composes {
            return Err(VeditError::render("compose exploded"));
        }
        self.composes.lock().unwrap().push(job.step.clone());
        std::fs::write(
            out,
            format!("compose region {} batch {}", job.step.region.0, job.step.batch),
        )
        .map_err(|e| VeditError::render(e.to_string()))
    }
}
