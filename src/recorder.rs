//! Turns the event stream back into whole runs for saving.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::AutosaveSettings;
use crate::export;
use crate::types::{ProtocolEvent, RunHeader, RunKind, Spectrum, TimeSample};
use crate::{CommfilError, Result};

/// A run that will receive no more data.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishedRun {
    TimeSeries { header: Option<RunHeader>, samples: Vec<TimeSample> },
    Spectrum(Spectrum),
}

impl FinishedRun {
    pub fn kind(&self) -> RunKind {
        match self {
            FinishedRun::TimeSeries { .. } => RunKind::TimeSeries,
            FinishedRun::Spectrum(_) => RunKind::Spectrum,
        }
    }

    pub fn header(&self) -> Option<&RunHeader> {
        match self {
            FinishedRun::TimeSeries { header, .. } => header.as_ref(),
            FinishedRun::Spectrum(spectrum) => spectrum.header.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FinishedRun::TimeSeries { samples, .. } => samples.is_empty(),
            FinishedRun::Spectrum(spectrum) => spectrum.channel_counts.is_empty(),
        }
    }

    /// Export text for this run.
    pub fn render(&self, exported: NaiveDateTime) -> String {
        match self {
            FinishedRun::TimeSeries { header, samples } => {
                export::render_time_series(header.as_ref(), samples, exported)
            }
            FinishedRun::Spectrum(spectrum) => export::render_spectrum(spectrum, exported),
        }
    }
}

/// Collects time samples between run boundaries.
///
/// A time run finishes when the session reports its samples being dropped,
/// which happens when the next run starts or the session is reset. A
/// spectrum is finished as soon as it completes.
#[derive(Debug, Default)]
pub struct RunRecorder {
    header: Option<RunHeader>,
    samples: Vec<TimeSample>,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event, returning a run it finished.
    pub fn observe(&mut self, event: &ProtocolEvent) -> Option<FinishedRun> {
        match event {
            ProtocolEvent::TimeSample(sample) => {
                self.samples.push(*sample);
                None
            }
            ProtocolEvent::RunReset { previous: RunKind::TimeSeries, .. } => self.take_time_series(),
            ProtocolEvent::RunStarted(header) if header.kind == RunKind::TimeSeries => {
                self.header = Some(header.clone());
                None
            }
            ProtocolEvent::SampleIdentified { protocol, sample_number } => {
                let header = self
                    .header
                    .get_or_insert_with(|| RunHeader::new(RunKind::TimeSeries, "", ""));
                header.protocol.clone_from(protocol);
                header.sample_number = Some(*sample_number);
                None
            }
            ProtocolEvent::SpectrumComplete(spectrum) => {
                Some(FinishedRun::Spectrum(spectrum.clone()))
            }
            _ => None,
        }
    }

    /// Finish whatever is buffered, at end of stream.
    pub fn finish(&mut self) -> Option<FinishedRun> {
        self.take_time_series()
    }

    /// Samples of the run in progress
    pub fn samples(&self) -> &[TimeSample] {
        &self.samples
    }

    fn take_time_series(&mut self) -> Option<FinishedRun> {
        if self.samples.is_empty() {
            return None;
        }
        debug!("Time run finished with {} samples", self.samples.len());
        Some(FinishedRun::TimeSeries {
            header: self.header.clone(),
            samples: std::mem::take(&mut self.samples),
        })
    }
}

/// Writes finished runs to time-stamped files.
#[derive(Debug, Clone)]
pub struct Autosaver {
    settings: AutosaveSettings,
}

impl Autosaver {
    pub fn new(settings: AutosaveSettings) -> Self {
        Self { settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Save `run`, returning the written path.
    ///
    /// Disabled autosave and empty runs write nothing.
    pub async fn save(&self, run: &FinishedRun, now: NaiveDateTime) -> Result<Option<PathBuf>> {
        if !self.settings.enabled || run.is_empty() {
            return Ok(None);
        }

        let directory = &self.settings.directory;
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| CommfilError::file_error(directory.clone(), e))?;

        let path = directory.join(export::autosave_file_name(run.kind(), run.header(), now));
        export::write_file(&path, &run.render(now)).await?;
        info!("Autosaved {} run to {}", run.kind(), path.display());
        Ok(Some(path))
    }
}
