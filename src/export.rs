//! Tab-separated export of finished runs.
//!
//! Files start with a block of `#` comment lines describing the run, then a
//! column header comment, then one row per sample or channel. The layout is
//! fixed so files from older acquisition software and from this crate can be
//! read interchangeably.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use commfil::export::{read_time_series, render_time_series};
//! use commfil::types::TimeSample;
//!
//! let exported = NaiveDate::from_ymd_opt(2022, 3, 14)
//!     .and_then(|d| d.and_hms_opt(10, 50, 0))
//!     .unwrap();
//! let samples = [TimeSample::new(1, 120.0), TimeSample::new(2, 118.0)];
//!
//! let text = render_time_series(None, &samples, exported);
//! assert_eq!(read_time_series(&text).unwrap(), samples);
//! ```

use std::fmt::Write as _;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::types::{RunHeader, RunKind, Spectrum, TimeSample};
use crate::{CommfilError, Result};

const PRODUCER_LINE: &str = "# Scintomatic ";

const DISCLAIMER_LINE: &str = "# Disclaimer: Data interpreted from an encoding protocol which was \
    reverse-engineered without documentation or confirmation. No guarantee of correctness is given.";

const TIME_COLUMNS: &str = "# Time (s)\tCounts (per minute)";
const SPECTRUM_COLUMNS: &str = "# Channel number\tCounts";

/// Render a time-count record.
pub fn render_time_series(
    header: Option<&RunHeader>,
    samples: &[TimeSample],
    exported: NaiveDateTime,
) -> String {
    let mut out = String::with_capacity(512 + samples.len() * 16);
    write_metadata(&mut out, "Time count record", header, "Scintomatic time", exported);
    out.push_str("# \n");
    out.push_str(TIME_COLUMNS);
    out.push('\n');

    for sample in samples {
        let _ = writeln!(out, "{}\t{}", sample.elapsed_seconds, sample.count_rate);
    }
    out
}

/// Render a spectrum record, channels numbered from zero.
pub fn render_spectrum(spectrum: &Spectrum, exported: NaiveDateTime) -> String {
    let mut out = String::with_capacity(640 + spectrum.channel_counts.len() * 8);
    write_metadata(
        &mut out,
        "Spectrum record",
        spectrum.header.as_ref(),
        "instrument time",
        exported,
    );
    out.push_str(DISCLAIMER_LINE);
    out.push('\n');
    out.push_str(SPECTRUM_COLUMNS);
    out.push('\n');

    for (channel, count) in spectrum.channel_counts.iter().enumerate() {
        let _ = writeln!(out, "{channel}\t{count}");
    }
    out
}

/// Header lines shared by both record kinds, through the second blank comment.
fn write_metadata(
    out: &mut String,
    record: &str,
    header: Option<&RunHeader>,
    clock: &str,
    exported: NaiveDateTime,
) {
    let protocol = header.map_or("", |h| h.protocol.as_str());
    let date = header.map_or("", |h| h.date.as_str());
    let sample_number = header
        .and_then(|h| h.sample_number)
        .map(|n| n.to_string())
        .unwrap_or_default();
    let started = header
        .and_then(|h| h.start_time)
        .map(|t| t.to_string())
        .unwrap_or_default();

    out.push_str(PRODUCER_LINE);
    out.push('\n');
    let _ = writeln!(out, "# {record} ");
    let _ = writeln!(out, "# Exported: {} ", exported.format("%H:%M:%S, %A, %b %d, %Y"));
    let _ = writeln!(out, "# Measurement type: {protocol} ");
    let _ = writeln!(out, "# Measurement date ({clock}): {date} ");
    let _ = writeln!(out, "# Measurement sample number: {sample_number} ");
    let _ = writeln!(out, "# Measurement started ({clock}): {started} ");
    out.push_str("# Notes:  \n");
    out.push_str("# \n");
    out.push_str("# \n");
}

/// Parse the rows of a time-count record.
pub fn read_time_series(text: &str) -> Result<Vec<TimeSample>> {
    rows(text, "time series export")
        .map(|row| {
            let (line, elapsed, rate) = row?;
            let elapsed = elapsed.parse::<u32>().map_err(|e| {
                CommfilError::parse("time series export", format!("line {line}: elapsed: {e}"))
            })?;
            let rate = rate.parse::<f64>().map_err(|e| {
                CommfilError::parse("time series export", format!("line {line}: count rate: {e}"))
            })?;
            Ok(TimeSample::new(elapsed, rate))
        })
        .collect()
}

/// Parse the rows of a spectrum record into counts in channel order.
///
/// Channel numbers must run from zero without gaps.
pub fn read_spectrum(text: &str) -> Result<Vec<u32>> {
    let mut counts = Vec::new();
    for row in rows(text, "spectrum export") {
        let (line, channel, count) = row?;
        let channel = channel.parse::<usize>().map_err(|e| {
            CommfilError::parse("spectrum export", format!("line {line}: channel: {e}"))
        })?;
        if channel != counts.len() {
            return Err(CommfilError::parse(
                "spectrum export",
                format!("line {line}: expected channel {}, found {channel}", counts.len()),
            ));
        }
        let count = count.parse::<u32>().map_err(|e| {
            CommfilError::parse("spectrum export", format!("line {line}: counts: {e}"))
        })?;
        counts.push(count);
    }
    Ok(counts)
}

/// Data rows as `(line number, first column, second column)`.
fn rows<'a>(
    text: &'a str,
    context: &'static str,
) -> impl Iterator<Item = Result<(usize, &'a str, &'a str)>> + 'a {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.starts_with('#') && !line.trim().is_empty())
        .map(move |(number, line)| {
            let mut columns = line.split('\t');
            match (columns.next(), columns.next(), columns.next()) {
                (Some(first), Some(second), None) => Ok((number, first.trim(), second.trim())),
                _ => Err(CommfilError::parse(
                    context,
                    format!("line {number}: expected two tab-separated columns"),
                )),
            }
        })
}

/// Autosave file name for a finished run, e.g.
/// `C14-3 time - 10-50-00, 20220314 Scintomatic AUTOSAVE.txt`.
pub fn autosave_file_name(
    kind: RunKind,
    header: Option<&RunHeader>,
    saved: NaiveDateTime,
) -> String {
    let protocol = header.map_or("", |h| h.protocol.trim_matches(' '));
    let sample_number = header
        .and_then(|h| h.sample_number)
        .map(|n| n.to_string())
        .unwrap_or_default();
    let name = format!(
        "{protocol}-{sample_number} {kind} - {} Scintomatic AUTOSAVE.txt",
        saved.format("%H-%M-%S, %Y%m%d")
    );
    // Protocol names come off the wire
    name.replace(['/', '\\'], "_")
}

/// Write rendered text to `path`.
pub async fn write_file(path: &Path, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| CommfilError::file_error(path.to_path_buf(), e))?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StartTime;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn exported() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 14)
            .and_then(|d| d.and_hms_opt(10, 50, 0))
            .expect("valid timestamp")
    }

    fn header(kind: RunKind) -> RunHeader {
        let mut header = RunHeader::new(kind, "C14", "14 Mar. 2022");
        header.start_time = Some(StartTime { hour: 10, minute: 42, second: 7 });
        header.sample_number = Some(3);
        header
    }

    #[test]
    fn time_record_header_layout() {
        let text = render_time_series(
            Some(&header(RunKind::TimeSeries)),
            &[TimeSample::new(1, 120.0)],
            exported(),
        );
        let expected = "# Scintomatic \n\
            # Time count record \n\
            # Exported: 10:50:00, Monday, Mar 14, 2022 \n\
            # Measurement type: C14 \n\
            # Measurement date (Scintomatic time): 14 Mar. 2022 \n\
            # Measurement sample number: 3 \n\
            # Measurement started (Scintomatic time): 10:42:07 \n\
            # Notes:  \n\
            # \n\
            # \n\
            # \n\
            # Time (s)\tCounts (per minute)\n\
            1\t120\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn spectrum_record_has_disclaimer_and_channel_rows() {
        let spectrum = Spectrum {
            channel_counts: vec![0, 5, 250],
            checksum_ok: true,
            bitsum: None,
            header: Some(header(RunKind::Spectrum)),
        };
        let text = render_spectrum(&spectrum, exported());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[1], "# Spectrum record ");
        assert_eq!(lines[4], "# Measurement date (instrument time): 14 Mar. 2022 ");
        assert_eq!(lines[6], "# Measurement started (instrument time): 10:42:07 ");
        assert!(lines[10].starts_with("# Disclaimer: Data interpreted"));
        assert!(lines[10].ends_with("No guarantee of correctness is given."));
        assert_eq!(lines[11], "# Channel number\tCounts");
        assert_eq!(&lines[12..], ["0\t0", "1\t5", "2\t250"]);

        assert_eq!(read_spectrum(&text).expect("parses back"), vec![0, 5, 250]);
    }

    #[test]
    fn missing_header_leaves_fields_blank() {
        let text = render_time_series(None, &[], exported());
        assert!(text.contains("# Measurement type:  \n"));
        assert!(text.contains("# Measurement sample number:  \n"));
        assert!(read_time_series(&text).expect("no rows").is_empty());
    }

    #[test]
    fn malformed_rows_are_parse_errors() {
        let err = read_time_series("# comment\n1\t120\nnot a row\n").expect_err("bad row");
        assert!(matches!(err, CommfilError::Parse { .. }));
        assert!(err.to_string().contains("line 3"));

        let err = read_spectrum("0\t1\n2\t1\n").expect_err("gap in channels");
        assert!(err.to_string().contains("expected channel 1"));
    }

    #[test]
    fn autosave_names_follow_run_and_clock() {
        let name =
            autosave_file_name(RunKind::TimeSeries, Some(&header(RunKind::TimeSeries)), exported());
        assert_eq!(name, "C14-3 time - 10-50-00, 20220314 Scintomatic AUTOSAVE.txt");

        let name = autosave_file_name(RunKind::Spectrum, None, exported());
        assert_eq!(name, "- spectrum - 10-50-00, 20220314 Scintomatic AUTOSAVE.txt");
    }

    #[tokio::test]
    async fn write_file_reports_path_on_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("missing").join("out.txt");
        let err = write_file(&path, "x").await.expect_err("parent does not exist");
        assert!(matches!(err, CommfilError::File { path: p, .. } if p == path));
    }

    proptest! {
        #[test]
        fn prop_time_series_round_trip(
            rows in prop::collection::vec((0u32..100_000, 0u32..10_000_000), 0..64)
        ) {
            let samples: Vec<TimeSample> = rows
                .iter()
                .map(|&(elapsed, cpm)| TimeSample::new(elapsed, f64::from(cpm)))
                .collect();
            let text = render_time_series(None, &samples, exported());
            prop_assert_eq!(read_time_series(&text).unwrap(), samples);
        }

        #[test]
        fn prop_spectrum_round_trip(counts in prop::collection::vec(any::<u32>(), 0..300)) {
            let spectrum = Spectrum {
                channel_counts: counts.clone(),
                checksum_ok: false,
                bitsum: None,
                header: None,
            };
            let text = render_spectrum(&spectrum, exported());
            prop_assert_eq!(read_spectrum(&text).unwrap(), counts);
        }
    }
}
