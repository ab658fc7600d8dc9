// EDF (European Data Format) file reader/writer implementation
// Specification: https://www.edfplus.info/specs/edf.html

use crate::channels::SensorSelection;
use crate::error::{Result, SignalError};
use crate::recording::{ChannelInfo, Recording};
use ndarray::Array2;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const HEADER_BYTES: usize = 256;
const SIGNAL_HEADER_BYTES: usize = 256;
const NUM_RECORDS_OFFSET: u64 = 236;

#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub version: String,              // 8 bytes
    pub patient_id: String,           // 80 bytes
    pub recording_id: String,         // 80 bytes
    pub start_date: String,           // 8 bytes (dd.mm.yy)
    pub start_time: String,           // 8 bytes (hh.mm.ss)
    pub header_bytes: usize,          // 8 bytes
    pub reserved: String,             // 44 bytes
    pub num_data_records: i64,        // 8 bytes (-1 if unknown)
    pub duration_of_data_record: f64, // 8 bytes, seconds
    pub num_signals: usize,           // 4 bytes
}

#[derive(Debug, Clone)]
pub struct EdfSignalHeader {
    pub label: String,                 // 16 bytes
    pub transducer_type: String,       // 80 bytes
    pub physical_dimension: String,    // 8 bytes
    pub physical_minimum: f64,         // 8 bytes
    pub physical_maximum: f64,         // 8 bytes
    pub digital_minimum: i64,          // 8 bytes
    pub digital_maximum: i64,          // 8 bytes
    pub prefiltering: String,          // 80 bytes
    pub num_samples_per_record: usize, // 8 bytes
    pub reserved: String,              // 32 bytes
}

impl EdfSignalHeader {
    pub fn sample_frequency(&self, record_duration: f64) -> f64 {
        self.num_samples_per_record as f64 / record_duration
    }

    pub fn gain(&self) -> f64 {
        (self.physical_maximum - self.physical_minimum)
            / (self.digital_maximum - self.digital_minimum) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_maximum - self.gain() * self.digital_maximum as f64
    }
}

pub struct EdfReader {
    file: BufReader<File>,
    pub header: EdfHeader,
    pub signal_headers: Vec<EdfSignalHeader>,
    num_records: usize,
}

impl EdfReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SignalError::FileNotFound(path.display().to_string()));
        }
        let file_len = std::fs::metadata(path)?.len();
        let mut file = BufReader::new(File::open(path)?);

        let header = Self::read_header(&mut file)?;
        let signal_headers = Self::read_signal_headers(&mut file, header.num_signals)?;

        let record_bytes = Self::record_bytes_for(&signal_headers);
        if record_bytes == 0 {
            return Err(SignalError::ParseError(
                "data records contain no samples".to_string(),
            ));
        }

        let available = file_len.saturating_sub(header.header_bytes as u64) / record_bytes as u64;
        let num_records = if header.num_data_records < 0 {
            log::warn!(
                "EDF header reports unknown record count, inferred {} from file size",
                available
            );
            available as usize
        } else if (header.num_data_records as u64) > available {
            return Err(SignalError::ParseError(format!(
                "file is truncated: header declares {} data records but only {} are present",
                header.num_data_records, available
            )));
        } else {
            header.num_data_records as usize
        };

        Ok(Self {
            file,
            header,
            signal_headers,
            num_records,
        })
    }

    fn read_fixed_string<R: Read>(reader: &mut R, size: usize) -> Result<String> {
        let mut buffer = vec![0u8; size];
        reader
            .read_exact(&mut buffer)
            .map_err(|e| SignalError::ParseError(format!("Failed to read header field: {}", e)))?;
        Ok(String::from_utf8_lossy(&buffer).trim().to_string())
    }

    fn read_number<R: Read, T: std::str::FromStr>(
        reader: &mut R,
        size: usize,
        field: &str,
    ) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = Self::read_fixed_string(reader, size)?;
        raw.trim()
            .parse::<T>()
            .map_err(|e| SignalError::ParseError(format!("Invalid {} '{}': {}", field, raw, e)))
    }

    fn read_header<R: Read>(reader: &mut R) -> Result<EdfHeader> {
        let version = Self::read_fixed_string(reader, 8)?;
        let patient_id = Self::read_fixed_string(reader, 80)?;
        let recording_id = Self::read_fixed_string(reader, 80)?;
        let start_date = Self::read_fixed_string(reader, 8)?;
        let start_time = Self::read_fixed_string(reader, 8)?;
        let header_bytes: usize = Self::read_number(reader, 8, "header bytes")?;
        let reserved = Self::read_fixed_string(reader, 44)?;
        let num_data_records: i64 = Self::read_number(reader, 8, "number of data records")?;
        let duration_of_data_record: f64 = Self::read_number(reader, 8, "record duration")?;
        let num_signals: usize = Self::read_number(reader, 4, "number of signals")?;

        if duration_of_data_record <= 0.0 {
            return Err(SignalError::ParseError(format!(
                "record duration must be positive, got {}",
                duration_of_data_record
            )));
        }
        if header_bytes != HEADER_BYTES + num_signals * SIGNAL_HEADER_BYTES {
            return Err(SignalError::ParseError(format!(
                "header size {} does not match {} signals",
                header_bytes, num_signals
            )));
        }

        log::debug!(
            "EDF header parsed: num_data_records={}, duration_of_data_record={}, num_signals={}",
            num_data_records,
            duration_of_data_record,
            num_signals
        );

        Ok(EdfHeader {
            version,
            patient_id,
            recording_id,
            start_date,
            start_time,
            header_bytes,
            reserved,
            num_data_records,
            duration_of_data_record,
            num_signals,
        })
    }

    fn read_signal_headers<R: Read>(
        reader: &mut R,
        num_signals: usize,
    ) -> Result<Vec<EdfSignalHeader>> {
        // Fields are stored column-wise: every label, then every transducer, ...
        let mut column = |size: usize| -> Result<Vec<String>> {
            (0..num_signals)
                .map(|_| Self::read_fixed_string(reader, size))
                .collect()
        };

        let labels = column(16)?;
        let transducer_types = column(80)?;
        let physical_dimensions = column(8)?;
        let physical_minimums = column(8)?;
        let physical_maximums = column(8)?;
        let digital_minimums = column(8)?;
        let digital_maximums = column(8)?;
        let prefilterings = column(80)?;
        let samples_per_record = column(8)?;
        let reserveds = column(32)?;

        fn parse<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.parse::<T>()
                .map_err(|e| SignalError::ParseError(format!("Invalid {} '{}': {}", field, raw, e)))
        }

        let mut signal_headers = Vec::with_capacity(num_signals);
        for i in 0..num_signals {
            let header = EdfSignalHeader {
                label: labels[i].clone(),
                transducer_type: transducer_types[i].clone(),
                physical_dimension: physical_dimensions[i].clone(),
                physical_minimum: parse(&physical_minimums[i], "physical minimum")?,
                physical_maximum: parse(&physical_maximums[i], "physical maximum")?,
                digital_minimum: parse(&digital_minimums[i], "digital minimum")?,
                digital_maximum: parse(&digital_maximums[i], "digital maximum")?,
                prefiltering: prefilterings[i].clone(),
                num_samples_per_record: parse(&samples_per_record[i], "number of samples")?,
                reserved: reserveds[i].clone(),
            };
            if header.digital_maximum <= header.digital_minimum {
                return Err(SignalError::ParseError(format!(
                    "signal '{}' has an empty digital range",
                    header.label
                )));
            }
            signal_headers.push(header);
        }

        Ok(signal_headers)
    }

    fn record_bytes_for(signal_headers: &[EdfSignalHeader]) -> usize {
        signal_headers
            .iter()
            .map(|sh| sh.num_samples_per_record * 2)
            .sum()
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    pub fn total_duration(&self) -> f64 {
        self.num_records as f64 * self.header.duration_of_data_record
    }

    pub fn sample_frequency(&self, signal_index: usize) -> f64 {
        self.signal_headers[signal_index].sample_frequency(self.header.duration_of_data_record)
    }

    /// Read the given signals in full, converted to physical units.
    pub fn read_signals(&mut self, signal_indices: &[usize]) -> Result<Vec<Vec<f64>>> {
        for &idx in signal_indices {
            if idx >= self.signal_headers.len() {
                return Err(SignalError::InvalidParameter(format!(
                    "Signal index {} out of bounds",
                    idx
                )));
            }
        }

        let record_bytes = Self::record_bytes_for(&self.signal_headers);
        let mut offsets = Vec::with_capacity(self.signal_headers.len());
        let mut running = 0usize;
        for sh in &self.signal_headers {
            offsets.push(running);
            running += sh.num_samples_per_record * 2;
        }

        let mut digital: Vec<Vec<i16>> = signal_indices
            .iter()
            .map(|&idx| {
                Vec::with_capacity(self.signal_headers[idx].num_samples_per_record * self.num_records)
            })
            .collect();

        self.file
            .seek(SeekFrom::Start(self.header.header_bytes as u64))?;
        let mut record = vec![0u8; record_bytes];
        for _ in 0..self.num_records {
            self.file.read_exact(&mut record)?;
            for (out, &idx) in digital.iter_mut().zip(signal_indices) {
                let start = offsets[idx];
                let end = start + self.signal_headers[idx].num_samples_per_record * 2;
                out.extend(
                    record[start..end]
                        .chunks_exact(2)
                        .map(|b| i16::from_le_bytes([b[0], b[1]])),
                );
            }
        }

        // Parallel conversion of digital to physical values across channels
        let physical: Vec<Vec<f64>> = digital
            .par_iter()
            .zip(signal_indices.par_iter())
            .map(|(samples, &idx)| {
                let sh = &self.signal_headers[idx];
                let gain = sh.gain();
                let offset = sh.offset();
                samples.iter().map(|&d| gain * d as f64 + offset).collect()
            })
            .collect();

        Ok(physical)
    }
}

/// Load an EDF file as a [`Recording`], keeping only channels accepted by `selection`.
///
/// Selected channels must share one sampling rate; channels sampled at a
/// different rate than the first selected channel are dropped.
pub fn read_recording<P: AsRef<Path>>(path: P, selection: SensorSelection) -> Result<Recording> {
    let path = path.as_ref();
    let mut reader = EdfReader::open(path)?;
    log::info!(
        "Opened EDF {:?}: {} signals, {} records of {}s ({:.1}s total)",
        path,
        reader.signal_headers.len(),
        reader.num_records(),
        reader.header.duration_of_data_record,
        reader.total_duration()
    );

    let candidates: Vec<(usize, ChannelInfo)> = reader
        .signal_headers
        .iter()
        .enumerate()
        .map(|(idx, sh)| (idx, ChannelInfo::from_label(sh.label.clone())))
        .filter(|(_, info)| selection.accepts(info.channel_type))
        .collect();

    let Some(&(first_idx, _)) = candidates.first() else {
        return Err(SignalError::NoChannels {
            sensor: selection.to_string(),
        });
    };
    let sfreq = reader.sample_frequency(first_idx);

    let mut indices = Vec::with_capacity(candidates.len());
    let mut channels = Vec::with_capacity(candidates.len());
    for (idx, info) in candidates {
        let rate = reader.sample_frequency(idx);
        if (rate - sfreq).abs() > 1e-9 {
            log::warn!(
                "Dropping channel '{}': sampled at {} Hz, recording uses {} Hz",
                info.name,
                rate,
                sfreq
            );
            continue;
        }
        indices.push(idx);
        channels.push(info);
    }

    let signals = reader.read_signals(&indices)?;
    let n_samples = signals.first().map(|s| s.len()).unwrap_or(0);
    let flat: Vec<f64> = signals.into_iter().flatten().collect();
    let data = Array2::from_shape_vec((channels.len(), n_samples), flat)
        .map_err(|e| SignalError::InvalidData(e.to_string()))?;

    log::info!(
        "Loaded {} {} channels, {} samples at {} Hz",
        channels.len(),
        selection,
        n_samples,
        sfreq
    );
    Recording::from_channels(channels, data, sfreq)
}

pub struct EdfWriter {
    file: BufWriter<File>,
    signal_headers: Vec<EdfSignalHeader>,
    records_written: i64,
}

impl EdfWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        patient_id: &str,
        recording_id: &str,
        record_duration: f64,
        signal_headers: Vec<EdfSignalHeader>,
    ) -> Result<Self> {
        let header = EdfHeader {
            version: "0".to_string(),
            patient_id: patient_id.to_string(),
            recording_id: recording_id.to_string(),
            start_date: "01.01.00".to_string(),
            start_time: "00.00.00".to_string(),
            header_bytes: HEADER_BYTES + signal_headers.len() * SIGNAL_HEADER_BYTES,
            reserved: String::new(),
            num_data_records: -1, // patched by finalize
            duration_of_data_record: record_duration,
            num_signals: signal_headers.len(),
        };

        let mut writer = Self {
            file: BufWriter::new(File::create(path)?),
            signal_headers,
            records_written: 0,
        };
        writer.write_header(&header)?;
        Ok(writer)
    }

    fn write_fixed_string(&mut self, s: &str, size: usize) -> Result<()> {
        let mut buffer = vec![b' '; size];
        let bytes = s.as_bytes();
        let copy_len = bytes.len().min(size);
        buffer[..copy_len].copy_from_slice(&bytes[..copy_len]);
        self.file.write_all(&buffer)?;
        Ok(())
    }

    fn write_header(&mut self, header: &EdfHeader) -> Result<()> {
        self.write_fixed_string(&header.version, 8)?;
        self.write_fixed_string(&header.patient_id, 80)?;
        self.write_fixed_string(&header.recording_id, 80)?;
        self.write_fixed_string(&header.start_date, 8)?;
        self.write_fixed_string(&header.start_time, 8)?;
        self.write_fixed_string(&header.header_bytes.to_string(), 8)?;
        self.write_fixed_string(&header.reserved, 44)?;
        self.write_fixed_string(&header.num_data_records.to_string(), 8)?;
        self.write_fixed_string(&format_edf_number(header.duration_of_data_record), 8)?;
        self.write_fixed_string(&header.num_signals.to_string(), 4)?;

        self.write_column(16, |sh| sh.label.clone())?;
        self.write_column(80, |sh| sh.transducer_type.clone())?;
        self.write_column(8, |sh| sh.physical_dimension.clone())?;
        self.write_column(8, |sh| format_edf_number(sh.physical_minimum))?;
        self.write_column(8, |sh| format_edf_number(sh.physical_maximum))?;
        self.write_column(8, |sh| sh.digital_minimum.to_string())?;
        self.write_column(8, |sh| sh.digital_maximum.to_string())?;
        self.write_column(80, |sh| sh.prefiltering.clone())?;
        self.write_column(8, |sh| sh.num_samples_per_record.to_string())?;
        self.write_column(32, |sh| sh.reserved.clone())?;
        Ok(())
    }

    fn write_column<F>(&mut self, size: usize, field: F) -> Result<()>
    where
        F: Fn(&EdfSignalHeader) -> String,
    {
        let values: Vec<String> = self.signal_headers.iter().map(field).collect();
        for value in values {
            self.write_fixed_string(&value, size)?;
        }
        Ok(())
    }

    pub fn write_physical_record(&mut self, physical_data: &[Vec<f64>]) -> Result<()> {
        if physical_data.len() != self.signal_headers.len() {
            return Err(SignalError::InvalidParameter(format!(
                "Expected {} signals, got {}",
                self.signal_headers.len(),
                physical_data.len()
            )));
        }

        for (sh, samples) in self.signal_headers.iter().zip(physical_data) {
            if samples.len() != sh.num_samples_per_record {
                return Err(SignalError::InvalidParameter(format!(
                    "Signal '{}' expected {} samples, got {}",
                    sh.label,
                    sh.num_samples_per_record,
                    samples.len()
                )));
            }
        }

        let digital: Vec<Vec<i16>> = physical_data
            .par_iter()
            .zip(self.signal_headers.par_iter())
            .map(|(samples, sh)| {
                let gain = sh.gain();
                let offset = sh.offset();
                samples
                    .iter()
                    .map(|&physical| {
                        ((physical - offset) / gain)
                            .round()
                            .clamp(sh.digital_minimum as f64, sh.digital_maximum as f64)
                            as i16
                    })
                    .collect()
            })
            .collect();

        for samples in digital {
            for value in samples {
                self.file.write_all(&value.to_le_bytes())?;
            }
        }
        self.records_written += 1;
        Ok(())
    }

    pub fn finalize(mut self) -> Result<()> {
        self.file.flush()?;
        let mut file = self
            .file
            .into_inner()
            .map_err(|e| SignalError::IoError(e.into_error()))?;
        file.seek(SeekFrom::Start(NUM_RECORDS_OFFSET))?;
        let mut field = vec![b' '; 8];
        let count = self.records_written.to_string();
        field[..count.len().min(8)].copy_from_slice(&count.as_bytes()[..count.len().min(8)]);
        file.write_all(&field)?;
        file.flush()?;
        Ok(())
    }
}

/// Write a recording as a 16-bit EDF file with one-second data records.
///
/// The sampling rate must be a whole number of Hz. A trailing partial record
/// is padded by repeating each channel's final sample.
pub fn write_recording<P: AsRef<Path>>(path: P, recording: &Recording) -> Result<()> {
    let sfreq = recording.sfreq();
    if sfreq.fract() != 0.0 {
        return Err(SignalError::InvalidParameter(format!(
            "EDF export needs an integral sampling rate, got {}",
            sfreq
        )));
    }
    let samples_per_record = sfreq as usize;
    let data = recording.data();

    let signal_headers: Vec<EdfSignalHeader> = recording
        .channels()
        .iter()
        .zip(data.outer_iter())
        .map(|(channel, row)| {
            let (mut min, mut max) = row
                .iter()
                .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            if max - min < 1e-6 {
                min -= 1.0;
                max += 1.0;
            }
            EdfSignalHeader {
                label: channel.name.clone(),
                transducer_type: "AgAgCl electrode".to_string(),
                physical_dimension: "uV".to_string(),
                physical_minimum: min.floor(),
                physical_maximum: max.ceil(),
                digital_minimum: -32768,
                digital_maximum: 32767,
                prefiltering: String::new(),
                num_samples_per_record: samples_per_record,
                reserved: String::new(),
            }
        })
        .collect();

    let mut writer = EdfWriter::create(path, "X X X X", "Startdate X X X X", 1.0, signal_headers)?;
    let n_samples = recording.n_samples();
    let mut start = 0;
    while start < n_samples {
        let record: Vec<Vec<f64>> = data
            .outer_iter()
            .map(|row| {
                (start..start + samples_per_record)
                    .map(|i| row[i.min(n_samples - 1)])
                    .collect()
            })
            .collect();
        writer.write_physical_record(&record)?;
        start += samples_per_record;
    }
    writer.finalize()
}

/// Render a number into at most 8 ASCII characters, dropping precision as needed.
fn format_edf_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e7 {
        return format!("{}", value as i64);
    }
    for precision in (0..=6).rev() {
        let text = format!("{:.*}", precision, value);
        if text.len() <= 8 {
            return text;
        }
    }
    format!("{}", value.round() as i64)
}
