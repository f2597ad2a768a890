/// WAV staging for the STT/TTS boundary: write captured utterances as
/// canonical 8kHz/16-bit/mono WAV, read arbitrary-rate TTS output back
/// down to the same format (spec §4.I).
use hound::{ SampleFormat, WavSpec, WavWriter };
use std::io;
use std::path::{ Path, PathBuf };

pub const TARGET_SAMPLE_RATE: u32 = 8000;

fn slin_spec() -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write a captured utterance (raw PCM16LE mono 8kHz bytes) as a
/// canonical WAV file.
pub fn write_slin_wav(path: &Path, pcm: &[u8]) -> io::Result<()> {
    let mut writer = WavWriter::create(path, slin_spec()).map_err(to_io_error)?;
    for chunk in pcm.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        writer.write_sample(sample).map_err(to_io_error)?;
    }
    writer.finalize().map_err(to_io_error)
}

/// Read a WAV file (any sample rate, mono or stereo, 16-bit PCM) and
/// return PCM16LE mono 8kHz bytes, downmixing and resampling as
/// needed.
pub fn read_wav_as_slin(path: &Path) -> io::Result<Vec<u8>> {
    let mut reader = hound::WavReader::open(path).map_err(to_io_error)?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "expected 16-bit PCM WAV"));
    }

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<Result<_, _>>()
        .map_err(to_io_error)?;

    let mono = downmix(&samples, spec.channels as usize);
    let resampled = resample(&mono, spec.sample_rate, TARGET_SAMPLE_RATE);

    Ok(resampled.iter().flat_map(|s| s.to_le_bytes()).collect())
}

/// Average all channels down to mono. A no-op for already-mono input.
fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Linear-interpolation resampler for an arbitrary `(from_rate, to_rate)`
/// pair, generalizing the teacher's fixed 16k<->24k resampler.
pub fn resample(pcm: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if pcm.is_empty() || from_rate == to_rate {
        return pcm.to_vec();
    }

    let ratio = (from_rate as f64) / (to_rate as f64);
    let out_len = ((pcm.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = (i as f64) * ratio;
        let idx = src_pos.floor() as usize;
        let frac = src_pos - (idx as f64);

        let s0 = pcm[idx.min(pcm.len() - 1)] as f64;
        let s1 = pcm[(idx + 1).min(pcm.len() - 1)] as f64;
        let interpolated = s0 + (s1 - s0) * frac;
        out.push(interpolated.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
    }

    out
}

fn to_io_error(e: hound::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// Best-effort deletion of a per-turn working file; an already-absent
/// file is not an error, matching `deleteFile` in the original.
pub fn delete_best_effort(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete working file");
        }
    }
}

/// Spawn best-effort deletion on a detached task, mirroring the
/// original's `go deleteFile(...)` — the turn never waits on it.
pub fn delete_in_background(path: PathBuf) {
    tokio::spawn(async move {
        delete_best_effort(&path);
    });
}

/// `write_slin_wav` run on a blocking-pool thread, for use from async
/// orchestration code (hound's writer is synchronous).
pub async fn write_slin_wav_async(path: PathBuf, pcm: Vec<u8>) -> io::Result<()> {
    tokio::task
        ::spawn_blocking(move || write_slin_wav(&path, &pcm))
        .await
        .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e.to_string())))
}

/// `read_wav_as_slin` run on a blocking-pool thread.
pub async fn read_wav_as_slin_async(path: PathBuf) -> io::Result<Vec<u8>> {
    tokio::task
        ::spawn_blocking(move || read_wav_as_slin(&path))
        .await
        .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e.to_string())))
}
