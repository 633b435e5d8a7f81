//! Sample source: maps (pack, instrument) to a WAV file and decodes it off
//! the main thread.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use pulsegrid_audio::SampleBuffer;
use pulsegrid_types::{InstrumentId, PackId};

/// Where sample data comes from. `resolve` returns `None` when the pack has
/// no file for the instrument.
pub trait SampleSource: Send + Sync {
    fn resolve(&self, instrument: InstrumentId, pack: &PackId) -> Option<PathBuf>;
    fn decode(&self, path: &Path) -> Result<SampleBuffer, String>;
}

/// Packs laid out as `<root>/<pack>/<instrument key>.wav`.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SampleSource for DirectorySource {
    fn resolve(&self, instrument: InstrumentId, pack: &PackId) -> Option<PathBuf> {
        let path = self
            .root
            .join(pack.as_str())
            .join(format!("{}.wav", instrument.key()));
        path.is_file().then_some(path)
    }

    fn decode(&self, path: &Path) -> Result<SampleBuffer, String> {
        decode_wav(path)
    }
}

/// Decode a WAV file to interleaved f32 in [-1, 1].
pub fn decode_wav(path: &Path) -> Result<SampleBuffer, String> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| format!("open {}: {}", path.display(), e))?;
    let spec = reader.spec();
    let data: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<Result<_, _>>()
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>(),
    }
    .map_err(|e| format!("decode {}: {}", path.display(), e))?;
    if data.is_empty() {
        return Err(format!("{} has no samples", path.display()));
    }
    Ok(SampleBuffer {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        data: data.into(),
    })
}

#[derive(Debug)]
pub enum LoadResult {
    Decoded {
        pack: PackId,
        instrument: InstrumentId,
        buffer: SampleBuffer,
    },
    Failed {
        pack: PackId,
        instrument: InstrumentId,
        reason: String,
    },
}

struct LoadRequest {
    pack: PackId,
    instruments: Vec<InstrumentId>,
}

/// Background decoder. Requests are served in order; results are collected
/// with [`PackLoader::drain`].
///
/// Each (pack, instrument) is decoded at most once: the engine keeps every
/// decoded buffer, so only failed decodes are tried again.
pub struct PackLoader {
    request_tx: Option<Sender<LoadRequest>>,
    result_rx: Receiver<LoadResult>,
    join_handle: Option<JoinHandle<()>>,
    /// Decoded or in flight.
    requested: HashSet<(PackId, InstrumentId)>,
}

impl PackLoader {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<LoadRequest>();
        let (result_tx, result_rx) = mpsc::channel();

        let join_handle = thread::Builder::new()
            .name("pulsegrid-samples".into())
            .spawn(move || {
                for request in request_rx {
                    for instrument in request.instruments {
                        let result = load_one(source.as_ref(), &request.pack, instrument);
                        if result_tx.send(result).is_err() {
                            return;
                        }
                    }
                }
            })
            .map_err(|e| log::error!(target: "audio::samples", "failed to spawn loader: {}", e))
            .ok();

        Self {
            request_tx: Some(request_tx),
            result_rx,
            join_handle,
            requested: HashSet::new(),
        }
    }

    /// Queue decodes for the instruments of `pack` not already decoded or in
    /// flight.
    pub fn request(&mut self, pack: &PackId, instruments: Vec<InstrumentId>) {
        let instruments: Vec<InstrumentId> = instruments
            .into_iter()
            .filter(|id| !self.requested.contains(&(pack.clone(), *id)))
            .collect();
        if instruments.is_empty() {
            log::debug!(target: "audio::samples", "pack {} already cached", pack);
            return;
        }
        let Some(tx) = &self.request_tx else {
            return;
        };
        let request = LoadRequest {
            pack: pack.clone(),
            instruments: instruments.clone(),
        };
        if tx.send(request).is_err() {
            log::warn!(target: "audio::samples", "loader gone, {} not requested", pack);
            return;
        }
        self.requested
            .extend(instruments.into_iter().map(|id| (pack.clone(), id)));
    }

    /// Decode every roster instrument of `pack`.
    pub fn request_pack(&mut self, pack: &PackId) {
        self.request(pack, InstrumentId::all().collect());
    }

    /// Finished decodes. Failures become requestable again.
    pub fn drain(&mut self) -> Vec<LoadResult> {
        let results: Vec<LoadResult> = self.result_rx.try_iter().collect();
        for result in &results {
            if let LoadResult::Failed {
                pack, instrument, ..
            } = result
            {
                self.requested.remove(&(pack.clone(), *instrument));
            }
        }
        results
    }
}

impl Drop for PackLoader {
    fn drop(&mut self) {
        self.request_tx = None;
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn load_one(source: &dyn SampleSource, pack: &PackId, instrument: InstrumentId) -> LoadResult {
    let Some(path) = source.resolve(instrument, pack) else {
        log::warn!(target: "audio::samples", "no sample for {}/{}", pack, instrument);
        return LoadResult::Failed {
            pack: pack.clone(),
            instrument,
            reason: "not found".to_string(),
        };
    };
    match source.decode(&path) {
        Ok(buffer) => {
            log::debug!(
                target: "audio::samples",
                "decoded {} ({} frames)",
                path.display(),
                buffer.frames()
            );
            LoadResult::Decoded {
                pack: pack.clone(),
                instrument,
                buffer,
            }
        }
        Err(reason) => {
            log::warn!(target: "audio::samples", "decode failed for {}/{}: {}", pack, instrument, reason);
            LoadResult::Failed {
                pack: pack.clone(),
                instrument,
                reason,
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::test_support::write_wav;
    use super::*;

    fn wait_for(loader: &mut PackLoader, count: usize) -> Vec<LoadResult> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut results = Vec::new();
        while results.len() < count && Instant::now() < deadline {
            results.extend(loader.drain());
            thread::sleep(Duration::from_millis(5));
        }
        results
    }

    #[test]
    fn int_wav_is_normalised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.wav");
        write_wav(&path, 441, 16_384);
        let buffer = decode_wav(&path).unwrap();
        assert_eq!(buffer.sample_rate, 44_100);
        assert_eq!(buffer.frames(), 441);
        assert!((buffer.data[0] - 0.5).abs() < 1e-6);
        assert!((buffer.duration_secs() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn float_wav_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(0.25f32).unwrap();
            writer.write_sample(-0.25f32).unwrap();
        }
        writer.finalize().unwrap();
        let buffer = decode_wav(&path).unwrap();
        assert_eq!(buffer.channels, 2);
        assert_eq!(buffer.frames(), 100);
        assert_eq!(buffer.data[1], -0.25);
    }

    #[test]
    fn garbage_file_fails_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"definitely not riff").unwrap();
        assert!(decode_wav(&path).is_err());
    }

    #[test]
    fn directory_layout_resolves_by_key() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("808").join("openhihat.wav"), 10, 1);
        let source = DirectorySource::new(dir.path());
        let pack = PackId::new("808");
        assert!(source.resolve(InstrumentId::OPEN_HIHAT, &pack).is_some());
        assert!(source.resolve(InstrumentId::KICK, &pack).is_none());
        assert!(source
            .resolve(InstrumentId::OPEN_HIHAT, &PackId::default())
            .is_none());
    }

    #[test]
    fn loader_reports_hits_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("default").join("kick.wav"), 100, 8_000);
        std::fs::write(dir.path().join("default").join("snare.wav"), b"junk").unwrap();
        let mut loader = PackLoader::new(Arc::new(DirectorySource::new(dir.path())));
        loader.request(
            &PackId::default(),
            vec![InstrumentId::KICK, InstrumentId::SNARE, InstrumentId::TOM],
        );
        let results = wait_for(&mut loader, 3);
        assert_eq!(results.len(), 3);
        assert!(matches!(
            &results[0],
            LoadResult::Decoded { instrument, .. } if *instrument == InstrumentId::KICK
        ));
        assert!(matches!(
            &results[1],
            LoadResult::Failed { instrument, .. } if *instrument == InstrumentId::SNARE
        ));
        assert!(matches!(
            &results[2],
            LoadResult::Failed { reason, .. } if reason == "not found"
        ));
    }

    struct CountingSource {
        inner: DirectorySource,
        decodes: std::sync::atomic::AtomicUsize,
    }

    impl SampleSource for CountingSource {
        fn resolve(&self, instrument: InstrumentId, pack: &PackId) -> Option<PathBuf> {
            self.inner.resolve(instrument, pack)
        }

        fn decode(&self, path: &Path) -> Result<SampleBuffer, String> {
            self.decodes
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.decode(path)
        }
    }

    #[test]
    fn returning_to_a_pack_decodes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        for pack in ["default", "909"] {
            for id in InstrumentId::all() {
                write_wav(&dir.path().join(pack).join(format!("{}.wav", id.key())), 10, 100);
            }
        }
        // tom is missing from the second pack's first attempt
        std::fs::remove_file(dir.path().join("909").join("tom.wav")).unwrap();
        let source = Arc::new(CountingSource {
            inner: DirectorySource::new(dir.path()),
            decodes: Default::default(),
        });
        let mut loader = PackLoader::new(source.clone());
        let decodes = || source.decodes.load(std::sync::atomic::Ordering::SeqCst);

        loader.request_pack(&PackId::default());
        assert_eq!(wait_for(&mut loader, 8).len(), 8);
        loader.request_pack(&PackId::new("909"));
        assert_eq!(wait_for(&mut loader, 8).len(), 8);
        assert_eq!(decodes(), 15);

        loader.request_pack(&PackId::default());
        thread::sleep(Duration::from_millis(50));
        assert!(loader.drain().is_empty());
        assert_eq!(decodes(), 15);

        write_wav(&dir.path().join("909").join("tom.wav"), 10, 100);
        loader.request_pack(&PackId::new("909"));
        let retried = wait_for(&mut loader, 1);
        assert!(matches!(
            retried.as_slice(),
            [LoadResult::Decoded { instrument, .. }] if *instrument == InstrumentId::TOM
        ));
        assert_eq!(decodes(), 16);
    }
}
