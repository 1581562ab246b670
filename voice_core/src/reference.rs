//! The single live reference recording.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Serialize;

/// Where the current reference came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum ReferenceSource {
    File(PathBuf),
    Placeholder,
    Upload,
}

/// An immutable reference waveform at the pipeline sample rate
#[derive(Debug)]
pub struct Reference {
    pub samples: Vec<f32>,
    pub source: ReferenceSource,
}

impl Reference {
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / sample_rate as f64
    }
}

/// Swappable holder for the current [`Reference`].
///
/// Readers take an `Arc` snapshot; a writer installs a whole new value, so
/// no reader can observe a partially replaced waveform.
#[derive(Debug)]
pub struct ReferenceSlot {
    current: RwLock<Arc<Reference>>,
}

impl ReferenceSlot {
    pub fn new(reference: Reference) -> Self {
        Self {
            current: RwLock::new(Arc::new(reference)),
        }
    }

    pub fn snapshot(&self) -> Arc<Reference> {
        // a poisoned lock still holds a complete Arc
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Install `reference`, returning the one it replaced.
    pub fn replace(&self, reference: Reference) -> Arc<Reference> {
        let next = Arc::new(reference);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_replace_is_visible_to_next_snapshot() {
        let slot = ReferenceSlot::new(Reference {
            samples: vec![0.0; 10],
            source: ReferenceSource::Placeholder,
        });
        let before = slot.snapshot();
        let old = slot.replace(Reference {
            samples: vec![1.0; 20],
            source: ReferenceSource::Upload,
        });
        assert!(Arc::ptr_eq(&before, &old));
        let after = slot.snapshot();
        assert_eq!(after.samples.len(), 20);
        assert_eq!(after.source, ReferenceSource::Upload);
        // earlier snapshots are untouched
        assert_eq!(before.samples.len(), 10);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_waveforms() {
        let slot = Arc::new(ReferenceSlot::new(Reference {
            samples: vec![0.0; 1000],
            source: ReferenceSource::Placeholder,
        }));

        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 1..50 {
                    slot.replace(Reference {
                        samples: vec![i as f32; 1000],
                        source: ReferenceSource::Upload,
                    });
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let r = slot.snapshot();
                        let first = r.samples[0];
                        assert!(r.samples.iter().all(|&s| s == first));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
