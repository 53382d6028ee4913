//! Task id generation.

use chrono::Utc;
use parking_lot::Mutex;

use super::task::TaskId;

/// Generates `<unix-millis>-<seq>` ids.
///
/// The sequence restarts at zero on every new millisecond and counts up
/// within one, so ids handed out by one generator never repeat even when
/// thousands are requested in the same tick. A clock that steps backwards
/// is clamped to the last tick seen.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: Mutex<(i64, u32)>,
}

impl IdGenerator {
    /// Create a new generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next id.
    pub fn next_id(&self) -> TaskId {
        let now = Utc::now().timestamp_millis();
        let (millis, seq) = {
            let mut last = self.last.lock();
            if now > last.0 {
                *last = (now, 0);
            } else {
                last.1 += 1;
            }
            *last
        };
        TaskId(format!("{}-{:04}", millis, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_valid() {
        let generator = IdGenerator::new();
        let id = generator.next_id();
        assert!(TaskId::parse(id.as_str()).is_ok());
        assert!(id.as_str().contains('-'));
    }

    #[test]
    fn test_ids_unique_within_tick() {
        let generator = IdGenerator::new();
        let ids: HashSet<_> = (0..1000).map(|_| generator.next_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let generator = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || (0..250).map(|_| generator.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 2000);
    }
}
