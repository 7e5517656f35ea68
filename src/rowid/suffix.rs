//! RowId suffix generation: an injectable strategy, per spec.md §9, the
//! same "trait object registered per caller" shape as the teacher's
//! `table::rollers::PartitionRoller`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which suffix grammar to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuffixFormat {
    /// RFC-4122 v4-style string, e.g. `3fa85f64-5717-4562-b3fc-2c963f66afa6`.
    Uuid,
    /// 12 lowercase alphanumeric characters.
    Short,
    /// `<millis-since-epoch>-<6 alnum>`.
    Timestamp,
}

/// Strategy that renders an opaque, unique-within-partition token.
pub trait SuffixGenerator: Send + Sync {
    fn generate(&self) -> String;
}

struct UuidSuffix;
impl SuffixGenerator for UuidSuffix {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

struct ShortSuffix;
impl SuffixGenerator for ShortSuffix {
    fn generate(&self) -> String {
        let raw = Uuid::new_v4().as_u128();
        alphanumeric_from_u128(raw, 12)
    }
}

struct TimestampSuffix;
impl SuffixGenerator for TimestampSuffix {
    fn generate(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let raw = Uuid::new_v4().as_u128();
        format!("{millis}-{}", alphanumeric_from_u128(raw, 6))
    }
}

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn alphanumeric_from_u128(mut raw: u128, len: usize) -> String {
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let idx = (raw % ALPHABET.len() as u128) as usize;
        out.push(ALPHABET[idx] as char);
        raw /= ALPHABET.len() as u128;
        if raw == 0 {
            // Re-seed from a fresh random value so a len longer than the
            // entropy in one u128 division chain still stays unpredictable.
            raw = Uuid::new_v4().as_u128();
        }
    }
    out
}

/// Holds one generator per [`SuffixFormat`], each independently
/// overridable (e.g. to make suffixes deterministic in tests).
pub struct SuffixGenerators {
    uuid: Arc<dyn SuffixGenerator>,
    short: Arc<dyn SuffixGenerator>,
    timestamp: Arc<dyn SuffixGenerator>,
}

impl Default for SuffixGenerators {
    fn default() -> Self {
        Self {
            uuid: Arc::new(UuidSuffix),
            short: Arc::new(ShortSuffix),
            timestamp: Arc::new(TimestampSuffix),
        }
    }
}

impl SuffixGenerators {
    pub fn generate(&self, format: SuffixFormat) -> String {
        match format {
            SuffixFormat::Uuid => self.uuid.generate(),
            SuffixFormat::Short => self.short.generate(),
            SuffixFormat::Timestamp => self.timestamp.generate(),
        }
    }

    pub fn with_generator(mut self, format: SuffixFormat, generator: Arc<dyn SuffixGenerator>) -> Self {
        match format {
            SuffixFormat::Uuid => self.uuid = generator,
            SuffixFormat::Short => self.short = generator,
            SuffixFormat::Timestamp => self.timestamp = generator,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_suffix_is_twelve_lowercase_alphanumerics() {
        let gens = SuffixGenerators::default();
        let s = gens.generate(SuffixFormat::Short);
        assert_eq!(s.len(), 12);
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn timestamp_suffix_has_millis_dash_six_alnum_shape() {
        let gens = SuffixGenerators::default();
        let s = gens.generate(SuffixFormat::Timestamp);
        let (millis, rest) = s.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(rest.len(), 6);
    }

    #[test]
    fn uuid_suffix_parses_as_uuid() {
        let gens = SuffixGenerators::default();
        let s = gens.generate(SuffixFormat::Uuid);
        assert!(Uuid::parse_str(&s).is_ok());
    }

    #[test]
    fn overridden_generator_is_used() {
        struct Fixed;
        impl SuffixGenerator for Fixed {
            fn generate(&self) -> String {
                "fixed-suffix".to_string()
            }
        }
        let gens = SuffixGenerators::default().with_generator(SuffixFormat::Uuid, Arc::new(Fixed));
        assert_eq!(gens.generate(SuffixFormat::Uuid), "fixed-suffix");
    }
}
