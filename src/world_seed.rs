use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// A deterministic seed for everything that must stay fixed within one playthrough.
///
/// Which latent flaws a design or engine carries is decided here: ask for a topic
/// stream and you always get the same values for a given seed, regardless of the
/// order in which designs are created or saves are loaded.
///
/// Launch outcomes never draw from this; each simulation owns its own generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSeed {
    seed: u64,
}

impl WorldSeed {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create a WorldSeed with a random seed
    pub fn random() -> Self {
        Self {
            seed: rand::thread_rng().gen(),
        }
    }

    /// Get the raw seed value (for serialization)
    pub fn raw_seed(&self) -> u64 {
        self.seed
    }

    /// Deterministic generator for one topic, such as the flaw roll of a scope.
    ///
    /// # Example
    /// ```
    /// use rand::Rng;
    /// use rocket_tycoon_core::world_seed::WorldSeed;
    /// let seed = WorldSeed::new(12345);
    /// let a: u64 = seed.query_rng("flaws/design/0").gen();
    /// let b: u64 = seed.query_rng("flaws/design/0").gen();
    /// assert_eq!(a, b);
    /// ```
    pub fn query_rng(&self, topic: &str) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.topic_hash(topic))
    }

    /// FNV-1a over the world seed, a separator and the topic.
    /// Stable across Rust versions, unlike std's DefaultHasher.
    fn topic_hash(&self, topic: &str) -> u64 {
        self.seed
            .to_le_bytes()
            .iter()
            .chain(std::iter::once(&0xffu8))
            .chain(topic.as_bytes())
            .fold(FNV_OFFSET_BASIS, |hash, &byte| {
                (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
            })
    }
}
