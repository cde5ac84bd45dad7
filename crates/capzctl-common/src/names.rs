//! Memorable cluster names
//!
//! Used when the user creates a cluster without naming it. Names are an
//! adjective and a noun joined by a hyphen, so they are always valid DNS
//! labels.

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "ancient", "autumn", "billowing", "bold", "brave", "bright", "calm", "clever",
    "cool", "crimson", "curious", "dawn", "deep", "eager", "early", "fancy", "fierce", "floral",
    "fragrant", "gentle", "golden", "green", "hidden", "humble", "icy", "jolly", "keen", "late",
    "lively", "lucky", "misty", "morning", "nimble", "noble", "old", "patient", "polished",
    "proud", "purple", "quiet", "rapid", "restless", "rough", "shy", "silent", "silver",
    "snowy", "solitary", "sparkling", "spring", "steady", "still", "summer", "swift", "tiny",
    "twilight", "wandering", "weathered", "white", "wild", "winter", "wispy", "young",
];

const NOUNS: &[&str] = &[
    "bird", "breeze", "brook", "bush", "butterfly", "cherry", "cloud", "darkness", "dawn",
    "dew", "dream", "dust", "feather", "field", "fire", "firefly", "flower", "fog", "forest",
    "frog", "frost", "glade", "glitter", "grass", "hall", "hat", "haze", "heart", "hill",
    "lake", "leaf", "meadow", "moon", "morning", "mountain", "night", "paper", "pine", "pond",
    "rain", "resonance", "river", "sea", "shadow", "shape", "silence", "sky", "smoke", "snow",
    "sound", "star", "sun", "sunset", "surf", "thunder", "tree", "violet", "voice", "water",
    "waterfall", "wave", "wildflower", "wind", "wood",
];

/// Generate a memorable `adjective-noun` name
pub fn generate_cluster_name() -> String {
    generate_cluster_name_with(&mut rand::thread_rng())
}

/// Generate a memorable name from the given random source
pub fn generate_cluster_name_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(rng).copied().unwrap_or("lake");
    format!("{}-{}", adjective, noun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn names_are_two_lowercase_words() {
        for _ in 0..50 {
            let name = generate_cluster_name();
            let parts: Vec<&str> = name.split('-').collect();
            assert_eq!(parts.len(), 2, "{}", name);
            assert!(ADJECTIVES.contains(&parts[0]));
            assert!(NOUNS.contains(&parts[1]));
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '-'));
        }
    }

    #[test]
    fn seeded_generation_is_repeatable() {
        let a = generate_cluster_name_with(&mut StdRng::seed_from_u64(7));
        let b = generate_cluster_name_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn word_lists_are_dns_safe() {
        for word in ADJECTIVES.iter().chain(NOUNS) {
            assert!(word.chars().all(|c| c.is_ascii_lowercase()), "{}", word);
        }
    }
}
