use data_encoding::HEXUPPER;
use ring::rand::{SecureRandom, SystemRandom};

/// A globally-unique 64 bit identifier naming a logical asset file across
/// all clients and time. Identifiers are minted by clients (possibly
/// offline) and never reused once committed to the store.
pub type Tuid = u64;

/// Reserved "no identifier" value.
pub const NULL_TUID: Tuid = 0;

/// Mints new identifiers from the system's secure random source.
///
/// The registry itself never mints ids, callers draw one here before their
/// first insert. Randomness (instead of a central counter) is what allows
/// disconnected clients to create assets; the resolver's alias table picks
/// up the rare collision afterwards.
pub struct TuidGenerator {
    rng: SystemRandom,
}

impl TuidGenerator {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    pub fn next(&self) -> Tuid {
        let mut bytes = [0u8; 8];
        loop {
            // Documented to only fail when the OS random source is broken,
            // in which case we can not mint identities at all.
            self.rng
                .fill(&mut bytes)
                .expect("system random source unavailable");

            let id = u64::from_be_bytes(bytes);
            if id != NULL_TUID {
                return id;
            }
        }
    }
}

/// Renders an identifier the way it shows up in logs and the CLI
/// (upper-case hex, fixed width).
pub fn format_tuid(id: Tuid) -> String {
    HEXUPPER.encode(&id.to_be_bytes())
}

/// Parses the `format_tuid` rendering back into an identifier.
pub fn parse_tuid(value: &str) -> Option<Tuid> {
    let bytes = HEXUPPER.decode(value.as_bytes()).ok()?;
    if bytes.len() != 8 {
        return None;
    }

    let mut array = [0u8; 8];
    array.copy_from_slice(&bytes);
    Some(u64::from_be_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_non_null_identifiers() {
        let generator = TuidGenerator::new();

        for _ in 0..64 {
            assert_ne!(generator.next(), NULL_TUID);
        }
    }

    #[test]
    fn mints_distinct_identifiers() {
        let generator = TuidGenerator::new();

        let first = generator.next();
        let second = generator.next();
        assert_ne!(first, second);
    }

    #[test]
    fn formats_and_parses_identifiers() {
        assert_eq!(format_tuid(0x1234_5678_9ABC_DEF0), "123456789ABCDEF0");
        assert_eq!(parse_tuid("123456789ABCDEF0"), Some(0x1234_5678_9ABC_DEF0));

        assert_eq!(parse_tuid("nonsense"), None);
        assert_eq!(parse_tuid("12"), None);
    }
}
