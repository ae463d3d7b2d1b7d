//! Board and purity classifications as typed flag sets.
//!
//! Both are stored as small integer bitmasks, but the catalog never works on
//! raw integers: a [`FlagSet`] can only be built from known flags, and a set
//! stored on an entry is never empty.
//!
//! Search filtering uses *subset* semantics: an entry matches a requested set
//! only if every flag the entry carries is in the request. An entry tagged
//! `{General, Anime}` does not match a request for `{General}` even though the
//! two sets intersect.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// A single flag in a closed bit universe.
pub trait Flag: Copy + Eq + fmt::Debug + 'static {
    /// Every flag in the universe, in bit order.
    const ALL: &'static [Self];

    /// Bit assigned to this flag.
    fn bit(self) -> u8;

    /// Lowercase name used in config files, CLI flags and JSON.
    fn name(self) -> &'static str;

    /// Mask with every flag of the universe set.
    fn universe() -> u8 {
        Self::ALL.iter().fold(0, |acc, f| acc | f.bit())
    }
}

/// Content category of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Board {
    General,
    Anime,
    People,
}

impl Flag for Board {
    const ALL: &'static [Self] = &[Board::General, Board::Anime, Board::People];

    fn bit(self) -> u8 {
        match self {
            Board::General => 0b001,
            Board::Anime => 0b010,
            Board::People => 0b100,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Board::General => "general",
            Board::Anime => "anime",
            Board::People => "people",
        }
    }
}

/// Content sensitivity of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purity {
    Sfw,
    Sketchy,
    Nsfw,
}

impl Flag for Purity {
    const ALL: &'static [Self] = &[Purity::Sfw, Purity::Sketchy, Purity::Nsfw];

    fn bit(self) -> u8 {
        match self {
            Purity::Sfw => 0b001,
            Purity::Sketchy => 0b010,
            Purity::Nsfw => 0b100,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Purity::Sfw => "sfw",
            Purity::Sketchy => "sketchy",
            Purity::Nsfw => "nsfw",
        }
    }
}

/// A set of flags drawn from one universe.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagSet<F: Flag> {
    bits: u8,
    _flag: PhantomData<F>,
}

/// Set of boards an entry belongs to or a query accepts.
pub type BoardSet = FlagSet<Board>;

/// Set of purity levels an entry carries or a query accepts.
pub type PuritySet = FlagSet<Purity>;

impl<F: Flag> FlagSet<F> {
    /// The empty set. Never valid on a stored entry.
    pub fn empty() -> Self {
        Self::from_bits_unchecked(0)
    }

    /// Every flag in the universe.
    pub fn all() -> Self {
        Self::from_bits_unchecked(F::universe())
    }

    /// A set containing exactly one flag.
    pub fn only(flag: F) -> Self {
        Self::from_bits_unchecked(flag.bit())
    }

    /// Build a set from a stored bitmask.
    ///
    /// Returns `None` for zero or for bits outside the universe.
    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits == 0 || bits & !F::universe() != 0 {
            None
        } else {
            Some(Self::from_bits_unchecked(bits))
        }
    }

    fn from_bits_unchecked(bits: u8) -> Self {
        Self {
            bits,
            _flag: PhantomData,
        }
    }

    /// Raw bitmask for storage.
    pub fn bits(self) -> u8 {
        self.bits
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn contains(self, flag: F) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn insert(&mut self, flag: F) {
        self.bits |= flag.bit();
    }

    pub fn iter(self) -> impl Iterator<Item = F> {
        F::ALL.iter().copied().filter(move |f| self.contains(*f))
    }
}

impl<F: Flag> FromIterator<F> for FlagSet<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut set = Self::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

impl<F: Flag> fmt::Debug for FlagSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<F: Flag> fmt::Display for FlagSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Flag::name).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Parses a comma-separated list of flag names, or `all`.
impl<F: Flag> FromStr for FlagSet<F> {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let mut set = Self::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let flag = F::ALL
                .iter()
                .copied()
                .find(|f| f.name().eq_ignore_ascii_case(part))
                .ok_or_else(|| format!("unknown flag '{part}'"))?;
            set.insert(flag);
        }
        if set.is_empty() {
            return Err("flag set must not be empty".to_string());
        }
        Ok(set)
    }
}

impl<F: Flag> Serialize for FlagSet<F> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(Flag::name))
    }
}

impl<'de, F: Flag> Deserialize<'de> for FlagSet<F> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names.join(",").parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bits_rejects_zero_and_out_of_universe() {
        assert!(PuritySet::from_bits(0).is_none());
        assert!(PuritySet::from_bits(0b1000).is_none());
        assert_eq!(PuritySet::from_bits(0b101).unwrap().bits(), 0b101);
    }

    #[test]
    fn test_collect_and_contains() {
        let set: PuritySet = [Purity::Sfw, Purity::Nsfw].into_iter().collect();
        assert!(set.contains(Purity::Sfw));
        assert!(set.contains(Purity::Nsfw));
        assert!(!set.contains(Purity::Sketchy));
        assert_eq!(set.bits(), 0b101);
    }

    #[test]
    fn test_parse_names_and_all() {
        let set: BoardSet = "general, people".parse().unwrap();
        assert_eq!(set.bits(), 0b101);
        assert_eq!("all".parse::<PuritySet>().unwrap(), PuritySet::all());
        assert!("".parse::<PuritySet>().is_err());
        assert!("weird".parse::<BoardSet>().is_err());
    }

    #[test]
    fn test_serde_as_name_list() {
        let set: PuritySet = [Purity::Sfw, Purity::Sketchy].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["sfw","sketchy"]"#);
        let back: PuritySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
