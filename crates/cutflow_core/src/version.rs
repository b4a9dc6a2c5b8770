//! Adjustment version chain.
//!
//! Every accepted adjustment produces a new backend job whose id is the base
//! id with a `_v{N}` suffix. The suffix doubles as the routing key for
//! exports, which always target the base id.

/// Separator between a base id and its version number.
pub const VERSION_SEPARATOR: &str = "_v";

/// Builds the id for `version` of `base_id`. Version 0 is the base itself.
pub fn versioned_id(base_id: &str, version: u32) -> String {
    if version == 0 {
        base_id.to_string()
    } else {
        format!("{base_id}{VERSION_SEPARATOR}{version}")
    }
}

/// Splits a trailing `_v{digits}` suffix off `id`, returning the base and the digits.
fn split_suffix(id: &str) -> Option<(&str, &str)> {
    let idx = id.rfind(VERSION_SEPARATOR)?;
    let (base, suffix) = id.split_at(idx);
    let digits = &suffix[VERSION_SEPARATOR.len()..];
    if base.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, digits))
}

/// Numeric value of a digit run, saturating at `u32::MAX`.
fn parse_version(digits: &str) -> u32 {
    digits.bytes().fold(0u32, |acc, b| {
        acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
    })
}

/// Returns the base id of `id`, or `id` unchanged when it has no version suffix.
pub fn base_of(id: &str) -> &str {
    split_suffix(id).map_or(id, |(base, _)| base)
}

/// Returns the version encoded in `id`; 0 for a base id.
pub fn version_of(id: &str) -> u32 {
    split_suffix(id).map_or(0, |(_, digits)| parse_version(digits))
}

/// Versions derived from one base job, strictly increasing from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChain {
    base_id: String,
    versions: Vec<u32>,
}

impl VersionChain {
    pub fn new(base_id: impl Into<String>) -> Self {
        Self {
            base_id: base_id.into(),
            versions: Vec::new(),
        }
    }

    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    pub fn versions(&self) -> &[u32] {
        &self.versions
    }

    pub fn latest(&self) -> u32 {
        self.versions.last().copied().unwrap_or(0)
    }

    /// Appends the next version and returns its id. Always derived from the
    /// base id, so versions never nest.
    pub fn derive_next(&mut self) -> String {
        let next = self.latest() + 1;
        self.versions.push(next);
        versioned_id(&self.base_id, next)
    }

    pub fn id_for(&self, version: u32) -> String {
        versioned_id(&self.base_id, version)
    }

    /// True if `id` is the base id or one of the derived ids in this chain.
    pub fn contains(&self, id: &str) -> bool {
        if id == self.base_id {
            return true;
        }
        match split_suffix(id) {
            Some((base, digits)) => {
                base == self.base_id && self.versions.contains(&parse_version(digits))
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_then_base_is_identity() {
        for base in ["p1", "proj_20260205_143000", "asm-x", "a_v", "v1"] {
            let mut chain = VersionChain::new(base);
            let derived = chain.derive_next();
            assert_eq!(base_of(&derived), base, "derived={derived}");
        }
    }

    #[test]
    fn derive_twice_yields_one_then_two() {
        let mut chain = VersionChain::new("p1");
        assert_eq!(chain.derive_next(), "p1_v1");
        assert_eq!(chain.derive_next(), "p1_v2");
        assert_eq!(chain.versions(), &[1, 2]);
    }

    #[test]
    fn base_of_leaves_unversioned_ids_alone() {
        assert_eq!(base_of("p1"), "p1");
        assert_eq!(base_of("p1_v"), "p1_v");
        assert_eq!(base_of("p1_vx"), "p1_vx");
        assert_eq!(base_of("_v3"), "_v3");
    }

    #[test]
    fn base_of_strips_only_the_last_suffix() {
        assert_eq!(base_of("p1_v12"), "p1");
        assert_eq!(base_of("p1_v1_v2"), "p1_v1");
        assert_eq!(base_of("p1_v99999999999"), "p1");
        assert_eq!(version_of("p1_v12"), 12);
        assert_eq!(version_of("p1_v99999999999"), u32::MAX);
        assert_eq!(version_of("p1"), 0);
    }

    #[test]
    fn contains_checks_base_and_recorded_versions() {
        let mut chain = VersionChain::new("p1");
        chain.derive_next();
        assert!(chain.contains("p1"));
        assert!(chain.contains("p1_v1"));
        assert!(!chain.contains("p1_v2"));
        assert!(!chain.contains("p2_v1"));
        assert_eq!(chain.id_for(0), "p1");
    }
}
