/// Length in bytes of a sha256 digest, used throughout as the canonical content-hash size.
pub const DIGEST_SIZE: usize = 32;

/// A `serde(default = "...")` helper for fields that default to `true`.
#[must_use]
pub const fn bool_true() -> bool {
    true
}
