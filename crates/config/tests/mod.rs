//! Integration tests for loading `RuntimeConfig` from actual files on
//! disk (the `#[cfg(test)]` module in `src/lib.rs` covers in-memory
//! TOML round-tripping; these exercise `RuntimeConfig::load`'s I/O and
//! validation paths instead).
