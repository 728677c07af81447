//! Typed key-value storage for persisted settings.
//!
//! Mirrors the shape of ESP-IDF NVS: a flat namespace of short keys holding
//! booleans, integers or strings. Reads return `Ok(None)` for missing keys.

extern crate alloc;
use alloc::string::String;

/// Persistent key-value store.
pub trait KeyValueStore {
    /// Error type for storage operations.
    type Error: core::fmt::Debug;

    /// Read a boolean.
    fn get_bool(&self, key: &str) -> Result<Option<bool>, Self::Error>;

    /// Read a signed integer.
    fn get_i32(&self, key: &str) -> Result<Option<i32>, Self::Error>;

    /// Read a string.
    fn get_str(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Write a boolean.
    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), Self::Error>;

    /// Write a signed integer.
    fn put_i32(&mut self, key: &str, value: i32) -> Result<(), Self::Error>;

    /// Write a string.
    fn put_str(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;
}
