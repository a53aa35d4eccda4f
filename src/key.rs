//! Fixed-width key and record value types (module A).
//!
//! A key is a 16-byte NUL-padded short string. Ordering is
//! length-then-lexicographic: shorter (NUL-trimmed) strings sort before
//! longer ones, and equal-length keys compare byte-for-byte. This is the
//! same comparator as the original C++ `keycmp`, and it is load-bearing —
//! substituting plain byte-lexicographic order silently reorders separators
//! and corrupts the tree.

use std::cmp::Ordering;
use std::fmt;

/// Width of a stored key, in bytes.
pub const KEY_SIZE: usize = 16;

/// Width of [`Value::name`] and [`Value::email`], in bytes.
pub const VALUE_TEXT_SIZE: usize = 256;

/// A fixed 16-byte, NUL-padded key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Key(pub [u8; KEY_SIZE]);

impl Key {
    /// Builds a key from a string, truncating to `KEY_SIZE - 1` bytes and
    /// NUL-padding the remainder (mirrors `key_t(const char *str)`).
    pub fn new(s: &str) -> Self {
        let mut buf = [0u8; KEY_SIZE];
        let bytes = s.as_bytes();
        let len = bytes.len().min(KEY_SIZE - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Key(buf)
    }

    /// The NUL-trimmed byte content of the key.
    pub fn trimmed(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        &self.0[..len]
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.trimmed())
    }
}

impl Default for Key {
    fn default() -> Self {
        Key([0u8; KEY_SIZE])
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.trimmed();
        let b = other.trimmed();
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fixed-layout record value: name, age, email.
///
/// The core treats this as blittable payload — it never inspects field
/// contents, only copies the whole 516-byte record.
#[derive(Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Value {
    pub name: [u8; VALUE_TEXT_SIZE],
    pub age: i32,
    pub email: [u8; VALUE_TEXT_SIZE],
}

/// On-disk width of a [`Value`].
pub const VALUE_SIZE: usize = VALUE_TEXT_SIZE + std::mem::size_of::<i32>() + VALUE_TEXT_SIZE;

impl Value {
    pub fn new(name: &str, age: i32, email: &str) -> Self {
        let mut v = Value {
            name: [0u8; VALUE_TEXT_SIZE],
            age,
            email: [0u8; VALUE_TEXT_SIZE],
        };
        v.set_name(name);
        v.set_email(email);
        v
    }

    pub fn set_name(&mut self, name: &str) {
        copy_text(&mut self.name, name);
    }

    pub fn set_email(&mut self, email: &str) {
        copy_text(&mut self.email, email);
    }

    pub fn name_str(&self) -> std::borrow::Cow<'_, str> {
        text_str(&self.name)
    }

    pub fn email_str(&self) -> std::borrow::Cow<'_, str> {
        text_str(&self.email)
    }

    pub(crate) fn to_bytes(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), VALUE_SIZE);
        out[..VALUE_TEXT_SIZE].copy_from_slice(&self.name);
        out[VALUE_TEXT_SIZE..VALUE_TEXT_SIZE + 4].copy_from_slice(&self.age.to_le_bytes());
        out[VALUE_TEXT_SIZE + 4..].copy_from_slice(&self.email);
    }

    pub(crate) fn from_bytes(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), VALUE_SIZE);
        let mut name = [0u8; VALUE_TEXT_SIZE];
        name.copy_from_slice(&buf[..VALUE_TEXT_SIZE]);
        let mut age_bytes = [0u8; 4];
        age_bytes.copy_from_slice(&buf[VALUE_TEXT_SIZE..VALUE_TEXT_SIZE + 4]);
        let age = i32::from_le_bytes(age_bytes);
        let mut email = [0u8; VALUE_TEXT_SIZE];
        email.copy_from_slice(&buf[VALUE_TEXT_SIZE + 4..]);
        Value { name, age, email }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value {
            name: [0u8; VALUE_TEXT_SIZE],
            age: 0,
            email: [0u8; VALUE_TEXT_SIZE],
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("name", &self.name_str())
            .field("age", &self.age)
            .field("email", &self.email_str())
            .finish()
    }
}

fn copy_text(dst: &mut [u8], src: &str) {
    for b in dst.iter_mut() {
        *b = 0;
    }
    let bytes = src.as_bytes();
    let len = bytes.len().min(dst.len());
    dst[..len].copy_from_slice(&bytes[..len]);
}

fn text_str(buf: &[u8]) -> std::borrow::Cow<'_, str> {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len])
}
