//! Authentication session rows and their portable string form.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::errors::StorageError;

/// Version written by this build.
pub const LATEST_VERSION: i32 = 1;

/// One persisted authentication session, keyed by phone.
///
/// `data` is opaque to the store; the client library owns its layout.
/// A row that was never written comes back with `id == 0` and empty `data`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub id:      i64,
    pub version: i32,
    pub phone:   String,
    pub data:    Vec<u8>,
}

impl Session {
    pub fn new(phone: impl Into<String>, data: Vec<u8>) -> Self {
        Self { id: 0, version: LATEST_VERSION, phone: phone.into(), data }
    }

    /// `true` when there is nothing to resume from.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Binary layout, little-endian:
    ///
    /// ```text
    /// i32 version | u16 phone_len | phone | u32 data_len | data
    /// ```
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let phone = self.phone.as_bytes();
        let phone_len = u16::try_from(phone.len())
            .map_err(|_| StorageError::InvalidSession("phone too long".into()))?;
        let data_len = u32::try_from(self.data.len())
            .map_err(|_| StorageError::InvalidSession("session data too large".into()))?;

        let mut b = Vec::with_capacity(10 + phone.len() + self.data.len());
        b.extend_from_slice(&self.version.to_le_bytes());
        b.extend_from_slice(&phone_len.to_le_bytes());
        b.extend_from_slice(phone);
        b.extend_from_slice(&data_len.to_le_bytes());
        b.extend_from_slice(&self.data);
        Ok(b)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, StorageError> {
        let mut r = Reader { buf, pos: 0 };
        let version = i32::from_le_bytes(r.array()?);
        if version <= 0 || version > LATEST_VERSION {
            return Err(StorageError::InvalidSession(format!("unsupported version {version}")));
        }
        let phone_len = u16::from_le_bytes(r.array()?) as usize;
        let phone = std::str::from_utf8(r.take(phone_len)?)
            .map_err(|_| StorageError::InvalidSession("phone is not UTF-8".into()))?
            .to_string();
        let data_len = u32::from_le_bytes(r.array()?) as usize;
        let data = r.take(data_len)?.to_vec();
        if r.pos != buf.len() {
            return Err(StorageError::InvalidSession("trailing bytes".into()));
        }
        Ok(Self { id: 0, version, phone, data })
    }

    /// Export as a base64 string that can be pasted into another process.
    pub fn encode_string(&self) -> Result<String, StorageError> {
        Ok(STANDARD.encode(self.to_bytes()?))
    }

    pub fn decode_string(s: &str) -> Result<Self, StorageError> {
        let raw = STANDARD
            .decode(s.trim())
            .map_err(|e| StorageError::InvalidSession(format!("base64: {e}")))?;
        Self::from_bytes(&raw)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], StorageError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len())
            .ok_or_else(|| StorageError::InvalidSession("truncated session".into()))?;
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StorageError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
