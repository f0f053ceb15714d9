use anyhow::Result;
use solana_sdk::pubkey::Pubkey;

use crate::error::RouteError;

/// Bounded little-endian cursor over a raw account image.
///
/// The on-chain layouts handled here are not borsh-shaped (in-struct padding,
/// half-skipped fields), so each codec walks the bytes explicitly. A single
/// length check up front covers every subsequent read.
#[derive(Debug)]
pub struct AccountCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AccountCursor<'a> {
    /// Wraps `data`, failing unless at least `expected` bytes are present.
    pub fn new(context: &'static str, data: &'a [u8], expected: usize) -> Result<Self> {
        if data.len() < expected {
            return Err(RouteError::Decode {
                context,
                expected,
                got: data.len(),
            }
            .into());
        }
        Ok(Self { data, pos: 0 })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    pub fn read_u8(&mut self) -> u8 {
        let v = self.data[self.pos];
        self.pos += 1;
        v
    }

    pub fn read_u16(&mut self) -> u16 {
        let v = u16::from_le_bytes(self.data[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        v
    }

    pub fn read_u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    pub fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    pub fn read_u64(&mut self) -> u64 {
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }

    pub fn read_i64(&mut self) -> i64 {
        self.read_u64() as i64
    }

    pub fn read_u128(&mut self) -> u128 {
        let v = u128::from_le_bytes(self.data[self.pos..self.pos + 16].try_into().unwrap());
        self.pos += 16;
        v
    }

    pub fn read_pubkey(&mut self) -> Pubkey {
        let v = Pubkey::new_from_array(self.data[self.pos..self.pos + 32].try_into().unwrap());
        self.pos += 32;
        v
    }
}

/// Reads the `u64` balance out of a standard token-account image
/// (bytes 64..72 of both spl-token and token-2022 accounts).
pub fn token_account_balance(context: &'static str, data: &[u8]) -> Result<u64> {
    let mut cur = AccountCursor::new(context, data, 72)?;
    cur.skip(64);
    Ok(cur.read_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_data() {
        let err = AccountCursor::new("test account", &[0u8; 10], 32).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RouteError>(),
            Some(&RouteError::Decode {
                context: "test account",
                expected: 32,
                got: 10
            })
        );
    }

    #[test]
    fn reads_little_endian_fields() {
        let mut data = vec![0u8; 32];
        data[0] = 7;
        data[8..16].copy_from_slice(&42u64.to_le_bytes());
        let mut cur = AccountCursor::new("test", &data, 32).unwrap();
        assert_eq!(cur.read_u64(), 7);
        assert_eq!(cur.read_u64(), 42);
        assert_eq!(cur.position(), 16);
    }

    #[test]
    fn token_balance_is_read_at_offset_64() {
        let mut data = vec![0u8; 165];
        data[64..72].copy_from_slice(&123_456u64.to_le_bytes());
        assert_eq!(token_account_balance("vault", &data).unwrap(), 123_456);
    }
}
