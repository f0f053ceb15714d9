use anyhow::Result;
use solana_sdk::sysvar;

use super::client::SolClient;
use crate::decode::AccountCursor;

const CLOCK_ACCOUNT_DATA_SIZE: usize = 40;

/// Snapshot of the network clock sysvar.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    pub slot: u64,
    pub epoch_start_timestamp: i64,
    pub epoch: u64,
    pub leader_schedule_epoch: u64,
    pub unix_timestamp: i64,
}

impl Clock {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("clock sysvar", data, CLOCK_ACCOUNT_DATA_SIZE)?;
        Ok(Self {
            slot: cur.read_u64(),
            epoch_start_timestamp: cur.read_i64(),
            epoch: cur.read_u64(),
            leader_schedule_epoch: cur.read_u64(),
            unix_timestamp: cur.read_i64(),
        })
    }
}

impl SolClient {
    pub async fn get_clock(&self) -> Result<Clock> {
        let account = self.get_account(&sysvar::clock::id()).await?;
        Clock::decode(&account.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_all_clock_fields() {
        let mut data = vec![0u8; 40];
        data[0..8].copy_from_slice(&123u64.to_le_bytes());
        data[32..40].copy_from_slice(&1_700_000_000i64.to_le_bytes());
        let clock = Clock::decode(&data).unwrap();
        assert_eq!(clock.slot, 123);
        assert_eq!(clock.unix_timestamp, 1_700_000_000);
    }

    #[test]
    fn rejects_truncated_clock_data() {
        assert!(Clock::decode(&[0u8; 39]).is_err());
    }
}
