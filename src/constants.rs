use solana_sdk::{pubkey, pubkey::Pubkey};

/// Wrapped SOL mint.
pub const WSOL: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const TOKEN_2022_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");
pub const MEMO_PROGRAM_ID: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
pub const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_the_deployed_programs() {
        assert_eq!(WSOL, spl_token::native_mint::id());
        assert_eq!(TOKEN_PROGRAM_ID, spl_token::id());
        assert_eq!(TOKEN_2022_PROGRAM_ID, spl_token_2022::id());
        assert_eq!(MEMO_PROGRAM_ID, spl_memo::id());
        assert_eq!(ASSOCIATED_TOKEN_PROGRAM_ID, spl_associated_token_account::id());
        assert_eq!(SYSTEM_PROGRAM_ID, solana_sdk::system_program::id());
    }
}
