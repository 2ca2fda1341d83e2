//! Wallet identifiers for SDK servers

/// Wallet ID under which a user's wallet is loaded on an SDK server.
///
/// This names the wallet files stored on the SDK servers. Changing the
/// format requires renaming every stored wallet file.
pub fn wallet_id(user_id: i64) -> String {
    format!("lbrytv-id.{}.wallet", user_id)
}
