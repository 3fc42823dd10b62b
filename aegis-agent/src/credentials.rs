use std::path::Path;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// No OS keyring in this port — credentials live in an encrypted file keyed
/// off the agent's own id, the way the original falls back when a keyring
/// isn't available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub server_url: String,
    pub agent_id: String,
    pub registered: bool,
}

const PBKDF2_ITERATIONS: u32 = 480_000;

fn derive_key(agent_id: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(agent_id.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn creds_path(base_dir: &Path) -> std::path::PathBuf {
    base_dir.join("agent.credentials")
}

pub fn store_credentials(base_dir: &Path, agent_id: &str, creds: &Credentials) -> anyhow::Result<()> {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(agent_id, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key)?;

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = serde_json::to_vec(creds)?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .map_err(|e| anyhow::anyhow!("credential encryption failed: {e}"))?;

    let mut out = Vec::with_capacity(16 + 12 + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);

    std::fs::create_dir_all(base_dir)?;
    std::fs::write(creds_path(base_dir), out)?;
    Ok(())
}

pub fn load_credentials(base_dir: &Path, agent_id: &str) -> Option<Credentials> {
    let data = std::fs::read(creds_path(base_dir)).ok()?;
    if data.len() < 28 {
        return None;
    }
    let salt = &data[0..16];
    let nonce_bytes = &data[16..28];
    let ciphertext = &data[28..];

    let key = derive_key(agent_id, salt);
    let cipher = Aes256Gcm::new_from_slice(&key).ok()?;
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher.decrypt(nonce, ciphertext).ok()?;

    serde_json::from_slice(&plaintext).ok()
}

pub fn is_registered(base_dir: &Path, agent_id: &str) -> bool {
    load_credentials(base_dir, agent_id)
        .map(|c| c.registered)
        .unwrap_or(false)
}
