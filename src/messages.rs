use base64::Engine as _;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::binary::Jid;

pub struct MessageUtils;

impl MessageUtils {
    /// Append the randomized v2 padding the protocol applies before
    /// encryption: 1–15 bytes, each carrying the pad length.
    pub fn pad_message_v2(mut plaintext: Vec<u8>) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let mut pad_val = rng.gen::<u8>() & 0x0F;
        if pad_val == 0 {
            pad_val = 0x0F;
        }
        plaintext.extend(std::iter::repeat(pad_val).take(pad_val as usize));
        plaintext
    }

    pub fn unpad_message(plaintext: &[u8]) -> Result<&[u8], anyhow::Error> {
        if plaintext.is_empty() {
            return Err(anyhow::anyhow!("plaintext is empty, cannot unpad"));
        }
        let pad_len = plaintext[plaintext.len() - 1] as usize;
        if pad_len == 0 || pad_len > plaintext.len() {
            return Err(anyhow::anyhow!("invalid padding length: {pad_len}"));
        }
        let (data, padding) = plaintext.split_at(plaintext.len() - pad_len);
        if padding.iter().any(|&b| b != pad_len as u8) {
            return Err(anyhow::anyhow!("invalid padding bytes"));
        }
        Ok(data)
    }

    /// The `phash` fan-out integrity attribute: sorted device-qualified JIDs,
    /// SHA-256, first six bytes, base64url, versioned `2:` prefix.
    pub fn participant_list_hash(devices: &[Jid]) -> String {
        let mut jids: Vec<String> = devices.iter().map(|j| j.to_ad_string()).collect();
        jids.sort();

        let mut hasher = Sha256::new();
        for jid in &jids {
            hasher.update(jid.as_bytes());
        }
        let full_hash = hasher.finalize();

        format!(
            "2:{}",
            base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(&full_hash[..6])
        )
    }
}
