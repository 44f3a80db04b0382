//! Reward codes handed out on a successful claim.
//! Code format: <PREFIX>-<SEQ><DIGEST>, e.g. REWARD-1K3F9QZ, HARBOR-2A0B1C9
//!
//! `SEQ` is a per-device counter in base 36 and `DIGEST` six base-36 chars of
//! an HMAC over the step id and counter, so two codes from the same issuer
//! never collide and codes cannot be guessed from the counter alone.

use hmac::{Hmac, Mac};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::constants::{DEFAULT_REWARD_PREFIX, REWARD_TOKEN_DIGEST_CHARS};
use crate::model::{Reward, StepId, to_base36};

type HmacSha256 = Hmac<Sha256>;

const DIGEST_SPACE: u64 = 36_u64.pow(REWARD_TOKEN_DIGEST_CHARS as u32);

/// Persisted form of a [`RewardCodeIssuer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerState {
    pub secret: [u8; 32],
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardCodeIssuer {
    secret: [u8; 32],
    sequence: u64,
}

impl RewardCodeIssuer {
    /// Derive a fresh issuer secret from caller-supplied entropy.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut secret = [0_u8; 32];
        rng.fill_bytes(&mut secret);
        Self {
            secret,
            sequence: 0,
        }
    }

    #[must_use]
    pub const fn restore(state: IssuerState) -> Self {
        Self {
            secret: state.secret,
            sequence: state.sequence,
        }
    }

    #[must_use]
    pub const fn state(&self) -> IssuerState {
        IssuerState {
            secret: self.secret,
            sequence: self.sequence,
        }
    }

    /// Number of generated codes so far.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The code for a claim on `step_id`: the reward's fixed code when it has
    /// one, otherwise a freshly generated token.
    pub fn code_for(&mut self, step_id: &StepId, reward: &Reward) -> String {
        match reward.fixed_code() {
            Some(code) => code.to_string(),
            None => self.generate(step_id, reward.code_prefix.as_deref()),
        }
    }

    /// Generate a new token and advance the counter.
    pub fn generate(&mut self, step_id: &StepId, prefix: Option<&str>) -> String {
        self.sequence = self.sequence.wrapping_add(1);
        let prefix = prefix
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_REWARD_PREFIX);
        let digest = self.digest(step_id, self.sequence);
        format!(
            "{prefix}-{}{}",
            to_base36(self.sequence).to_ascii_uppercase(),
            digest
        )
    }

    fn digest(&self, step_id: &StepId, sequence: u64) -> String {
        // HMAC accepts keys of any length; the fallback key is never used.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| HmacSha256::new(&Default::default()));
        mac.update(step_id.as_str().as_bytes());
        mac.update(&[0x1F]);
        mac.update(&sequence.to_be_bytes());
        let bytes = mac.finalize().into_bytes();
        let mut head = [0_u8; 8];
        head.copy_from_slice(&bytes[..8]);
        let token = to_base36(u64::from_be_bytes(head) % DIGEST_SPACE).to_ascii_uppercase();
        format!("{token:0>width$}", width = REWARD_TOKEN_DIGEST_CHARS)
    }
}
