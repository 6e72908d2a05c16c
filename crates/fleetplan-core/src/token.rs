//! Approval-token primitives.
//!
//! A token authorizes execution of exactly one plan. The tag is an
//! HMAC-SHA256 over {plan id, issued-at, expiry} under a server-held secret;
//! verification compares tags in constant time. Single-use enforcement lives
//! in the approval gate, which tracks consumed tags.

use crate::error::FleetError;
use crate::types::{PlanId, unix_now};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_TAG_LEN: usize = 32;
/// plan id (16) + issued-at (8) + expires-at (8) + tag (32)
const TOKEN_WIRE_LEN: usize = 16 + 8 + 8 + TOKEN_TAG_LEN;

/// A short-lived, single-use credential authorizing execution of one plan.
///
/// Opaque to callers; use [`ApprovalToken::encode`] for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalToken {
    pub plan_id: PlanId,
    pub issued_at: u64,
    pub expires_at: u64,
    pub tag: [u8; TOKEN_TAG_LEN],
}

impl ApprovalToken {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Hex wire form handed to the operator.
    pub fn encode(&self) -> String {
        let mut buf = Vec::with_capacity(TOKEN_WIRE_LEN);
        buf.extend_from_slice(self.plan_id.0.as_bytes());
        buf.extend_from_slice(&self.issued_at.to_le_bytes());
        buf.extend_from_slice(&self.expires_at.to_le_bytes());
        buf.extend_from_slice(&self.tag);
        hex::encode(buf)
    }

    pub fn decode(encoded: &str) -> Result<Self, FleetError> {
        let bytes = hex::decode(encoded)
            .map_err(|_| FleetError::forbidden("malformed approval token"))?;
        if bytes.len() != TOKEN_WIRE_LEN {
            return Err(FleetError::forbidden("malformed approval token"));
        }
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&bytes[..16]);
        let mut issued = [0u8; 8];
        issued.copy_from_slice(&bytes[16..24]);
        let mut expires = [0u8; 8];
        expires.copy_from_slice(&bytes[24..32]);
        let mut tag = [0u8; TOKEN_TAG_LEN];
        tag.copy_from_slice(&bytes[32..]);
        Ok(Self {
            plan_id: PlanId(Uuid::from_bytes(uuid_bytes)),
            issued_at: u64::from_le_bytes(issued),
            expires_at: u64::from_le_bytes(expires),
            tag,
        })
    }
}

/// Server-held signing secret. Never serialized, never logged.
#[derive(Clone)]
pub struct TokenSecret(Vec<u8>);

impl TokenSecret {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Signs {plan id, issued-at, expiry} and issues the token.
    pub fn sign(&self, plan_id: PlanId, ttl_secs: u64) -> ApprovalToken {
        let issued_at = unix_now();
        let expires_at = issued_at + ttl_secs;
        self.sign_at(plan_id, issued_at, expires_at)
    }

    pub fn sign_at(&self, plan_id: PlanId, issued_at: u64, expires_at: u64) -> ApprovalToken {
        let tag = self.tag_for(plan_id, issued_at, expires_at);
        ApprovalToken {
            plan_id,
            issued_at,
            expires_at,
            tag,
        }
    }

    /// Constant-time tag verification. Says nothing about expiry or
    /// consumption; the gate layers those checks on top.
    pub fn verify(&self, token: &ApprovalToken) -> bool {
        let expected = self.tag_for(token.plan_id, token.issued_at, token.expires_at);
        expected.as_slice().ct_eq(token.tag.as_slice()).into()
    }

    fn tag_for(&self, plan_id: PlanId, issued_at: u64, expires_at: u64) -> [u8; TOKEN_TAG_LEN] {
        let mut mac =
            HmacSha256::new_from_slice(&self.0).expect("HMAC accepts keys of any length");
        mac.update(plan_id.0.as_bytes());
        mac.update(&issued_at.to_le_bytes());
        mac.update(&expires_at.to_le_bytes());
        mac.finalize().into_bytes().into()
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSecret(<redacted>)")
    }
}
