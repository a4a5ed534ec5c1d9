//! Supabase signing keys
//!
//! The whole key set is fetched at once and replaced on refresh, so rotated
//! keys drop out. An unknown `kid` triggers a refetch, throttled to one per
//! second.

use anyhow::{bail, Context, Result};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Claims;

/// Signature algorithms Supabase issues asymmetric tokens with
const ACCEPTED_ALGORITHMS: [Algorithm; 2] = [Algorithm::RS256, Algorithm::ES256];

const MIN_REFRESH_GAP: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct VerifyingKey {
    key: DecodingKey,
    algorithm: Algorithm,
}

#[derive(Default)]
struct KeyRing {
    keys: HashMap<String, VerifyingKey>,
    fetched_at: Option<Instant>,
}

impl KeyRing {
    fn fresh_key(&self, kid: &str, ttl: Duration) -> Option<VerifyingKey> {
        let fetched_at = self.fetched_at?;
        if fetched_at.elapsed() >= ttl {
            return None;
        }
        self.keys.get(kid).cloned()
    }

    fn fetched_recently(&self) -> bool {
        self.fetched_at
            .map_or(false, |at| at.elapsed() < MIN_REFRESH_GAP)
    }
}

/// Algorithm a published key verifies, if it is one we accept
fn signing_algorithm(jwk: &jsonwebtoken::jwk::Jwk) -> Option<Algorithm> {
    match (&jwk.common.key_algorithm, &jwk.algorithm) {
        (Some(KeyAlgorithm::RS256), AlgorithmParameters::RSA(_))
        | (None, AlgorithmParameters::RSA(_)) => Some(Algorithm::RS256),
        (Some(KeyAlgorithm::ES256), AlgorithmParameters::EllipticCurve(p))
        | (None, AlgorithmParameters::EllipticCurve(p))
            if p.curve == EllipticCurve::P256 =>
        {
            Some(Algorithm::ES256)
        }
        _ => None,
    }
}

/// Usable keys from a published set; keys without a `kid` are skipped
fn keys_from_set(set: JwkSet) -> HashMap<String, VerifyingKey> {
    let mut keys = HashMap::new();
    for jwk in set.keys {
        let Some(kid) = jwk.common.key_id.clone() else {
            continue;
        };
        let Some(algorithm) = signing_algorithm(&jwk) else {
            tracing::debug!(kid = %kid, "Skipping JWK with unsupported algorithm");
            continue;
        };
        match DecodingKey::from_jwk(&jwk) {
            Ok(key) => {
                keys.insert(kid, VerifyingKey { key, algorithm });
            }
            Err(e) => tracing::warn!(kid = %kid, error = %e, "Failed to parse JWK"),
        }
    }
    keys
}

/// Verifies bearer tokens against the project's published JWKS
#[derive(Clone)]
pub struct JwksCache {
    ring: Arc<RwLock<KeyRing>>,
    http: reqwest::Client,
    jwks_url: String,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwksCache {
    pub fn new(
        http: reqwest::Client,
        jwks_url: String,
        issuer: String,
        audience: String,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            ring: Arc::new(RwLock::new(KeyRing::default())),
            http,
            jwks_url,
            issuer,
            audience,
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Check signature, issuer, audience and lifetime; return the claims
    pub async fn verify_token(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).context("Invalid JWT header")?;
        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            bail!("Unsupported JWT algorithm {:?}", header.alg);
        }
        let kid = header.kid.context("JWT missing kid header")?;

        let key = self.key_for(&kid).await?;
        if key.algorithm != header.alg {
            bail!("JWT algorithm {:?} does not match key {kid}", header.alg);
        }

        let mut validation = Validation::new(key.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_nbf = true;

        let data =
            decode::<Claims>(token, &key.key, &validation).context("JWT validation failed")?;
        Ok(data.claims)
    }

    async fn key_for(&self, kid: &str) -> Result<VerifyingKey> {
        let cached = self.ring.read().fresh_key(kid, self.ttl);
        if let Some(key) = cached {
            return Ok(key);
        }

        self.refresh().await?;

        self.ring
            .read()
            .keys
            .get(kid)
            .cloned()
            .with_context(|| format!("Signing key {kid} not found in JWKS"))
    }

    async fn refresh(&self) -> Result<()> {
        let throttled = self.ring.read().fetched_recently();
        if throttled {
            return Ok(());
        }

        tracing::debug!(url = %self.jwks_url, "Fetching JWKS");
        let response = self
            .http
            .get(&self.jwks_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("Failed to fetch JWKS")?;
        if !response.status().is_success() {
            bail!("JWKS fetch failed with status: {}", response.status());
        }
        let set: JwkSet = response.json().await.context("Failed to parse JWKS")?;

        let keys = keys_from_set(set);
        let count = keys.len();
        {
            let mut ring = self.ring.write();
            ring.keys = keys;
            ring.fetched_at = Some(Instant::now());
        }

        tracing::info!(keys = count, "JWKS refreshed");
        Ok(())
    }

    /// Fetch keys ahead of the first request
    pub async fn warm_cache(&self) -> Result<()> {
        self.refresh().await
    }
}
