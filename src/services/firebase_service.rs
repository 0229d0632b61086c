// ==================== EXTERNAL AUTH PROVIDER ====================
// Firebase Auth (Google Identity Toolkit) client: bearer ID-token
// verification plus identity mirroring. Mirroring is best-effort:
// failures are logged and never surfaced to the caller.

use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const DEFAULT_KEY_TTL_SECS: i64 = 3600;

// Google rotates the securetoken signing keys; cache them in-process
// until the Cache-Control max-age elapses.
lazy_static::lazy_static! {
    static ref KEY_CACHE: RwLock<KeyCache> = RwLock::new(KeyCache::default());
}

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, Jwk>,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize, Clone)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

/// Claims of a verified Firebase ID token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdTokenClaims {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub iat: usize,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<ProviderUser>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderUser {
    #[serde(rename = "localId")]
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(rename = "localId")]
    local_id: String,
}

#[derive(Clone)]
pub struct FirebaseAuth {
    project_id: String,
    api_key: String,
    http: reqwest::Client,
}

impl FirebaseAuth {
    pub fn new(project_id: &str, api_key: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Result<Self, String> {
        let project_id = std::env::var("FIREBASE_PROJECT_ID")
            .map_err(|_| "FIREBASE_PROJECT_ID must be set".to_string())?;
        let api_key = std::env::var("FIREBASE_WEB_API_KEY")
            .map_err(|_| "FIREBASE_WEB_API_KEY must be set".to_string())?;
        Ok(Self::new(&project_id, &api_key))
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            IDENTITY_TOOLKIT_BASE, action, self.api_key
        )
    }

    // ==================== TOKEN VERIFICATION ====================

    async fn signing_key(&self, kid: &str) -> Result<Jwk, String> {
        let now = Utc::now().timestamp();

        {
            let cache = KEY_CACHE
                .read()
                .map_err(|_| "Signing key cache poisoned".to_string())?;
            if cache.expires_at > now {
                if let Some(key) = cache.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
        }

        log::info!("🔑 Refreshing securetoken signing keys");

        let response = self
            .http
            .get(SECURETOKEN_JWKS_URL)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| format!("Failed to fetch signing keys: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Signing key endpoint error: {}", response.status()));
        }

        let max_age = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_KEY_TTL_SECS);

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse signing keys: {}", e))?;

        let mut cache = KEY_CACHE
            .write()
            .map_err(|_| "Signing key cache poisoned".to_string())?;
        cache.keys = jwks.keys.into_iter().map(|k| (k.kid.clone(), k)).collect();
        cache.expires_at = now + max_age;

        cache
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| "Unknown signing key id".to_string())
    }

    /// Verifies a Firebase ID token locally (RS256 against Google's
    /// securetoken keys) and returns its claims.
    pub async fn verify_id_token(&self, token: &str) -> Result<IdTokenClaims, String> {
        let header = decode_header(token).map_err(|e| format!("Invalid token: {}", e))?;
        let kid = header
            .kid
            .ok_or_else(|| "Token has no key id".to_string())?;

        let jwk = self.signing_key(&kid).await?;
        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| format!("Invalid signing key: {}", e))?;

        let validation = self.id_token_validation();

        decode::<IdTokenClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| format!("Invalid token: {}", e))
    }

    fn id_token_validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.clone()]);

        let mut issuers = HashSet::new();
        issuers.insert(format!("https://securetoken.google.com/{}", self.project_id));
        validation.iss = Some(issuers);

        validation
    }

    // ==================== IDENTITY LIFECYCLE ====================

    pub async fn lookup_by_email(&self, email: &str) -> Result<Option<ProviderUser>, String> {
        let response = self
            .http
            .post(self.endpoint("lookup"))
            .json(&serde_json::json!({ "email": [email] }))
            .send()
            .await
            .map_err(|e| format!("Failed to reach auth provider: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Auth provider error: {}", response.status()));
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse provider response: {}", e))?;

        Ok(lookup.users.into_iter().next())
    }

    pub async fn create_identity(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<String, String> {
        let response = self
            .http
            .post(self.endpoint("signUp"))
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "displayName": display_name,
                "returnSecureToken": false,
            }))
            .send()
            .await
            .map_err(|e| format!("Failed to reach auth provider: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Auth provider error: {}", response.status()));
        }

        let created: SignUpResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse provider response: {}", e))?;

        Ok(created.local_id)
    }

    pub async fn update_identity(
        &self,
        local_id: &str,
        email: &str,
        display_name: &str,
    ) -> Result<(), String> {
        let response = self
            .http
            .post(self.endpoint("update"))
            .json(&serde_json::json!({
                "localId": local_id,
                "email": email,
                "displayName": display_name,
            }))
            .send()
            .await
            .map_err(|e| format!("Failed to reach auth provider: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Auth provider error: {}", response.status()));
        }

        Ok(())
    }

    pub async fn delete_identity(&self, local_id: &str) -> Result<(), String> {
        let response = self
            .http
            .post(self.endpoint("delete"))
            .json(&serde_json::json!({ "localId": local_id }))
            .send()
            .await
            .map_err(|e| format!("Failed to reach auth provider: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Auth provider error: {}", response.status()));
        }

        Ok(())
    }

    // ==================== FIRE-AND-FORGET MIRRORING ====================
    // The local write never waits on, or rolls back for, the provider.

    pub fn mirror_create(&self, email: String, password: String, display_name: String) {
        let auth = self.clone();
        tokio::spawn(async move {
            match auth.create_identity(&email, &password, &display_name).await {
                Ok(uid) => log::info!("✅ Provider identity {} created for {}", uid, email),
                Err(e) => log::error!("❌ Failed to create provider identity for {}: {}", email, e),
            }
        });
    }

    pub fn mirror_update(&self, current_email: String, new_email: String, display_name: String) {
        let auth = self.clone();
        tokio::spawn(async move {
            let result: Result<(), String> = async {
                let user = auth
                    .lookup_by_email(&current_email)
                    .await?
                    .ok_or_else(|| format!("No provider identity for {}", current_email))?;
                auth.update_identity(&user.local_id, &new_email, &display_name)
                    .await
            }
            .await;

            match result {
                Ok(()) => log::info!("✅ Provider identity updated for {}", current_email),
                Err(e) => log::error!(
                    "❌ Failed to update provider identity for {}: {}",
                    current_email,
                    e
                ),
            }
        });
    }

    pub fn mirror_delete(&self, email: String) {
        let auth = self.clone();
        tokio::spawn(async move {
            let result: Result<(), String> = async {
                let user = auth
                    .lookup_by_email(&email)
                    .await?
                    .ok_or_else(|| format!("No provider identity for {}", email))?;
                auth.delete_identity(&user.local_id).await
            }
            .await;

            match result {
                Ok(()) => log::info!("✅ Provider identity deleted for {}", email),
                Err(e) => log::error!("❌ Failed to delete provider identity for {}: {}", email, e),
            }
        });
    }
}

fn parse_max_age(value: &str) -> Option<i64> {
    value
        .split(',')
        .find_map(|directive| directive.trim().strip_prefix("max-age=")?.parse().ok())
}
