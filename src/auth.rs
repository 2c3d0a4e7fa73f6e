/// Authentication extractor and token utilities
use crate::{
    context::AppContext,
    error::ModerationError,
    moderation::{Actor, Role},
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};

/// Claims carried by a desk access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Member id
    pub sub: String,
    pub role: String,
    pub exp: i64,
}

/// Authenticated actor for the current request
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub actor: Actor,
}

#[async_trait]
impl FromRequestParts<AppContext> for ActorContext {
    type Rejection = ModerationError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            ModerationError::Authentication("Missing authorization header".to_string())
        })?;

        let claims = verify_jwt_token(&token, &state.config.authentication.jwt_secret)?;

        if claims.sub.trim().is_empty() {
            return Err(ModerationError::Authentication(
                "Invalid token: empty 'sub' claim".to_string(),
            ));
        }

        // Configured administrators keep their role whatever the token says
        let role = if state.config.authentication.admin_ids.contains(&claims.sub) {
            Role::Administrator
        } else {
            Role::from_str(&claims.role).map_err(|_| {
                ModerationError::Authentication(format!("Invalid token role: {}", claims.role))
            })?
        };

        tracing::debug!(actor = %claims.sub, role = role.as_str(), "request authenticated");

        Ok(ActorContext {
            actor: Actor::new(claims.sub, role),
        })
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Verify an HS256 token and decode its claims
///
/// This performs:
/// 1. JWT signature verification
/// 2. Expiration checking
/// 3. Claims validation
pub fn verify_jwt_token(token: &str, jwt_secret: &str) -> Result<Claims, ModerationError> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (5 minutes)
    validation.leeway = 300;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!("JWT verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ModerationError::Authentication("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ModerationError::Authentication("Invalid token signature".to_string())
                }
                _ => ModerationError::Authentication(format!("Invalid token: {}", e)),
            }
        })
}

/// Mint a token for `actor`, valid for `ttl_secs`
pub fn issue_token(actor: &Actor, jwt_secret: &str, ttl_secs: i64) -> Result<String, ModerationError> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: actor.id.clone(),
        role: actor.role.as_str().to_string(),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| ModerationError::Internal(format!("Failed to sign token: {}", e)))
}
