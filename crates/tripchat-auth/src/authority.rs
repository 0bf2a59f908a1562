use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use tripchat_types::api::{AccessClaims, InvitationClaims, RegisteredClaims};

use crate::error::{self, TokenError};

/// Bytes of entropy in a generated secret (256 bits).
pub const SECRET_BYTES: usize = 32;

/// Clock skew tolerated on `exp` and `nbf`, in seconds.
const LEEWAY_SECS: u64 = 5;

/// Produces the next signing secret on rotation.
pub type SecretGenerator = Arc<dyn Fn() -> Result<String, TokenError> + Send + Sync>;

/// Called with each newly installed secret so it can be stored externally.
pub type PersistHook = Arc<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;

/// Fresh URL-safe base64 secret from the OS RNG.
pub fn generate_secret() -> Result<String, TokenError> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TokenError::Entropy(e.to_string()))?;
    Ok(URL_SAFE.encode(bytes))
}

struct Secrets {
    current: String,
    previous: Option<String>,
    rotated_at: DateTime<Utc>,
}

/// Issues and validates HS256 tokens.
///
/// Validation takes the read lock only long enough to copy the secrets out;
/// [`TokenAuthority::rotate`] is the only writer.
pub struct TokenAuthority {
    secrets: RwLock<Secrets>,
    issuer: String,
    invitation_issuer: String,
    access_validation: Validation,
    invitation_validation: Validation,
    generator: SecretGenerator,
    persist: Option<PersistHook>,
}

fn validation_for(issuer: &str) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = LEEWAY_SECS;
    validation.validate_nbf = true;
    validation.set_issuer(&[issuer]);
    validation.set_required_spec_claims(&["exp", "iss"]);
    validation
}

impl TokenAuthority {
    pub fn new(secret: impl Into<String>, issuer: impl Into<String>) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::Misconfigured("signing secret is empty".into()));
        }
        let issuer = issuer.into();
        let invitation_issuer = format!("{issuer}-invitation");

        Ok(Self {
            secrets: RwLock::new(Secrets {
                current: secret,
                previous: None,
                rotated_at: Utc::now(),
            }),
            access_validation: validation_for(&issuer),
            invitation_validation: validation_for(&invitation_issuer),
            issuer,
            invitation_issuer,
            generator: Arc::new(generate_secret),
            persist: None,
        })
    }

    pub fn with_generator(mut self, generator: SecretGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_persist_hook(mut self, hook: PersistHook) -> Self {
        self.persist = Some(hook);
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn read(&self) -> RwLockReadGuard<'_, Secrets> {
        self.secrets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Secrets> {
        self.secrets.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_secret(&self) -> String {
        self.read().current.clone()
    }

    /// Current secret first, then the previous one if a rotation has happened.
    pub fn valid_secrets(&self) -> Vec<String> {
        let secrets = self.read();
        let mut valid = vec![secrets.current.clone()];
        if let Some(previous) = &secrets.previous {
            valid.push(previous.clone());
        }
        valid
    }

    pub fn last_rotation(&self) -> DateTime<Utc> {
        self.read().rotated_at
    }

    /// Install a fresh secret, demoting the current one to previous.
    ///
    /// A generator failure leaves the secrets untouched. A persist failure is
    /// reported after the new secret is already in use.
    pub fn rotate(&self) -> Result<(), TokenError> {
        let fresh = (self.generator)()?;
        if fresh.is_empty() {
            return Err(TokenError::Entropy("generator returned an empty secret".into()));
        }

        {
            let mut secrets = self.write();
            let demoted = std::mem::replace(&mut secrets.current, fresh.clone());
            secrets.previous = Some(demoted);
            secrets.rotated_at = Utc::now();
        }

        if let Some(persist) = &self.persist {
            persist(&fresh).map_err(|e| TokenError::Persist(format!("{e:#}")))?;
        }
        Ok(())
    }

    // -- Issuing --

    pub fn issue_access(
        &self,
        user_id: &str,
        email: Option<&str>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        if user_id.trim().is_empty() {
            return Err(TokenError::InvalidClaims("userID must not be empty".into()));
        }
        let claims = AccessClaims {
            user_id: user_id.to_string(),
            email: email.map(str::to_string),
            registered: registered(&self.issuer, user_id, ttl),
        };
        self.sign(&claims)
    }

    pub fn issue_invitation(
        &self,
        invitation_id: &str,
        trip_id: &str,
        invitee_email: Option<&str>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        if invitation_id.trim().is_empty() {
            return Err(TokenError::InvalidClaims("invitationID must not be empty".into()));
        }
        let claims = InvitationClaims {
            invitation_id: invitation_id.to_string(),
            trip_id: trip_id.to_string(),
            invitee_email: invitee_email.map(str::to_string),
            registered: registered(&self.invitation_issuer, invitation_id, ttl),
        };
        self.sign(&claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        let secret = self.current_secret();
        if secret.is_empty() {
            return Err(TokenError::Misconfigured("signing secret is empty".into()));
        }
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| TokenError::Misconfigured(format!("signing failed: {e}")))
    }

    // -- Validation --

    pub fn validate_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.verify(token, &self.access_validation)?;
        if claims.user_id.trim().is_empty() {
            return Err(TokenError::InvalidClaims("missing userID".into()));
        }
        Ok(claims)
    }

    pub fn validate_invitation(&self, token: &str) -> Result<InvitationClaims, TokenError> {
        let claims: InvitationClaims = self.verify(token, &self.invitation_validation)?;
        if claims.invitation_id.trim().is_empty() {
            return Err(TokenError::InvalidClaims("missing invitationID".into()));
        }
        Ok(claims)
    }

    /// Try each valid secret in turn. Only a signature mismatch moves on to
    /// the next secret; any other failure is final.
    fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<T, TokenError> {
        decode_header(token).map_err(|_| TokenError::Malformed)?;

        for secret in self.valid_secrets() {
            match decode::<T>(token, &DecodingKey::from_secret(secret.as_bytes()), validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => continue,
                Err(e) => {
                    debug!("token rejected: {}", e);
                    return Err(error::from_jwt(&e));
                }
            }
        }
        Err(TokenError::Signature)
    }
}

fn registered(issuer: &str, subject: &str, ttl: Duration) -> RegisteredClaims {
    let now = Utc::now().timestamp();
    RegisteredClaims {
        iss: issuer.to_string(),
        sub: subject.to_string(),
        iat: now,
        nbf: now,
        exp: now + ttl.num_seconds(),
        jti: Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    fn authority() -> TokenAuthority {
        TokenAuthority::new(SECRET, "tripchat").unwrap()
    }

    fn counting_generator() -> SecretGenerator {
        let n = Arc::new(AtomicUsize::new(1));
        Arc::new(move || -> Result<String, TokenError> {
            Ok(format!("rotated-secret-{}", n.fetch_add(1, Ordering::SeqCst)))
        })
    }

    #[derive(Serialize)]
    struct RawClaims {
        iss: &'static str,
        exp: i64,
        #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
        user_id: Option<&'static str>,
    }

    fn raw_token(secret: &str, claims: &RawClaims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn empty_secret_is_misconfigured() {
        assert!(matches!(
            TokenAuthority::new("", "tripchat"),
            Err(TokenError::Misconfigured(_))
        ));
    }

    #[test]
    fn access_token_round_trip() {
        let auth = authority();
        let token = auth
            .issue_access("user-1", Some("u1@example.com"), Duration::hours(1))
            .unwrap();

        let claims = auth.validate_access(&token).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.email.as_deref(), Some("u1@example.com"));
        assert_eq!(claims.registered.sub, "user-1");
        assert_eq!(claims.registered.iss, "tripchat");
        assert_eq!(claims.registered.exp - claims.registered.iat, 3600);
        assert!(!claims.token_id().is_empty());
    }

    #[test]
    fn each_token_gets_a_distinct_id() {
        let auth = authority();
        let a = auth.issue_access("user-1", None, Duration::hours(1)).unwrap();
        let b = auth.issue_access("user-1", None, Duration::hours(1)).unwrap();
        let (a, b) = (auth.validate_access(&a).unwrap(), auth.validate_access(&b).unwrap());
        assert_ne!(a.token_id(), b.token_id());
    }

    #[test]
    fn blank_user_is_not_issued() {
        assert!(matches!(
            authority().issue_access(" ", None, Duration::hours(1)),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = authority();
        let token = auth.issue_access("user-1", None, Duration::hours(-1)).unwrap();
        assert_eq!(auth.validate_access(&token), Err(TokenError::Expired));
    }

    #[rstest]
    #[case::empty("")]
    #[case::garbage("not-a-token")]
    #[case::bad_segments("a.b.c")]
    fn malformed_token_is_rejected(#[case] token: &str) {
        assert_eq!(authority().validate_access(token), Err(TokenError::Malformed));
    }

    #[test]
    fn foreign_secret_is_a_signature_error() {
        let other = TokenAuthority::new("some-other-secret", "tripchat").unwrap();
        let token = other.issue_access("user-1", None, Duration::hours(1)).unwrap();
        assert_eq!(authority().validate_access(&token), Err(TokenError::Signature));
    }

    #[test]
    fn missing_user_id_is_invalid_claims() {
        let token = raw_token(
            SECRET,
            &RawClaims {
                iss: "tripchat",
                exp: Utc::now().timestamp() + 600,
                user_id: None,
            },
        );
        assert!(matches!(
            authority().validate_access(&token),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn wrong_issuer_is_invalid_claims() {
        let token = raw_token(
            SECRET,
            &RawClaims {
                iss: "someone-else",
                exp: Utc::now().timestamp() + 600,
                user_id: Some("user-1"),
            },
        );
        assert!(matches!(
            authority().validate_access(&token),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn invitation_round_trip() {
        let auth = authority();
        let token = auth
            .issue_invitation("inv-1", "trip-1", Some("guest@example.com"), Duration::days(7))
            .unwrap();

        let claims = auth.validate_invitation(&token).unwrap();
        assert_eq!(claims.invitation_id, "inv-1");
        assert_eq!(claims.trip_id, "trip-1");
        assert_eq!(claims.invitee_email.as_deref(), Some("guest@example.com"));
        assert_eq!(claims.registered.iss, "tripchat-invitation");
    }

    #[test]
    fn token_kinds_do_not_cross_validate() {
        let auth = authority();
        let access = auth.issue_access("user-1", None, Duration::hours(1)).unwrap();
        let invite = auth
            .issue_invitation("inv-1", "trip-1", None, Duration::hours(1))
            .unwrap();

        assert!(matches!(
            auth.validate_invitation(&access),
            Err(TokenError::InvalidClaims(_))
        ));
        assert!(matches!(
            auth.validate_access(&invite),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn rotation_keeps_previous_secret_for_one_period() {
        let auth = authority().with_generator(counting_generator());
        let token = auth.issue_access("user-1", None, Duration::hours(1)).unwrap();

        auth.rotate().unwrap();
        assert_eq!(auth.valid_secrets(), vec!["rotated-secret-1".to_string(), SECRET.to_string()]);
        assert!(auth.validate_access(&token).is_ok());

        let fresh = auth.issue_access("user-2", None, Duration::hours(1)).unwrap();

        auth.rotate().unwrap();
        assert_eq!(auth.validate_access(&token), Err(TokenError::Signature));
        assert!(auth.validate_access(&fresh).is_ok());
    }

    #[test]
    fn generated_secrets_are_distinct_and_full_length() {
        let a = generate_secret().unwrap();
        let b = generate_secret().unwrap();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE.decode(&a).unwrap().len(), SECRET_BYTES);
    }

    #[test]
    fn entropy_failure_leaves_secrets_untouched() {
        let auth = authority()
            .with_generator(Arc::new(|| -> Result<String, TokenError> {
            Err(TokenError::Entropy("no entropy".into()))
        }));
        let before = auth.last_rotation();

        assert!(matches!(auth.rotate(), Err(TokenError::Entropy(_))));
        assert_eq!(auth.valid_secrets(), vec![SECRET.to_string()]);
        assert_eq!(auth.last_rotation(), before);
    }

    #[test]
    fn persist_failure_still_rotates() {
        let auth = authority()
            .with_generator(counting_generator())
            .with_persist_hook(Arc::new(|_: &str| -> anyhow::Result<()> { anyhow::bail!("vault offline") }));

        let err = auth.rotate().unwrap_err();
        assert!(matches!(err, TokenError::Persist(ref msg) if msg.contains("vault offline")));
        assert_eq!(auth.current_secret(), "rotated-secret-1");
    }

    #[test]
    fn persist_hook_receives_new_secret() {
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = seen.clone();
        let auth = authority()
            .with_generator(counting_generator())
            .with_persist_hook(Arc::new(move |secret: &str| -> anyhow::Result<()> {
                sink.write().unwrap().push(secret.to_string());
                Ok(())
            }));

        auth.rotate().unwrap();
        auth.rotate().unwrap();
        assert_eq!(
            *seen.read().unwrap(),
            vec!["rotated-secret-1".to_string(), "rotated-secret-2".to_string()]
        );
    }
}
