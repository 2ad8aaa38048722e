//! Pre-protocol authentication handshake.
//!
//! Before the first message frame, a client may write a single length-prefixed
//! credential string of the form `Key=Value;Key=Value;...`. Recognized keys are
//! `Username`, `Password`, `Token`, `Impersonating`, `ForwardedFor` and
//! `Application`. Authenticators only produce bytes; the client writes and
//! flushes them on the raw stream before the run loop starts.

use std::fmt;

use bytes::BytesMut;

use crate::core::wire::WireWriter;
use crate::error::{constants, ProtocolError, Result};

/// Writes the handshake payload for one connection.
pub trait Authenticator: Send + Sync {
    /// Append the handshake bytes to `dst`. Writing nothing is valid.
    fn write_handshake(&self, dst: &mut BytesMut) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Ordered `Key=Value;...` credential string.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: Vec<(&'static str, String)>,
}

impl ConnectionString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.pairs.push((key, value.into()));
        self
    }

    pub fn with_optional(self, key: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Append the string as a length-prefixed wire string.
    pub fn write_to(&self, dst: &mut BytesMut) -> Result<()> {
        WireWriter::new(dst).put_string(&self.to_string())
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

// Keep secrets out of debug output.
impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.pairs.iter().map(|(key, _)| *key).collect();
        f.debug_struct("ConnectionString").field("keys", &keys).finish()
    }
}

/// Proxy and application details any credential may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delegation {
    pub impersonating: Option<String>,
    pub forwarded_for: Option<String>,
    pub application: Option<String>,
}

impl Delegation {
    fn append_to(&self, connection_string: ConnectionString) -> ConnectionString {
        connection_string
            .with_optional("Impersonating", self.impersonating.as_deref())
            .with_optional("ForwardedFor", self.forwarded_for.as_deref())
            .with_optional("Application", self.application.as_deref())
    }
}

/// Writes nothing; for distributors that accept anonymous clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuthenticator;

impl Authenticator for NullAuthenticator {
    fn write_handshake(&self, _dst: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Username/password credentials.
#[derive(Clone)]
pub struct BasicAuthenticator {
    username: String,
    password: String,
    delegation: Delegation,
}

impl BasicAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        if username.is_empty() {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_EMPTY_CREDENTIAL.to_string(),
            ));
        }
        Ok(Self {
            username,
            password: password.into(),
            delegation: Delegation::default(),
        })
    }

    pub fn with_delegation(mut self, delegation: Delegation) -> Self {
        self.delegation = delegation;
        self
    }

    pub fn impersonating(mut self, user: impl Into<String>) -> Self {
        self.delegation.impersonating = Some(user.into());
        self
    }

    pub fn forwarded_for(mut self, host: impl Into<String>) -> Self {
        self.delegation.forwarded_for = Some(host.into());
        self
    }

    pub fn application(mut self, name: impl Into<String>) -> Self {
        self.delegation.application = Some(name.into());
        self
    }

    pub fn connection_string(&self) -> ConnectionString {
        self.delegation.append_to(
            ConnectionString::new()
                .with("Username", &self.username)
                .with("Password", &self.password),
        )
    }
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("username", &self.username)
            .field("delegation", &self.delegation)
            .finish_non_exhaustive()
    }
}

impl Authenticator for BasicAuthenticator {
    fn write_handshake(&self, dst: &mut BytesMut) -> Result<()> {
        self.connection_string().write_to(dst)
    }

    fn name(&self) -> &'static str {
        "basic"
    }
}

/// Bearer token credentials.
#[derive(Clone)]
pub struct TokenAuthenticator {
    token: String,
    delegation: Delegation,
}

impl TokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_EMPTY_CREDENTIAL.to_string(),
            ));
        }
        Ok(Self {
            token,
            delegation: Delegation::default(),
        })
    }

    pub fn with_delegation(mut self, delegation: Delegation) -> Self {
        self.delegation = delegation;
        self
    }

    pub fn connection_string(&self) -> ConnectionString {
        self.delegation
            .append_to(ConnectionString::new().with("Token", &self.token))
    }
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("delegation", &self.delegation)
            .finish_non_exhaustive()
    }
}

impl Authenticator for TokenAuthenticator {
    fn write_handshake(&self, dst: &mut BytesMut) -> Result<()> {
        self.connection_string().write_to(dst)
    }

    fn name(&self) -> &'static str {
        "token"
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::core::wire::WireReader;

    fn handshake_bytes(auth: &dyn Authenticator) -> BytesMut {
        let mut buf = BytesMut::new();
        auth.write_handshake(&mut buf).unwrap();
        buf
    }

    #[test]
    fn basic_writes_length_prefixed_credentials() {
        let auth = BasicAuthenticator::new("tom", "tomsPassword").unwrap();
        let buf = handshake_bytes(&auth);

        let expected = "Username=tom;Password=tomsPassword";
        assert_eq!(&buf[..4], &(expected.len() as i32).to_be_bytes());
        assert_eq!(&buf[4..], expected.as_bytes());
    }

    #[test]
    fn delegation_keys_follow_in_order() {
        let auth = BasicAuthenticator::new("proxy", "secret")
            .unwrap()
            .impersonating("alice")
            .forwarded_for("desk-7")
            .application("pricer");
        let text = WireReader::new(&handshake_bytes(&auth)).read_string().unwrap();
        assert_eq!(
            text,
            "Username=proxy;Password=secret;Impersonating=alice;ForwardedFor=desk-7;Application=pricer"
        );
    }

    #[test]
    fn token_skips_missing_delegation_keys() {
        let auth = TokenAuthenticator::new("abc.def").unwrap().with_delegation(Delegation {
            application: Some("feeds".into()),
            ..Delegation::default()
        });
        let text = WireReader::new(&handshake_bytes(&auth)).read_string().unwrap();
        assert_eq!(text, "Token=abc.def;Application=feeds");
    }

    #[test]
    fn null_writes_nothing() {
        assert!(handshake_bytes(&NullAuthenticator).is_empty());
    }

    #[test]
    fn empty_credentials_are_rejected() {
        assert!(BasicAuthenticator::new("", "pw").is_err());
        assert!(TokenAuthenticator::new("").is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let auth = BasicAuthenticator::new("tom", "tomsPassword").unwrap();
        assert!(!format!("{auth:?}").contains("tomsPassword"));
        assert!(!format!("{:?}", auth.connection_string()).contains("tomsPassword"));
    }
}
