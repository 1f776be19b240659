use std::{
    collections::BTreeSet,
    convert::TryInto,
    fmt,
    str::FromStr,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl FromStr for ClientId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of client registration. Usually `confidential` or `public`, but any
/// non-empty value fitting the column is accepted.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct ClientType(pub String);

impl ClientType {
    pub fn confidential() -> Self {
        Self("confidential".to_string())
    }

    pub fn public() -> Self {
        Self("public".to_string())
    }
}

impl FromStr for ClientType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(pub String);

impl FromStr for ConcurrencyToken {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct RedirectUri(pub String);

impl FromStr for RedirectUri {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(pub String);

impl AsRef<str> for ClientSecret {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HashedClientSecret(pub String);

impl From<String> for HashedClientSecret {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for HashedClientSecret {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Raw reference identifier handed to clients in place of a token payload.
#[derive(Debug)]
pub struct ReferenceId(pub String);

impl AsRef<str> for ReferenceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HashedReferenceId(pub String);

impl From<String> for HashedReferenceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for HashedReferenceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Scope(BTreeSet<String>);

impl Scope {
    pub fn from_parts(parts: Vec<String>) -> Self {
        Self(parts.into_iter().filter(|p| !p.is_empty()).collect())
    }

    pub fn from_delimited_parts(parts: &str) -> Self {
        Self(
            parts
                .split(' ')
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .collect(),
        )
    }

    pub fn as_joined(&self) -> String {
        self.0
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(" ")
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn as_parts(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parts = String::deserialize(deserializer)?;
        Ok(Self::from_delimited_parts(&parts))
    }
}

impl Serialize for Scope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_joined())
    }
}

/// Seconds since the unix epoch.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    pub fn after(duration: Duration) -> Self {
        SystemTime::now()
            .checked_add(duration)
            .unwrap_or_else(SystemTime::now)
            .into()
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let secs = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
            .try_into()
            .unwrap_or(0);
        Self(secs)
    }
}

impl From<Timestamp> for i64 {
    fn from(t: Timestamp) -> Self {
        t.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_ignores_empty_parts() {
        let scope = Scope::from_delimited_parts("  openid  profile ");
        assert_eq!(scope.as_parts(), vec!["openid", "profile"]);
        assert!(Scope::from_delimited_parts("").is_empty());
    }

    #[test]
    fn scope_joins_in_stable_order() {
        let scope = Scope::from_parts(vec!["profile".into(), "email".into(), "openid".into()]);
        assert_eq!(scope.as_joined(), "email openid profile");
        assert!(scope.contains("email"));
    }

    #[test]
    fn timestamp_moves_forward() {
        let now = Timestamp::now();
        let later = Timestamp::after(Duration::from_secs(3600));
        assert!(later.0 >= now.0 + 3599);
    }
}
