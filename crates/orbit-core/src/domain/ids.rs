//! Cloud resource identifiers (strongly-typed IDs).
//!
//! ## Phantom Type パターン
//! `Id<T>` というジェネリック型で共通実装を提供しつつ、
//! `T` は実行時には使わない（PhantomData）マーカー型として、
//! コンパイル時の型安全性を提供します。
//!
//! 実際の文字列はサービス側が払い出すもので、こちらで生成することはありません。
//! Markers that carry a prefix (`vpc-`, `eni-`, ...) are validated by
//! [`Id::parse`]; [`Id::new`] trusts the caller (values read back from a port).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix the provider uses for this resource type, if any.
    fn prefix() -> Option<&'static str>;

    /// Human-readable kind, used in log records and errors.
    fn kind() -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id '{value}': expected prefix '{prefix}'")]
pub struct InvalidId {
    pub kind: &'static str,
    pub prefix: &'static str,
    pub value: String,
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Parse user-supplied input, checking the provider prefix.
    pub fn parse(value: &str) -> Result<Self, InvalidId> {
        match T::prefix() {
            Some(prefix) if !value.starts_with(prefix) || value.len() == prefix.len() => {
                Err(InvalidId {
                    kind: T::kind(),
                    prefix,
                    value: value.to_string(),
                })
            }
            _ => Ok(Self::new(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

// derive だと T にも Clone/Eq... を要求してしまうので手で書く
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::kind(), self.value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

macro_rules! id_marker {
    ($marker:ident, $kind:literal, $prefix:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl IdMarker for $marker {
            fn prefix() -> Option<&'static str> {
                $prefix
            }

            fn kind() -> &'static str {
                $kind
            }
        }
    };
}

id_marker!(Vpc, "vpc", Some("vpc-"));
id_marker!(NetworkInterface, "network_interface", Some("eni-"));
id_marker!(SecurityGroup, "security_group", Some("sg-"));
id_marker!(VpcEndpoint, "vpc_endpoint", Some("vpce-"));
id_marker!(Build, "build", None);

pub type VpcId = Id<Vpc>;
pub type NetworkInterfaceId = Id<NetworkInterface>;
pub type SecurityGroupId = Id<SecurityGroup>;
pub type VpcEndpointId = Id<VpcEndpoint>;

/// Identifier assigned by the build service (`{project}:{uuid}`).
pub type BuildId = Id<Build>;
