//! Environment-driven configuration.
//!
//! [`load`] reads an optional `.env` file and then deserializes any
//! `serde` struct from the process environment. Each field is looked up by
//! its serialized name first and then by that name upper-cased, so both
//! `#[serde(rename = "DATABASE_URL")]` and a plain `database_url` field bind
//! to `DATABASE_URL`.
//!
//! ```no_run
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AppConfig {
//!     port: u16,
//!     database_url: String,
//!     #[serde(default)]
//!     debug: bool,
//! }
//!
//! let cfg: AppConfig = corekit::config::load(".env").expect("valid configuration");
//! ```

use std::{collections::HashMap, fmt, path::Path, str::FromStr};

use serde::{
    de::{
        self,
        value::{MapDeserializer, SeqDeserializer, StringDeserializer},
        DeserializeOwned, IntoDeserializer, Visitor,
    },
    forward_to_deserialize_any, Deserialize, Serialize,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to unmarshal configuration: {0}")]
    Deserialize(String),
    #[error("invalid environment {0:?}")]
    InvalidEnvironment(String),
}

/// Loads `env_file` if it exists, then deserializes `T` from the environment.
///
/// Variables already set in the process take precedence over the file. A
/// missing file is not an error; an unreadable or malformed one is logged.
pub fn load<T>(env_file: impl AsRef<Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let path = env_file.as_ref();
    match dotenv::from_path(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "loaded env file"),
        Err(dotenv::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to load env file"),
    }
    from_vars(std::env::vars())
}

/// Deserializes `T` from an explicit set of variables.
pub fn from_vars<T, I, K, V>(vars: I) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let vars = vars
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect();
    T::deserialize(EnvDeserializer { vars }).map_err(|err| ConfigError::Deserialize(err.0))
}

/// Deployment environment of the running application.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    pub fn is_valid(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvironment(other.to_owned())),
        }
    }
}

#[derive(Debug)]
struct DeError(String);

impl fmt::Display for DeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DeError {}

impl de::Error for DeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

struct EnvDeserializer {
    vars: HashMap<String, String>,
}

impl EnvDeserializer {
    fn lookup(&self, field: &str) -> Option<&String> {
        self.vars
            .get(field)
            .or_else(|| self.vars.get(&field.to_ascii_uppercase()))
    }
}

impl<'de> de::Deserializer<'de> for EnvDeserializer {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        let entries = self
            .vars
            .into_iter()
            .map(|(key, value)| (key, EnvValue(value)));
        visitor.visit_map(MapDeserializer::new(entries))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DeError> {
        let entries: Vec<(&'static str, EnvValue)> = fields
            .iter()
            .filter_map(|field| {
                self.lookup(field)
                    .map(|value| (*field, EnvValue(value.clone())))
            })
            .collect();
        visitor.visit_map(MapDeserializer::new(entries.into_iter()))
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct enum identifier ignored_any
    }
}

/// One variable's raw text, parsed on demand into the requested type.
struct EnvValue(String);

impl<'de> IntoDeserializer<'de, DeError> for EnvValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! parse_number {
    ($lt:lifetime; $($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<$lt>>(self, visitor: V) -> Result<V::Value, DeError> {
                let parsed = self.0.trim().parse::<$ty>().map_err(|err| {
                    DeError(format!("invalid {} value {:?}: {err}", stringify!($ty), self.0))
                })?;
                visitor.$visit(parsed)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for EnvValue {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_string(self.0)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        match self.0.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => visitor.visit_bool(true),
            "0" | "f" | "false" => visitor.visit_bool(false),
            _ => Err(DeError(format!("invalid bool value {:?}", self.0))),
        }
    }

    parse_number! {
        'de;
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        if self.0.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DeError> {
        visitor.visit_newtype_struct(self)
    }

    /// Comma-separated lists: `HOSTS=a, b,c`.
    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        let items: Vec<EnvValue> = self
            .0
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| EnvValue(item.to_owned()))
            .collect();
        visitor.visit_seq(SeqDeserializer::new(items.into_iter()))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DeError> {
        let variant: StringDeserializer<DeError> = self.0.into_deserializer();
        visitor.visit_enum(variant)
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct tuple
        tuple_struct map struct identifier ignored_any
    }
}
